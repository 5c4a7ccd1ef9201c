//! PoseBridge Runtime - Embedded view lifecycle on a single UI thread
//!
//! This crate drives the native pose-capture view inside a host UI tree:
//! 1. The host builds containers through the view factory
//! 2. The control channel writes configuration and posts geometry and commands
//! 3. The UI thread applies attach, create and teardown in receipt order
//! 4. Failed create preconditions are retried on a cancellable timer
//! 5. Every display frame forces live containers back onto their target size
//!
//! All container and controller state lives on the UI thread. The only
//! state shared across threads is the capture configuration.

pub mod bridge;
pub mod config;
pub mod container;
pub mod dispatcher;
pub mod display_link;
pub mod factory;
pub mod frame_loop;
pub mod host;
pub mod lifecycle;
pub mod retry;
pub mod telemetry;
pub mod ui;

pub use bridge::*;
pub use config::*;
pub use container::*;
pub use dispatcher::*;
pub use display_link::*;
pub use factory::*;
pub use frame_loop::*;
pub use host::*;
pub use lifecycle::*;
pub use retry::*;
pub use telemetry::*;
pub use ui::*;
