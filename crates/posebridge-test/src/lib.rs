//! PoseBridge Test Harness - Simulated host and lifecycle validation
//!
//! This crate provides:
//! - A simulated host view tree and camera backend that flag overlap
//! - End-to-end scenarios on a paused clock
//! - Seeded chaos sequences with invariant checks after every step

pub mod chaos;
pub mod scenario;
pub mod sim_host;

pub use chaos::*;
pub use scenario::*;
pub use sim_host::*;
