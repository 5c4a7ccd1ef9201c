//! PoseBridge Core - Fundamental types shared by the view bridge
//!
//! This crate defines the types every other PoseBridge crate agrees on:
//! - Identifiers (ContainerId, ControllerId)
//! - Error taxonomy (transient precondition, invalid input, internal fault)
//! - Shared capture configuration read by the inference pipeline
//! - Geometry and property values from the control channel
//! - Skeleton segments and landmark event payloads

pub mod config;
pub mod error;
pub mod geometry;
pub mod id;
pub mod landmark;
pub mod skeleton;
pub mod value;

pub use config::*;
pub use error::*;
pub use geometry::*;
pub use id::*;
pub use landmark::*;
pub use skeleton::*;
pub use value::*;
