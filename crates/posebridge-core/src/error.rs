//! Error types for the view bridge
//!
//! Nothing in the bridge is fatal. Every error falls into one of three
//! kinds, and the kind decides what the lifecycle does with it:
//! - Transient precondition: retried later, never surfaced
//! - Invalid input: dropped with a diagnostic log
//! - Internal fault: logged, state left at its last consistent value

use thiserror::Error;

use crate::ContainerId;

/// Core bridge errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    // Transient preconditions
    #[error("No host activity is reachable")]
    NoActivity,

    #[error("Container {0} has not been attached by the host")]
    NotAttached(ContainerId),

    #[error("Container {0} has no parent in the view tree")]
    NoParent(ContainerId),

    #[error("Container {container} has zero geometry ({width}x{height})")]
    ZeroGeometry {
        container: ContainerId,
        width: u32,
        height: u32,
    },

    // Invalid input
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Malformed value for {key}: {reason}")]
    MalformedValue { key: String, reason: String },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(ContainerId),

    #[error("Malformed control message: {0}")]
    MalformedMessage(String),

    // Internal faults
    #[error("Host error: {0}")]
    Host(String),

    #[error("Capture backend error: {0}")]
    Capture(String),

    #[error("Lifecycle transition panicked: {0}")]
    Panicked(String),

    #[error("UI thread is gone")]
    UiThreadClosed,
}

/// How the lifecycle reacts to an error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retry with backoff, never surfaced
    TransientPrecondition,
    /// Drop and log
    InvalidInput,
    /// Log, keep last consistent state
    InternalFault,
}

impl BridgeError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::NoActivity
            | BridgeError::NotAttached(_)
            | BridgeError::NoParent(_)
            | BridgeError::ZeroGeometry { .. } => ErrorKind::TransientPrecondition,
            BridgeError::UnknownProperty(_)
            | BridgeError::MalformedValue { .. }
            | BridgeError::UnknownCommand(_)
            | BridgeError::ContainerNotFound(_)
            | BridgeError::MalformedMessage(_) => ErrorKind::InvalidInput,
            BridgeError::Host(_)
            | BridgeError::Capture(_)
            | BridgeError::Panicked(_)
            | BridgeError::UiThreadClosed => ErrorKind::InternalFault,
        }
    }

    /// Should the operation that produced this error be retried later?
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientPrecondition
    }

    /// Shorthand for a malformed property value
    pub fn malformed(key: &str, reason: impl Into<String>) -> Self {
        BridgeError::MalformedValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
