//! Identity types for the view bridge
//!
//! Container identities are handed to us by the host (they are the host's
//! view tags), controller identities are allocated locally.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Container identity - the host's tag for the view hosting the camera
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub i32);

impl ContainerId {
    pub const NONE: ContainerId = ContainerId(-1);

    #[inline]
    pub fn new(tag: i32) -> Self {
        ContainerId(tag)
    }

    /// Host tags are non-negative; anything else never names a live view
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Convert a control-channel integer, rejecting values outside the tag range
    pub fn from_i64(value: i64) -> Option<Self> {
        i32::try_from(value).ok().map(ContainerId).filter(|id| id.is_valid())
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Container({})", self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Embedded controller identity - unique for the lifetime of the process
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerId(pub u64);

impl ControllerId {
    pub const ZERO: ControllerId = ControllerId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        ControllerId(id)
    }

    /// The identity allocated after this one
    #[inline]
    pub fn next(self) -> Self {
        ControllerId(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Controller({:08x})", self.0)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_from_i64() {
        assert_eq!(ContainerId::from_i64(7), Some(ContainerId::new(7)));
        assert_eq!(ContainerId::from_i64(-3), None);
        assert_eq!(ContainerId::from_i64(i64::from(i32::MAX) + 1), None);
    }

    #[test]
    fn test_controller_id_next() {
        let id = ControllerId::ZERO.next().next();
        assert_eq!(id, ControllerId::new(2));
        assert_eq!(format!("{:?}", id), "Controller(00000002)");
    }

    #[test]
    fn test_container_id_serde_transparent() {
        let json = serde_json::to_string(&ContainerId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: ContainerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ContainerId::new(42));
    }
}
