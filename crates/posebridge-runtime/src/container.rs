//! Per-container state owned by the UI thread

use posebridge_core::{BridgeResult, CameraFacing, ContainerId, ControllerId, Size};
use serde::Serialize;

use crate::host::CaptureSession;
use crate::retry::PendingRetry;

/// Host attach state of a container
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachState {
    /// Constructed but never attached by the host
    #[default]
    Unattached,
    Attached,
    Detached,
}

/// Lifecycle state of a container's embedded controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ControllerState {
    #[default]
    None,
    /// A create is waiting for its preconditions
    Creating,
    Active,
    TearingDown,
}

/// The embedded controller and the camera session it owns
///
/// The session is closed exactly once: by [`close`](Self::close), or on drop
/// if the controller is abandoned (an error return or an unwinding host
/// callback between open and embed).
pub struct LiveController {
    pub id: ControllerId,
    pub facing: CameraFacing,
    session: Box<dyn CaptureSession>,
    closed: bool,
}

impl LiveController {
    pub fn new(id: ControllerId, facing: CameraFacing, session: Box<dyn CaptureSession>) -> Self {
        LiveController {
            id,
            facing,
            session,
            closed: false,
        }
    }

    pub(crate) fn switch_camera(&mut self) -> BridgeResult<CameraFacing> {
        let facing = self.session.switch_camera()?;
        self.facing = facing;
        Ok(facing)
    }

    /// Release the camera. Later calls are no-ops.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.session.close();
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for LiveController {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for LiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveController")
            .field("id", &self.id)
            .field("facing", &self.facing)
            .finish_non_exhaustive()
    }
}

/// A container registered by the view factory
#[derive(Debug)]
pub struct Container {
    pub id: ContainerId,
    pub attach: AttachState,
    pub state: ControllerState,
    /// Size requested by the control channel; zero means unknown
    pub target: Size,
    /// Set whenever the target changes or a controller is embedded
    pub dirty: bool,
    pub last_measured: Option<Size>,
    pub controller: Option<LiveController>,
    pub retry: Option<PendingRetry>,
}

impl Container {
    pub fn new(id: ContainerId) -> Self {
        Container {
            id,
            attach: AttachState::Unattached,
            state: ControllerState::None,
            target: Size::ZERO,
            dirty: true,
            last_measured: None,
            controller: None,
            retry: None,
        }
    }

    pub fn set_width(&mut self, width: u32) {
        if self.target.width != width {
            self.target.width = width;
            self.dirty = true;
        }
    }

    pub fn set_height(&mut self, height: u32) {
        if self.target.height != height {
            self.target.height = height;
            self.dirty = true;
        }
    }

    /// Does the target call for a measure pass this frame?
    pub fn needs_measure(&self) -> bool {
        !self.target.is_empty() && (self.dirty || self.last_measured != Some(self.target))
    }

    /// Bring `state` back in line with what the container actually holds
    pub fn settle(&mut self) {
        self.state = if self.retry.is_some() {
            ControllerState::Creating
        } else if self.controller.is_some() {
            ControllerState::Active
        } else {
            ControllerState::None
        };
    }

    pub fn snapshot(&self, frame_generation: Option<u64>) -> ContainerSnapshot {
        ContainerSnapshot {
            id: self.id,
            attach: self.attach,
            state: self.state,
            controller: self.controller.as_ref().map(|c| c.id),
            target: (self.target.width, self.target.height),
            last_measured: self.last_measured.map(|s| (s.width, s.height)),
            frame_generation,
            retry_attempt: self.retry.as_ref().map(|r| r.attempt),
        }
    }
}

/// Read-only view of a container, for diagnostics and tests
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSnapshot {
    pub id: ContainerId,
    pub attach: AttachState,
    pub state: ControllerState,
    pub controller: Option<ControllerId>,
    pub target: (u32, u32),
    pub last_measured: Option<(u32, u32)>,
    /// Frame loop registration, if one is live
    pub frame_generation: Option<u64>,
    pub retry_attempt: Option<u32>,
}

impl ContainerSnapshot {
    #[inline]
    pub fn frame_registered(&self) -> bool {
        self.frame_generation.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_container_is_dirty_and_unattached() {
        let c = Container::new(ContainerId::new(1));
        assert_eq!(c.attach, AttachState::Unattached);
        assert_eq!(c.state, ControllerState::None);
        assert!(c.dirty);
        assert!(!c.needs_measure());
    }

    #[test]
    fn test_measure_needed_only_for_nonzero_target() {
        let mut c = Container::new(ContainerId::new(1));
        c.set_width(480);
        assert!(!c.needs_measure());
        c.set_height(640);
        assert!(c.needs_measure());

        c.last_measured = Some(Size::new(480, 640));
        c.dirty = false;
        assert!(!c.needs_measure());

        // Same value again does not dirty the container
        c.set_width(480);
        assert!(!c.needs_measure());
        c.set_width(720);
        assert!(c.needs_measure());
    }

    #[test]
    fn test_settle_without_controller() {
        let mut c = Container::new(ContainerId::new(1));
        c.state = ControllerState::TearingDown;
        c.settle();
        assert_eq!(c.state, ControllerState::None);
    }
}
