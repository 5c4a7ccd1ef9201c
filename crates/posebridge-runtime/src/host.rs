//! Boundary to the host view tree and the capture backend
//!
//! Everything here is called from the UI thread only. Implementations may
//! panic; the UI thread catches panics per message.

use posebridge_core::{
    BridgeResult, CameraFacing, ConfigReader, ContainerId, ControllerId, Rect, Size,
};

/// The host UI tree, as seen by the lifecycle and the frame loop
pub trait HostTree: Send + Sync + 'static {
    /// Is a host activity available to run UI transactions?
    fn activity_reachable(&self) -> bool;

    /// Bounds of the container's parent, or `None` if it has no parent yet
    fn parent_bounds(&self, container: ContainerId) -> Option<Rect>;

    /// Measure the container to exactly `size`
    fn measure(&self, container: ContainerId, size: Size);

    /// Position the container at `frame` within its parent
    fn layout(&self, container: ContainerId, frame: Rect);

    /// Tell the host's layout observers that the container moved or resized
    fn notify_layout_changed(&self, container: ContainerId);

    /// Insert the controller's view into the container
    fn embed_controller(&self, container: ContainerId, controller: ControllerId)
        -> BridgeResult<()>;

    /// Remove a previously embedded controller. Must tolerate unknown ids.
    fn remove_controller(&self, container: ContainerId, controller: ControllerId);
}

/// Opens exclusive camera sessions for controllers
pub trait CaptureBackend: Send + Sync + 'static {
    fn open_session(
        &self,
        controller: ControllerId,
        config: ConfigReader,
        facing: CameraFacing,
    ) -> BridgeResult<Box<dyn CaptureSession>>;
}

/// A live camera session owned by one controller
pub trait CaptureSession: Send {
    /// Flip between the front and back camera, returning the facing now in use
    fn switch_camera(&mut self) -> BridgeResult<CameraFacing>;

    /// Release the camera. Called exactly once, before the session is dropped.
    fn close(&mut self);
}
