//! Simulated host tree and capture backend
//!
//! Both record every call they receive and flag invariant violations at the
//! instant they happen:
//! - a second controller embedded into a container that still holds one
//! - more camera sessions open than the configured limit
//! - a session closed twice, or dropped without being closed

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use posebridge_core::{
    BridgeError, BridgeResult, CameraFacing, ConfigReader, ConfigSnapshot, ContainerId,
    ControllerId, Rect, Size,
};
use posebridge_runtime::{CaptureBackend, CaptureSession, HostTree};

// ============================================================================
// HOST TREE
// ============================================================================

/// One call received by the simulated host
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostCall {
    Measure(ContainerId, Size),
    Layout(ContainerId, Rect),
    Notify(ContainerId),
    Embed(ContainerId, ControllerId),
    Remove(ContainerId, ControllerId),
}

impl HostCall {
    pub fn container(&self) -> ContainerId {
        match self {
            HostCall::Measure(id, _)
            | HostCall::Layout(id, _)
            | HostCall::Notify(id)
            | HostCall::Embed(id, _)
            | HostCall::Remove(id, _) => *id,
        }
    }
}

#[derive(Default)]
struct HostState {
    activity: bool,
    parents: HashMap<ContainerId, Rect>,
    embedded: HashMap<ContainerId, Vec<ControllerId>>,
    calls: Vec<HostCall>,
    violations: Vec<String>,
    fail_embed: bool,
    panic_on_embed: bool,
    panic_on_layout: bool,
}

/// A host view tree that can be made as uncooperative as needed
#[derive(Clone, Default)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    /// Host with a reachable activity and no parents yet
    pub fn new() -> Self {
        let host = SimulatedHost::default();
        host.set_activity(true);
        host
    }

    pub fn set_activity(&self, reachable: bool) {
        self.state.lock().activity = reachable;
    }

    /// Give `container` a parent with the given bounds, or remove it
    pub fn set_parent(&self, container: ContainerId, bounds: Option<Rect>) {
        let mut state = self.state.lock();
        match bounds {
            Some(rect) => state.parents.insert(container, rect),
            None => state.parents.remove(&container),
        };
    }

    pub fn fail_embeds(&self, fail: bool) {
        self.state.lock().fail_embed = fail;
    }

    pub fn panic_on_embed(&self, panic: bool) {
        self.state.lock().panic_on_embed = panic;
    }

    pub fn panic_on_layout(&self, panic: bool) {
        self.state.lock().panic_on_layout = panic;
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_for(&self, container: ContainerId) -> Vec<HostCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.container() == container)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn measures(&self, container: ContainerId) -> Vec<Size> {
        self.calls_for(container)
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Measure(_, size) => Some(size),
                _ => None,
            })
            .collect()
    }

    pub fn layouts(&self, container: ContainerId) -> Vec<Rect> {
        self.calls_for(container)
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Layout(_, rect) => Some(rect),
                _ => None,
            })
            .collect()
    }

    /// Controllers currently embedded in `container`
    pub fn embedded(&self, container: ContainerId) -> Vec<ControllerId> {
        self.state
            .lock()
            .embedded
            .get(&container)
            .cloned()
            .unwrap_or_default()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }
}

impl HostTree for SimulatedHost {
    fn activity_reachable(&self) -> bool {
        self.state.lock().activity
    }

    fn parent_bounds(&self, container: ContainerId) -> Option<Rect> {
        self.state.lock().parents.get(&container).copied()
    }

    fn measure(&self, container: ContainerId, size: Size) {
        self.state
            .lock()
            .calls
            .push(HostCall::Measure(container, size));
    }

    fn layout(&self, container: ContainerId, frame: Rect) {
        let panic = {
            let mut state = self.state.lock();
            state.calls.push(HostCall::Layout(container, frame));
            state.panic_on_layout
        };
        if panic {
            panic!("simulated host layout failure for {}", container);
        }
    }

    fn notify_layout_changed(&self, container: ContainerId) {
        self.state.lock().calls.push(HostCall::Notify(container));
    }

    fn embed_controller(
        &self,
        container: ContainerId,
        controller: ControllerId,
    ) -> BridgeResult<()> {
        if self.state.lock().panic_on_embed {
            panic!("simulated host embed failure for {}", container);
        }
        let mut state = self.state.lock();
        if state.fail_embed {
            return Err(BridgeError::Host(format!(
                "embed of {} refused",
                controller
            )));
        }
        state.calls.push(HostCall::Embed(container, controller));

        let slot = state.embedded.entry(container).or_default();
        slot.push(controller);
        if slot.len() > 1 {
            let message = format!(
                "container {} holds {} controllers: {:?}",
                container,
                slot.len(),
                slot
            );
            state.violations.push(message);
        }
        Ok(())
    }

    fn remove_controller(&self, container: ContainerId, controller: ControllerId) {
        let mut state = self.state.lock();
        state.calls.push(HostCall::Remove(container, controller));
        if let Some(slot) = state.embedded.get_mut(&container) {
            slot.retain(|c| *c != controller);
        }
    }
}

// ============================================================================
// CAPTURE BACKEND
// ============================================================================

#[derive(Default)]
struct BackendState {
    open: HashMap<ControllerId, CameraFacing>,
    opened: u64,
    closed: u64,
    max_open: usize,
    back_unavailable: bool,
    fail_open: bool,
    open_snapshots: Vec<ConfigSnapshot>,
    violations: Vec<String>,
}

/// A camera backend with a fixed number of exclusive sessions
#[derive(Clone)]
pub struct SimulatedBackend {
    state: Arc<Mutex<BackendState>>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::with_capacity(1)
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend allowing `max_open` concurrent sessions (one per container)
    pub fn with_capacity(max_open: usize) -> Self {
        SimulatedBackend {
            state: Arc::new(Mutex::new(BackendState {
                max_open,
                ..Default::default()
            })),
        }
    }

    pub fn set_back_camera_available(&self, available: bool) {
        self.state.lock().back_unavailable = !available;
    }

    pub fn fail_opens(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().open.len()
    }

    pub fn opened(&self) -> u64 {
        self.state.lock().opened
    }

    pub fn closed(&self) -> u64 {
        self.state.lock().closed
    }

    pub fn facing_of(&self, controller: ControllerId) -> Option<CameraFacing> {
        self.state.lock().open.get(&controller).copied()
    }

    /// Configuration each session saw when it opened
    pub fn open_snapshots(&self) -> Vec<ConfigSnapshot> {
        self.state.lock().open_snapshots.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }
}

impl CaptureBackend for SimulatedBackend {
    fn open_session(
        &self,
        controller: ControllerId,
        config: ConfigReader,
        facing: CameraFacing,
    ) -> BridgeResult<Box<dyn CaptureSession>> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(BridgeError::Capture("camera unavailable".into()));
        }

        state.open.insert(controller, facing);
        state.opened += 1;
        state.open_snapshots.push(config.snapshot());
        if state.open.len() > state.max_open {
            let message = format!(
                "{} sessions open, limit {}",
                state.open.len(),
                state.max_open
            );
            state.violations.push(message);
        }

        Ok(Box::new(SimulatedSession {
            controller,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct SimulatedSession {
    controller: ControllerId,
    state: Arc<Mutex<BackendState>>,
    closed: bool,
}

impl CaptureSession for SimulatedSession {
    fn switch_camera(&mut self) -> BridgeResult<CameraFacing> {
        let mut state = self.state.lock();
        let back_unavailable = state.back_unavailable;
        let facing = state
            .open
            .get_mut(&self.controller)
            .ok_or_else(|| BridgeError::Capture(format!("{} is not open", self.controller)))?;

        let wanted = facing.toggled();
        // Stay on the current camera if the other one is missing
        if !(wanted == CameraFacing::Back && back_unavailable) {
            *facing = wanted;
        }
        Ok(*facing)
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        if self.closed {
            let message = format!("{} closed twice", self.controller);
            state.violations.push(message);
            return;
        }
        self.closed = true;
        state.open.remove(&self.controller);
        state.closed += 1;
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        if !self.closed {
            let mut state = self.state.lock();
            state.open.remove(&self.controller);
            let message = format!("{} dropped without close", self.controller);
            state.violations.push(message);
        }
    }
}
