//! Embedded controller lifecycle
//!
//! Owns every container and its controller. All methods run on the UI
//! thread, which serializes create, teardown and frame work; the
//! replace sequence (teardown old, open and embed new, restart the frame
//! loop) is one uninterrupted call.
//!
//! A create whose preconditions fail leaves the container `Creating` with a
//! retry scheduled. Teardown cancels that retry along with the frame loop.

use std::collections::HashMap;
use std::sync::Arc;

use posebridge_core::{
    BridgeError, BridgeResult, ConfigReader, ContainerId, ControllerId, Rect, SharedConfiguration,
};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::container::{AttachState, Container, ContainerSnapshot, ControllerState, LiveController};
use crate::frame_loop::{FrameLayoutLoop, FrameReport};
use crate::host::{CaptureBackend, HostTree};
use crate::retry::RetryScheduler;

/// Lifecycle counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStats {
    pub messages: u64,
    pub frames: u64,
    pub create_attempts: u64,
    pub controllers_created: u64,
    pub controllers_torn_down: u64,
    pub retries_scheduled: u64,
    pub retries_exhausted: u64,
    pub stale_retries: u64,
    pub camera_switches: u64,
    pub errors: u64,
    pub panics_caught: u64,
}

/// Creates, replaces and tears down embedded controllers
pub struct EmbeddedViewLifecycle {
    containers: HashMap<ContainerId, Container>,
    frame_loop: FrameLayoutLoop,
    retries: RetryScheduler,
    host: Arc<dyn HostTree>,
    backend: Arc<dyn CaptureBackend>,
    config: Arc<SharedConfiguration>,
    last_controller: ControllerId,
    stats: LifecycleStats,
}

impl EmbeddedViewLifecycle {
    pub fn new(
        host: Arc<dyn HostTree>,
        backend: Arc<dyn CaptureBackend>,
        config: Arc<SharedConfiguration>,
        retries: RetryScheduler,
    ) -> Self {
        EmbeddedViewLifecycle {
            containers: HashMap::new(),
            frame_loop: FrameLayoutLoop::new(),
            retries,
            host,
            backend,
            config,
            last_controller: ControllerId::ZERO,
            stats: LifecycleStats::default(),
        }
    }

    /// Make a container known. Re-registering an existing one is a no-op.
    pub fn register(&mut self, id: ContainerId) {
        self.containers.entry(id).or_insert_with(|| {
            debug!(container = %id, "container registered");
            Container::new(id)
        });
    }

    /// The host attached the container to its view tree
    pub fn attach(&mut self, id: ContainerId) -> BridgeResult<()> {
        let container = self
            .containers
            .get_mut(&id)
            .ok_or(BridgeError::ContainerNotFound(id))?;
        container.attach = AttachState::Attached;
        let state = container.state;
        let pending_attempt = container.retry.as_ref().map_or(1, |r| r.attempt);
        debug!(container = %id, ?state, "attached");

        if !self.frame_loop.is_registered(id) {
            self.frame_loop.start(id);
        }

        match state {
            ControllerState::None => self.attempt_create(id, 1),
            // A create was waiting on attachment: try now rather than on the timer
            ControllerState::Creating => self.attempt_create(id, pending_attempt),
            ControllerState::Active | ControllerState::TearingDown => Ok(()),
        }
    }

    /// Explicit create from the control channel
    pub fn create(&mut self, id: ContainerId) -> BridgeResult<()> {
        if !self.containers.contains_key(&id) {
            return Err(BridgeError::ContainerNotFound(id));
        }
        self.attempt_create(id, 1)
    }

    /// A retry timer fired
    pub fn retry(&mut self, id: ContainerId, token: u64) -> BridgeResult<()> {
        let attempt = match self.containers.get(&id).and_then(|c| c.retry.as_ref()) {
            Some(pending) if pending.token == token => pending.attempt,
            _ => {
                trace!(container = %id, token, "stale retry ignored");
                self.stats.stale_retries += 1;
                return Ok(());
            }
        };
        self.attempt_create(id, attempt)
    }

    /// Close and remove the controller, cancel retries and the frame loop
    pub fn teardown(&mut self, id: ContainerId) -> BridgeResult<()> {
        if !self.containers.contains_key(&id) {
            trace!(container = %id, "teardown of unknown container");
            return Ok(());
        }
        self.frame_loop.cancel(id);
        self.release_controller(id);
        if let Some(container) = self.containers.get_mut(&id) {
            container.retry = None;
            container.settle();
        }
        Ok(())
    }

    /// The host detached the container
    pub fn detach(&mut self, id: ContainerId) -> BridgeResult<()> {
        let container = self
            .containers
            .get_mut(&id)
            .ok_or(BridgeError::ContainerNotFound(id))?;
        container.attach = AttachState::Detached;
        debug!(container = %id, "detached");
        self.teardown(id)
    }

    /// The host dropped the container for good
    pub fn dispose(&mut self, id: ContainerId) -> BridgeResult<()> {
        self.teardown(id)?;
        if self.containers.remove(&id).is_some() {
            debug!(container = %id, "container disposed");
        }
        Ok(())
    }

    /// Tear every container down (shutdown path)
    pub fn teardown_all(&mut self) {
        let ids: Vec<ContainerId> = self.containers.keys().copied().collect();
        for id in ids {
            let _ = self.teardown(id);
        }
    }

    pub fn set_width(&mut self, id: ContainerId, width: u32) -> BridgeResult<()> {
        self.containers
            .get_mut(&id)
            .ok_or(BridgeError::ContainerNotFound(id))?
            .set_width(width);
        Ok(())
    }

    pub fn set_height(&mut self, id: ContainerId, height: u32) -> BridgeResult<()> {
        self.containers
            .get_mut(&id)
            .ok_or(BridgeError::ContainerNotFound(id))?
            .set_height(height);
        Ok(())
    }

    /// Flip the camera on the most recently created live controller
    pub fn switch_capture_source(&mut self) -> BridgeResult<()> {
        let Some(controller) = self
            .containers
            .values_mut()
            .filter_map(|c| c.controller.as_mut())
            .max_by_key(|c| c.id)
        else {
            warn!("camera switch with no live controller");
            return Ok(());
        };

        let facing = controller.switch_camera()?;
        self.config.set_camera_facing(facing);
        self.stats.camera_switches += 1;
        info!(controller = %controller.id, ?facing, "camera switched");
        Ok(())
    }

    /// Run one display frame
    pub fn frame(&mut self) -> FrameReport {
        self.stats.frames += 1;
        self.frame_loop
            .run_frame(&mut self.containers, self.host.as_ref())
    }

    /// Restore every container's state after a caught panic
    pub fn settle(&mut self) {
        for container in self.containers.values_mut() {
            container.settle();
        }
    }

    pub fn snapshot(&self) -> Vec<ContainerSnapshot> {
        let mut out: Vec<ContainerSnapshot> = self
            .containers
            .values()
            .map(|c| c.snapshot(self.frame_loop.generation(c.id)))
            .collect();
        out.sort_by_key(|s| s.id);
        out
    }

    pub fn stats(&self) -> LifecycleStats {
        self.stats.clone()
    }

    pub fn stats_mut(&mut self) -> &mut LifecycleStats {
        &mut self.stats
    }

    pub fn frame_loop(&self) -> &FrameLayoutLoop {
        &self.frame_loop
    }

    /// Attempt number `attempt` of a create
    fn attempt_create(&mut self, id: ContainerId, attempt: u32) -> BridgeResult<()> {
        self.stats.create_attempts += 1;
        let Some(container) = self.containers.get_mut(&id) else {
            return Err(BridgeError::ContainerNotFound(id));
        };
        // Any pending retry is superseded by this attempt
        container.retry = None;

        match self.check_preconditions(id) {
            Ok(parent) => {
                trace!(container = %id, attempt, ?parent, "create preconditions met");
                self.replace_controller(id)
            }
            Err(err) if err.is_retryable() => {
                self.schedule_retry(id, attempt, &err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn check_preconditions(&self, id: ContainerId) -> BridgeResult<Rect> {
        if !self.host.activity_reachable() {
            return Err(BridgeError::NoActivity);
        }
        let container = self
            .containers
            .get(&id)
            .ok_or(BridgeError::ContainerNotFound(id))?;
        if container.attach != AttachState::Attached {
            return Err(BridgeError::NotAttached(id));
        }
        let parent = self
            .host
            .parent_bounds(id)
            .ok_or(BridgeError::NoParent(id))?;
        if parent.is_empty() {
            return Err(BridgeError::ZeroGeometry {
                container: id,
                width: parent.width,
                height: parent.height,
            });
        }
        Ok(parent)
    }

    fn schedule_retry(&mut self, id: ContainerId, attempt: u32, reason: &BridgeError) {
        let pending = self.retries.schedule(id, attempt);
        let Some(container) = self.containers.get_mut(&id) else {
            return;
        };

        match pending {
            Some(pending) => {
                debug!(container = %id, attempt, next = pending.attempt, %reason, "create deferred");
                container.retry = Some(pending);
                self.stats.retries_scheduled += 1;
            }
            None => {
                warn!(container = %id, attempt, %reason, "create retries exhausted");
                self.stats.retries_exhausted += 1;
            }
        }
        container.settle();
    }

    /// Teardown-then-create as one unit of work
    fn replace_controller(&mut self, id: ContainerId) -> BridgeResult<()> {
        self.release_controller(id);

        let controller_id = self.last_controller.next();
        self.last_controller = controller_id;
        let facing = self.config.camera_facing();

        let controller = match self.backend.open_session(
            controller_id,
            ConfigReader::new(Arc::clone(&self.config)),
            facing,
        ) {
            Ok(session) => LiveController::new(controller_id, facing, session),
            Err(err) => {
                self.settle_container(id);
                return Err(err);
            }
        };

        // From here on an error return or an unwinding host callback drops
        // `controller`, which closes the session
        if let Err(err) = self.host.embed_controller(id, controller_id) {
            self.settle_container(id);
            return Err(err);
        }

        let Some(container) = self.containers.get_mut(&id) else {
            // Only reachable if the host callback re-entered and disposed us
            self.host.remove_controller(id, controller_id);
            return Err(BridgeError::ContainerNotFound(id));
        };
        container.controller = Some(controller);
        container.dirty = true;
        container.settle();

        self.frame_loop.start(id);
        self.stats.controllers_created += 1;
        info!(container = %id, controller = %controller_id, ?facing, "controller active");
        Ok(())
    }

    /// Close the session and remove the controller from the host, if any
    fn release_controller(&mut self, id: ContainerId) {
        let Some(container) = self.containers.get_mut(&id) else {
            return;
        };
        let Some(mut controller) = container.controller.take() else {
            return;
        };
        container.state = ControllerState::TearingDown;

        controller.close();
        self.host.remove_controller(id, controller.id);
        self.stats.controllers_torn_down += 1;
        info!(container = %id, controller = %controller.id, "controller torn down");

        self.settle_container(id);
    }

    fn settle_container(&mut self, id: ContainerId) {
        if let Some(container) = self.containers.get_mut(&id) {
            container.settle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CaptureSession;
    use crate::retry::RetryPolicy;
    use parking_lot::Mutex;
    use posebridge_core::{CameraFacing, Size};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Host {
        unreachable: Mutex<bool>,
        parent: Mutex<Option<Rect>>,
        embedded: Mutex<Vec<ControllerId>>,
        fail_embed: Mutex<bool>,
        panic_embed: Mutex<bool>,
    }

    impl HostTree for Host {
        fn activity_reachable(&self) -> bool {
            !*self.unreachable.lock()
        }
        fn parent_bounds(&self, _: ContainerId) -> Option<Rect> {
            *self.parent.lock()
        }
        fn measure(&self, _: ContainerId, _: Size) {}
        fn layout(&self, _: ContainerId, _: Rect) {}
        fn notify_layout_changed(&self, _: ContainerId) {}
        fn embed_controller(&self, _: ContainerId, controller: ControllerId) -> BridgeResult<()> {
            if *self.panic_embed.lock() {
                panic!("embed blew up");
            }
            if *self.fail_embed.lock() {
                return Err(BridgeError::Host("embed refused".into()));
            }
            self.embedded.lock().push(controller);
            Ok(())
        }
        fn remove_controller(&self, _: ContainerId, controller: ControllerId) {
            self.embedded.lock().retain(|c| *c != controller);
        }
    }

    #[derive(Default)]
    struct Backend {
        open: Arc<Mutex<u32>>,
    }

    struct Session {
        open: Arc<Mutex<u32>>,
        facing: CameraFacing,
    }

    impl CaptureSession for Session {
        fn switch_camera(&mut self) -> BridgeResult<CameraFacing> {
            self.facing = self.facing.toggled();
            Ok(self.facing)
        }
        fn close(&mut self) {
            *self.open.lock() -= 1;
        }
    }

    impl CaptureBackend for Backend {
        fn open_session(
            &self,
            _: ControllerId,
            _: ConfigReader,
            facing: CameraFacing,
        ) -> BridgeResult<Box<dyn CaptureSession>> {
            *self.open.lock() += 1;
            Ok(Box::new(Session {
                open: Arc::clone(&self.open),
                facing,
            }))
        }
    }

    struct Fixture {
        lifecycle: EmbeddedViewLifecycle,
        host: Arc<Host>,
        open: Arc<Mutex<u32>>,
        config: Arc<SharedConfiguration>,
        _rx: mpsc::UnboundedReceiver<crate::ui::UiMessage>,
        _tx: mpsc::UnboundedSender<crate::ui::UiMessage>,
    }

    fn fixture(max_attempts: u32) -> Fixture {
        let host = Arc::new(Host::default());
        *host.parent.lock() = Some(Rect::new(0, 0, 1080, 1920));
        let backend = Backend::default();
        let open = Arc::clone(&backend.open);
        let config = SharedConfiguration::shared();
        let (tx, rx) = mpsc::unbounded_channel();
        let retries = RetryScheduler::new(
            RetryPolicy::fixed(Duration::from_millis(100), max_attempts),
            tx.downgrade(),
        );
        let lifecycle = EmbeddedViewLifecycle::new(
            host.clone(),
            Arc::new(backend),
            Arc::clone(&config),
            retries,
        );
        Fixture {
            lifecycle,
            host,
            open,
            config,
            _rx: rx,
            _tx: tx,
        }
    }

    fn state(f: &Fixture, id: ContainerId) -> ContainerSnapshot {
        f.lifecycle
            .snapshot()
            .into_iter()
            .find(|s| s.id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_attach_creates_controller() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        f.lifecycle.register(id);
        f.lifecycle.attach(id).unwrap();

        let snap = state(&f, id);
        assert_eq!(snap.state, ControllerState::Active);
        assert!(snap.frame_registered());
        assert_eq!(*f.open.lock(), 1);
        assert_eq!(f.host.embedded.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_create_replaces_without_overlap() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        f.lifecycle.register(id);
        f.lifecycle.attach(id).unwrap();
        let first = state(&f, id).controller.unwrap();

        f.lifecycle.create(id).unwrap();
        let second = state(&f, id).controller.unwrap();

        assert_ne!(first, second);
        assert_eq!(*f.open.lock(), 1);
        assert_eq!(*f.host.embedded.lock(), vec![second]);
        assert_eq!(f.lifecycle.stats().controllers_torn_down, 1);
    }

    #[tokio::test]
    async fn test_create_before_attach_defers() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        f.lifecycle.register(id);
        f.lifecycle.create(id).unwrap();

        let snap = state(&f, id);
        assert_eq!(snap.state, ControllerState::Creating);
        assert_eq!(snap.retry_attempt, Some(2));

        f.lifecycle.attach(id).unwrap();
        assert_eq!(state(&f, id).state, ControllerState::Active);
        assert_eq!(state(&f, id).retry_attempt, None);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_to_none() {
        let mut f = fixture(1);
        let id = ContainerId::new(7);
        *f.host.unreachable.lock() = true;
        f.lifecycle.register(id);
        f.lifecycle.attach(id).unwrap();

        assert_eq!(state(&f, id).state, ControllerState::None);
        assert_eq!(f.lifecycle.stats().retries_exhausted, 1);
    }

    #[tokio::test]
    async fn test_stale_retry_ignored() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        f.lifecycle.register(id);
        f.lifecycle.create(id).unwrap();
        f.lifecycle.teardown(id).unwrap();

        f.lifecycle.retry(id, 1).unwrap();
        assert_eq!(state(&f, id).state, ControllerState::None);
        assert_eq!(f.lifecycle.stats().stale_retries, 1);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        f.lifecycle.teardown(ContainerId::new(99)).unwrap();

        f.lifecycle.register(id);
        f.lifecycle.attach(id).unwrap();
        f.lifecycle.teardown(id).unwrap();
        f.lifecycle.teardown(id).unwrap();

        let snap = state(&f, id);
        assert_eq!(snap.state, ControllerState::None);
        assert!(!snap.frame_registered());
        assert_eq!(*f.open.lock(), 0);
        assert_eq!(f.lifecycle.stats().controllers_torn_down, 1);
    }

    #[tokio::test]
    async fn test_failed_embed_closes_session() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        *f.host.fail_embed.lock() = true;
        f.lifecycle.register(id);

        let err = f.lifecycle.attach(id).unwrap_err();
        assert!(matches!(err, BridgeError::Host(_)));
        assert_eq!(*f.open.lock(), 0);
        assert_eq!(state(&f, id).state, ControllerState::None);
    }

    #[tokio::test]
    async fn test_panicking_embed_closes_session() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        f.lifecycle.register(id);
        f.lifecycle.attach(id).unwrap();
        assert_eq!(*f.open.lock(), 1);

        *f.host.panic_embed.lock() = true;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            f.lifecycle.create(id)
        }));
        assert!(result.is_err());
        f.lifecycle.settle();

        // Old controller released, new session closed while unwinding
        assert_eq!(*f.open.lock(), 0);
        assert!(f.host.embedded.lock().is_empty());
        let snap = state(&f, id);
        assert_eq!(snap.state, ControllerState::None);
        assert_eq!(snap.controller, None);

        *f.host.panic_embed.lock() = false;
        f.lifecycle.create(id).unwrap();
        assert_eq!(*f.open.lock(), 1);
        assert_eq!(state(&f, id).state, ControllerState::Active);
    }

    #[tokio::test]
    async fn test_switch_records_facing() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        f.lifecycle.switch_capture_source().unwrap();
        assert_eq!(f.config.camera_facing(), CameraFacing::Front);

        f.lifecycle.register(id);
        f.lifecycle.attach(id).unwrap();
        f.lifecycle.switch_capture_source().unwrap();
        assert_eq!(f.config.camera_facing(), CameraFacing::Back);
        assert_eq!(f.lifecycle.stats().camera_switches, 1);
    }

    /// Counts warn-level events seen while installed
    #[derive(Clone, Default)]
    struct WarnCounter(Arc<Mutex<u32>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                *self.0.lock() += 1;
            }
        }
    }

    #[tokio::test]
    async fn test_switch_without_controller_warns() {
        use tracing_subscriber::layer::SubscriberExt;

        let mut f = fixture(5);
        let warns = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(warns.clone());

        tracing::subscriber::with_default(subscriber, || {
            f.lifecycle.switch_capture_source().unwrap();
        });
        assert_eq!(*warns.0.lock(), 1);
        assert_eq!(f.lifecycle.stats().camera_switches, 0);
    }

    #[tokio::test]
    async fn test_dispose_forgets_container() {
        let mut f = fixture(5);
        let id = ContainerId::new(7);
        f.lifecycle.register(id);
        f.lifecycle.attach(id).unwrap();
        f.lifecycle.dispose(id).unwrap();

        assert!(f.lifecycle.snapshot().is_empty());
        assert!(f.lifecycle.frame_loop().is_empty());
        assert!(matches!(
            f.lifecycle.create(id),
            Err(BridgeError::ContainerNotFound(_))
        ));
    }
}
