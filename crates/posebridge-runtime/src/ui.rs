//! The UI thread
//!
//! A single tokio task owns the lifecycle and drains one FIFO mailbox.
//! Anything that touches containers or controllers is posted here as a
//! [`UiMessage`]; callers never wait for it to be applied. Each message is
//! handled under `catch_unwind`, so a panicking host callback costs that one
//! message and nothing else.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use posebridge_core::{BridgeError, BridgeResult, ContainerId, ErrorKind, SharedConfiguration};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::container::ContainerSnapshot;
use crate::host::{CaptureBackend, HostTree};
use crate::lifecycle::{EmbeddedViewLifecycle, LifecycleStats};
use crate::retry::{RetryPolicy, RetryScheduler};

/// Work for the UI thread
#[derive(Debug)]
pub enum UiMessage {
    Register(ContainerId),
    Attach(ContainerId),
    Detach(ContainerId),
    Dispose(ContainerId),
    Create(ContainerId),
    Teardown(ContainerId),
    SetWidth(ContainerId, u32),
    SetHeight(ContainerId, u32),
    SwitchCamera,
    Frame,
    Retry { container: ContainerId, token: u64 },
    Snapshot(oneshot::Sender<Vec<ContainerSnapshot>>),
    Stats(oneshot::Sender<LifecycleStats>),
    Shutdown(oneshot::Sender<()>),
}

impl UiMessage {
    pub fn name(&self) -> &'static str {
        match self {
            UiMessage::Register(_) => "register",
            UiMessage::Attach(_) => "attach",
            UiMessage::Detach(_) => "detach",
            UiMessage::Dispose(_) => "dispose",
            UiMessage::Create(_) => "create",
            UiMessage::Teardown(_) => "teardown",
            UiMessage::SetWidth(..) => "set_width",
            UiMessage::SetHeight(..) => "set_height",
            UiMessage::SwitchCamera => "switch_camera",
            UiMessage::Frame => "frame",
            UiMessage::Retry { .. } => "retry",
            UiMessage::Snapshot(_) => "snapshot",
            UiMessage::Stats(_) => "stats",
            UiMessage::Shutdown(_) => "shutdown",
        }
    }
}

/// Cloneable sender side of the UI mailbox
#[derive(Clone, Debug)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiMessage>,
}

impl UiHandle {
    /// A handle whose mailbox the caller drains itself
    pub fn detached() -> (UiHandle, mpsc::UnboundedReceiver<UiMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (UiHandle { tx }, rx)
    }

    /// Enqueue a message. Fails only once the UI thread has stopped.
    pub fn post(&self, message: UiMessage) -> BridgeResult<()> {
        self.tx
            .send(message)
            .map_err(|_| BridgeError::UiThreadClosed)
    }

    pub fn register(&self, container: ContainerId) -> BridgeResult<()> {
        self.post(UiMessage::Register(container))
    }

    pub fn attach(&self, container: ContainerId) -> BridgeResult<()> {
        self.post(UiMessage::Attach(container))
    }

    pub fn detach(&self, container: ContainerId) -> BridgeResult<()> {
        self.post(UiMessage::Detach(container))
    }

    pub fn dispose(&self, container: ContainerId) -> BridgeResult<()> {
        self.post(UiMessage::Dispose(container))
    }

    pub fn create(&self, container: ContainerId) -> BridgeResult<()> {
        self.post(UiMessage::Create(container))
    }

    pub fn teardown(&self, container: ContainerId) -> BridgeResult<()> {
        self.post(UiMessage::Teardown(container))
    }

    pub fn set_width(&self, container: ContainerId, width: u32) -> BridgeResult<()> {
        self.post(UiMessage::SetWidth(container, width))
    }

    pub fn set_height(&self, container: ContainerId, height: u32) -> BridgeResult<()> {
        self.post(UiMessage::SetHeight(container, height))
    }

    pub fn switch_camera(&self) -> BridgeResult<()> {
        self.post(UiMessage::SwitchCamera)
    }

    /// Post one display frame
    pub fn frame(&self) -> BridgeResult<()> {
        self.post(UiMessage::Frame)
    }

    /// Snapshot of every container, taken after all earlier messages
    pub async fn snapshot(&self) -> BridgeResult<Vec<ContainerSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.post(UiMessage::Snapshot(reply))?;
        rx.await.map_err(|_| BridgeError::UiThreadClosed)
    }

    pub async fn container(&self, id: ContainerId) -> BridgeResult<ContainerSnapshot> {
        self.snapshot()
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or(BridgeError::ContainerNotFound(id))
    }

    pub async fn stats(&self) -> BridgeResult<LifecycleStats> {
        let (reply, rx) = oneshot::channel();
        self.post(UiMessage::Stats(reply))?;
        rx.await.map_err(|_| BridgeError::UiThreadClosed)
    }

    /// Tear everything down and stop the UI thread
    pub async fn shutdown(&self) -> BridgeResult<()> {
        let (reply, rx) = oneshot::channel();
        self.post(UiMessage::Shutdown(reply))?;
        rx.await.map_err(|_| BridgeError::UiThreadClosed)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the UI thread on the current tokio runtime
pub fn spawn_ui_thread(
    host: Arc<dyn HostTree>,
    backend: Arc<dyn CaptureBackend>,
    config: Arc<SharedConfiguration>,
    retry: RetryPolicy,
) -> (UiHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let retries = RetryScheduler::new(retry, tx.downgrade());
    let lifecycle = EmbeddedViewLifecycle::new(host, backend, config, retries);
    let task = tokio::spawn(run(lifecycle, rx));
    (UiHandle { tx }, task)
}

enum Flow {
    Continue,
    Stop,
}

async fn run(mut lifecycle: EmbeddedViewLifecycle, mut rx: mpsc::UnboundedReceiver<UiMessage>) {
    debug!("UI thread started");

    while let Some(message) = rx.recv().await {
        let name = message.name();
        lifecycle.stats_mut().messages += 1;

        match panic::catch_unwind(AssertUnwindSafe(|| handle(&mut lifecycle, message))) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(payload) => {
                let err = BridgeError::Panicked(panic_message(payload.as_ref()));
                error!(message = name, %err, "UI message panicked");
                lifecycle.stats_mut().panics_caught += 1;
                lifecycle.settle();
            }
        }
    }

    // Mailbox closed without a shutdown: still release every camera
    lifecycle.teardown_all();
    debug!("UI thread stopped");
}

fn handle(lifecycle: &mut EmbeddedViewLifecycle, message: UiMessage) -> Flow {
    let name = message.name();
    let result = match message {
        UiMessage::Register(id) => {
            lifecycle.register(id);
            Ok(())
        }
        UiMessage::Attach(id) => lifecycle.attach(id),
        UiMessage::Detach(id) => lifecycle.detach(id),
        UiMessage::Dispose(id) => lifecycle.dispose(id),
        UiMessage::Create(id) => lifecycle.create(id),
        UiMessage::Teardown(id) => lifecycle.teardown(id),
        UiMessage::SetWidth(id, width) => lifecycle.set_width(id, width),
        UiMessage::SetHeight(id, height) => lifecycle.set_height(id, height),
        UiMessage::SwitchCamera => lifecycle.switch_capture_source(),
        UiMessage::Frame => {
            lifecycle.frame();
            Ok(())
        }
        UiMessage::Retry { container, token } => lifecycle.retry(container, token),
        UiMessage::Snapshot(reply) => {
            let _ = reply.send(lifecycle.snapshot());
            Ok(())
        }
        UiMessage::Stats(reply) => {
            let _ = reply.send(lifecycle.stats());
            Ok(())
        }
        UiMessage::Shutdown(reply) => {
            lifecycle.teardown_all();
            let _ = reply.send(());
            return Flow::Stop;
        }
    };

    if let Err(err) = result {
        lifecycle.stats_mut().errors += 1;
        log_error(name, &err);
    }
    Flow::Continue
}

fn log_error(message: &'static str, err: &BridgeError) {
    match err.kind() {
        ErrorKind::TransientPrecondition | ErrorKind::InvalidInput => {
            debug!(message, %err, "UI message dropped")
        }
        ErrorKind::InternalFault => warn!(message, %err, "UI message failed"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ControllerState;
    use crate::host::CaptureSession;
    use parking_lot::Mutex;
    use posebridge_core::{CameraFacing, ConfigReader, ControllerId, Rect, Size};
    use std::time::Duration;

    #[derive(Default)]
    struct Host {
        reachable: Mutex<bool>,
        panic_on_measure: Mutex<bool>,
        measured: Mutex<Vec<Size>>,
    }

    impl HostTree for Host {
        fn activity_reachable(&self) -> bool {
            *self.reachable.lock()
        }
        fn parent_bounds(&self, _: ContainerId) -> Option<Rect> {
            Some(Rect::new(0, 0, 1080, 1920))
        }
        fn measure(&self, _: ContainerId, size: Size) {
            if *self.panic_on_measure.lock() {
                panic!("measure blew up");
            }
            self.measured.lock().push(size);
        }
        fn layout(&self, _: ContainerId, _: Rect) {}
        fn notify_layout_changed(&self, _: ContainerId) {}
        fn embed_controller(&self, _: ContainerId, _: ControllerId) -> BridgeResult<()> {
            Ok(())
        }
        fn remove_controller(&self, _: ContainerId, _: ControllerId) {}
    }

    struct Backend;
    struct Session;

    impl CaptureSession for Session {
        fn switch_camera(&mut self) -> BridgeResult<CameraFacing> {
            Ok(CameraFacing::Back)
        }
        fn close(&mut self) {}
    }

    impl CaptureBackend for Backend {
        fn open_session(
            &self,
            _: ControllerId,
            _: ConfigReader,
            _: CameraFacing,
        ) -> BridgeResult<Box<dyn CaptureSession>> {
            Ok(Box::new(Session))
        }
    }

    fn spawn(host: Arc<Host>) -> (UiHandle, JoinHandle<()>) {
        spawn_ui_thread(
            host,
            Arc::new(Backend),
            SharedConfiguration::shared(),
            RetryPolicy::fixed(Duration::from_millis(100), 10),
        )
    }

    #[tokio::test]
    async fn test_messages_applied_in_order() {
        let host = Arc::new(Host::default());
        *host.reachable.lock() = true;
        let (ui, _task) = spawn(host.clone());
        let id = ContainerId::new(3);

        ui.register(id).unwrap();
        ui.set_width(id, 100).unwrap();
        ui.set_width(id, 480).unwrap();
        ui.set_height(id, 640).unwrap();
        ui.attach(id).unwrap();
        ui.frame().unwrap();

        let snap = ui.container(id).await.unwrap();
        assert_eq!(snap.target, (480, 640));
        assert_eq!(snap.state, ControllerState::Active);
        assert_eq!(*host.measured.lock(), vec![Size::new(480, 640)]);
    }

    #[tokio::test]
    async fn test_panic_does_not_kill_ui_thread() {
        let host = Arc::new(Host::default());
        *host.reachable.lock() = true;
        *host.panic_on_measure.lock() = true;
        let (ui, _task) = spawn(host.clone());
        let id = ContainerId::new(3);

        ui.register(id).unwrap();
        ui.set_width(id, 480).unwrap();
        ui.set_height(id, 640).unwrap();
        ui.attach(id).unwrap();
        ui.frame().unwrap();

        let stats = ui.stats().await.unwrap();
        assert_eq!(stats.panics_caught, 1);
        assert_eq!(ui.container(id).await.unwrap().state, ControllerState::Active);
    }

    #[tokio::test]
    async fn test_unknown_container_is_noop() {
        let (ui, _task) = spawn(Arc::new(Host::default()));
        ui.create(ContainerId::new(42)).unwrap();
        ui.teardown(ContainerId::new(42)).unwrap();

        assert!(ui.snapshot().await.unwrap().is_empty());
        assert_eq!(ui.stats().await.unwrap().errors, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_thread() {
        let (ui, task) = spawn(Arc::new(Host::default()));
        ui.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(ui.is_closed());
        assert_eq!(ui.frame(), Err(BridgeError::UiThreadClosed));
    }
}
