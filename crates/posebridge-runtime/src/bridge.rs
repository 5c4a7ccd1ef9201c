//! Wiring for a complete bridge instance

use std::sync::Arc;

use posebridge_core::{BridgeResult, ConfigReader, SharedConfiguration};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{ConfigError, RuntimeConfig};
use crate::dispatcher::CommandDispatcher;
use crate::display_link::DisplayLink;
use crate::factory::ContainerViewFactory;
use crate::host::{CaptureBackend, HostTree};
use crate::telemetry::init_tracing;
use crate::ui::{spawn_ui_thread, UiHandle};

/// A running bridge: UI thread, display link and the control-channel surface
pub struct PoseBridge {
    config: Arc<SharedConfiguration>,
    ui: UiHandle,
    dispatcher: CommandDispatcher,
    factory: ContainerViewFactory,
    display_link: Option<DisplayLink>,
    ui_task: JoinHandle<()>,
}

impl PoseBridge {
    /// Start a bridge on the current tokio runtime
    ///
    /// Installs the global tracing subscriber in `runtime.log_format` unless
    /// one is already set.
    pub fn start(
        host: Arc<dyn HostTree>,
        backend: Arc<dyn CaptureBackend>,
        runtime: &RuntimeConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_config(host, backend, SharedConfiguration::shared(), runtime)
    }

    /// Start a bridge around an existing configuration handle
    pub fn with_config(
        host: Arc<dyn HostTree>,
        backend: Arc<dyn CaptureBackend>,
        config: Arc<SharedConfiguration>,
        runtime: &RuntimeConfig,
    ) -> Result<Self, ConfigError> {
        runtime.validate()?;
        if !init_tracing(runtime.log_format) {
            debug!(format = %runtime.log_format, "tracing subscriber already installed");
        }

        let (ui, ui_task) =
            spawn_ui_thread(host, backend, Arc::clone(&config), runtime.retry.clone());
        let display_link = runtime
            .frame_interval
            .map(|interval| DisplayLink::start(ui.clone(), interval));

        info!(
            frame_interval = ?runtime.frame_interval,
            max_attempts = runtime.retry.max_attempts,
            "bridge started"
        );

        Ok(PoseBridge {
            dispatcher: CommandDispatcher::new(Arc::clone(&config), ui.clone()),
            factory: ContainerViewFactory::new(ui.clone()),
            config,
            ui,
            display_link,
            ui_task,
        })
    }

    pub fn config(&self) -> &Arc<SharedConfiguration> {
        &self.config
    }

    /// Read-only configuration view for the capture pipeline
    pub fn reader(&self) -> ConfigReader {
        ConfigReader::new(Arc::clone(&self.config))
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn factory(&self) -> &ContainerViewFactory {
        &self.factory
    }

    pub fn ui(&self) -> &UiHandle {
        &self.ui
    }

    pub fn display_link(&self) -> Option<&DisplayLink> {
        self.display_link.as_ref()
    }

    /// Stop the display link, release every controller and stop the UI thread
    pub async fn shutdown(mut self) -> BridgeResult<()> {
        if let Some(link) = self.display_link.take() {
            link.stop();
        }
        self.ui.shutdown().await?;
        let _ = (&mut self.ui_task).await;
        info!("bridge stopped");
        Ok(())
    }
}
