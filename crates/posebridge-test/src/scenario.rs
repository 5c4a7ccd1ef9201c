//! End-to-end scenarios against a simulated host
//!
//! The harness runs a full bridge with manually posted frames so tests decide
//! exactly when a frame happens. Under a paused tokio clock, `sleep` moves
//! time forward and lets retry timers fire before the next check.

use std::sync::Arc;
use std::time::Duration;

use posebridge_core::{BridgeResult, ContainerId, Rect};
use posebridge_runtime::{
    ConfigError, ContainerHandle, ContainerSnapshot, LifecycleStats, PoseBridge, RetryPolicy,
    RuntimeConfig,
};

use crate::sim_host::{SimulatedBackend, SimulatedHost};

/// Parent bounds used when a scenario does not care
pub const PHONE_SCREEN: Rect = Rect {
    x: 0,
    y: 0,
    width: 1080,
    height: 1920,
};

/// Retry delay used by [`Harness::new`]
pub const HARNESS_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A running bridge wired to a simulated host and backend
pub struct Harness {
    pub host: SimulatedHost,
    pub backend: SimulatedBackend,
    pub bridge: PoseBridge,
}

impl Harness {
    /// Manual frames, fixed 100ms retries, one camera session per container
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_containers(1)
    }

    pub fn with_containers(max_containers: usize) -> Result<Self, ConfigError> {
        let runtime = RuntimeConfig {
            retry: RetryPolicy::fixed(HARNESS_RETRY_DELAY, 20),
            frame_interval: None,
            ..Default::default()
        };
        Self::with_runtime(max_containers, &runtime)
    }

    pub fn with_runtime(
        max_containers: usize,
        runtime: &RuntimeConfig,
    ) -> Result<Self, ConfigError> {
        let host = SimulatedHost::new();
        let backend = SimulatedBackend::with_capacity(max_containers);
        let bridge = PoseBridge::start(
            Arc::new(host.clone()),
            Arc::new(backend.clone()),
            runtime,
        )?;
        Ok(Harness {
            host,
            backend,
            bridge,
        })
    }

    /// Create a view with a parent already in place
    pub fn view(&self, tag: i32) -> BridgeResult<ContainerHandle> {
        let id = ContainerId::new(tag);
        self.host.set_parent(id, Some(PHONE_SCREEN));
        self.bridge.factory().create_view(id)
    }

    /// Wait until the UI thread has applied everything posted so far
    pub async fn settle(&self) -> Vec<ContainerSnapshot> {
        self.bridge.ui().snapshot().await.unwrap_or_default()
    }

    pub async fn container(&self, tag: i32) -> Option<ContainerSnapshot> {
        self.settle()
            .await
            .into_iter()
            .find(|s| s.id == ContainerId::new(tag))
    }

    pub async fn stats(&self) -> LifecycleStats {
        self.bridge.ui().stats().await.unwrap_or_default()
    }

    /// Post `n` display frames and wait for them
    pub async fn frames(&self, n: usize) {
        for _ in 0..n {
            let _ = self.bridge.ui().frame();
        }
        self.settle().await;
    }

    /// Let `duration` pass, then wait for whatever it triggered
    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
        self.settle().await;
    }

    /// Invariant violations seen by the host or the backend
    pub fn violations(&self) -> Vec<String> {
        let mut all = self.host.violations();
        all.extend(self.backend.violations());
        all
    }
}
