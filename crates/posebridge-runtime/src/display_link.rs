//! Display frame source
//!
//! Posts a frame tick to the UI thread once per display interval. Ticks that
//! fall behind are skipped rather than bunched, like a vsync callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::ui::UiHandle;

/// A running frame source. Stops when dropped.
#[derive(Debug)]
pub struct DisplayLink {
    task: JoinHandle<()>,
    frames: Arc<AtomicU64>,
    interval: Duration,
}

impl DisplayLink {
    /// Start posting frames every `interval`. The first tick fires immediately.
    pub fn start(ui: UiHandle, interval: Duration) -> Self {
        let frames = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&frames);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if ui.frame().is_err() {
                    debug!("display link stopping: UI thread gone");
                    break;
                }
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        DisplayLink {
            task,
            frames,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Frames posted so far
    pub fn frames_posted(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DisplayLink {
    fn drop(&mut self) {
        self.task.abort();
    }
}
