//! Bounded, cancellable retries for controller creation

use std::time::Duration;

use posebridge_core::ContainerId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::ui::UiMessage;

/// How failed create preconditions are retried
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub delay: Duration,
    /// Multiplier applied per attempt (1.0 keeps the delay fixed)
    pub backoff_factor: f64,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Attempts allowed per explicit create, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delay: Duration::from_millis(100),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(2),
            max_attempts: 50,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        RetryPolicy {
            delay,
            backoff_factor: 1.0,
            max_delay: delay,
            max_attempts,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        if exp == 0 || self.backoff_factor == 1.0 {
            return self.delay.min(self.max_delay);
        }
        let scaled = self.delay.as_secs_f64() * self.backoff_factor.powi(exp);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Is another attempt allowed after `attempt` attempts failed?
    #[inline]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// A scheduled retry. Dropping it cancels the timer.
#[derive(Debug)]
pub struct PendingRetry {
    pub token: u64,
    /// Number of the attempt this retry will make
    pub attempt: u32,
    task: JoinHandle<()>,
}

impl Drop for PendingRetry {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns retry timers that post back to the UI thread
pub struct RetryScheduler {
    policy: RetryPolicy,
    mailbox: WeakUnboundedSender<UiMessage>,
    next_token: u64,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy, mailbox: WeakUnboundedSender<UiMessage>) -> Self {
        RetryScheduler {
            policy,
            mailbox,
            next_token: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Schedule the retry that follows failed attempt `failed_attempt`.
    /// Returns `None` once the policy is exhausted.
    pub fn schedule(&mut self, container: ContainerId, failed_attempt: u32) -> Option<PendingRetry> {
        if !self.policy.allows_retry_after(failed_attempt) {
            return None;
        }

        self.next_token += 1;
        let token = self.next_token;
        let delay = self.policy.delay_for(failed_attempt);
        let mailbox = self.mailbox.clone();

        trace!(container = %container, token, ?delay, "retry scheduled");
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(UiMessage::Retry { container, token });
            }
        });

        Some(PendingRetry {
            token,
            attempt: failed_attempt + 1,
            task,
        })
    }
}
