//! Chaos testing for the embedded view lifecycle
//!
//! Replays seeded random sequences of host and control-channel events:
//! - attach, detach, create and teardown in any order
//! - activity and parent loss while creates are pending
//! - resizes, camera switches and frames interleaved with the above
//! - idle time so retry timers fire mid-sequence
//!
//! After every step the harness checks that host, backend and bridge agree.

use std::time::Duration;

use posebridge_core::{ContainerId, PropValue, Rect};
use posebridge_runtime::CommandId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::scenario::{Harness, PHONE_SCREEN};

/// One chaos step. Container indices are taken modulo the container count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChaosOp {
    Attach(usize),
    Detach(usize),
    Create(usize),
    Teardown(usize),
    Resize { index: usize, width: u32, height: u32 },
    Frames(u8),
    ActivityLost,
    ActivityRestored,
    ParentLost(usize),
    ParentZeroed(usize),
    ParentRestored(usize),
    SwitchCamera,
    Wait(u64),
}

/// Chaos run configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Number of containers created up front
    pub containers: usize,
    /// Number of operations to generate
    pub ops: usize,
    /// Probability that a step disturbs the host (activity or parent)
    pub host_fault_prob: f64,
    /// Longest idle step in milliseconds
    pub max_wait_ms: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            containers: 3,
            ops: 200,
            host_fault_prob: 0.15,
            max_wait_ms: 400,
        }
    }
}

impl ChaosConfig {
    /// A short run for property tests
    pub fn quick() -> Self {
        ChaosConfig {
            containers: 2,
            ops: 40,
            ..Default::default()
        }
    }
}

/// Generate a reproducible operation sequence
pub fn generate_ops(seed: u64, config: &ChaosConfig) -> Vec<ChaosOp> {
    let mut rng = StdRng::seed_from_u64(seed);
    let containers = config.containers.max(1);

    (0..config.ops)
        .map(|_| {
            let index = rng.gen_range(0..containers);
            if rng.gen_bool(config.host_fault_prob.clamp(0.0, 1.0)) {
                return match rng.gen_range(0..5) {
                    0 => ChaosOp::ActivityLost,
                    1 => ChaosOp::ActivityRestored,
                    2 => ChaosOp::ParentLost(index),
                    3 => ChaosOp::ParentZeroed(index),
                    _ => ChaosOp::ParentRestored(index),
                };
            }
            match rng.gen_range(0..9) {
                0 | 1 => ChaosOp::Create(index),
                2 => ChaosOp::Attach(index),
                3 => ChaosOp::Detach(index),
                4 => ChaosOp::Teardown(index),
                5 => ChaosOp::Resize {
                    index,
                    width: rng.gen_range(0..4) * 160,
                    height: rng.gen_range(0..4) * 240,
                },
                6 => ChaosOp::Frames(rng.gen_range(1..4)),
                7 => ChaosOp::SwitchCamera,
                _ => ChaosOp::Wait(rng.gen_range(1..=config.max_wait_ms.max(1))),
            }
        })
        .collect()
}

/// Outcome of a chaos run
#[derive(Clone, Debug, Default)]
pub struct ChaosReport {
    pub ops_run: usize,
    pub controllers_created: u64,
    pub controllers_torn_down: u64,
    pub retries_scheduled: u64,
    pub panics_caught: u64,
    /// Invariant violations, tagged with the step that exposed them
    pub violations: Vec<String>,
}

impl ChaosReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Containers used by a chaos run are tagged 1..=n
fn tag(index: usize) -> ContainerId {
    ContainerId::new(index as i32 + 1)
}

/// Run `ops` against a fresh harness with `containers` views
pub async fn run_ops(containers: usize, ops: &[ChaosOp]) -> ChaosReport {
    let containers = containers.max(1);
    let mut report = ChaosReport::default();
    let harness = match Harness::with_containers(containers) {
        Ok(harness) => harness,
        Err(err) => {
            report.violations.push(format!("setup: bridge failed to start: {}", err));
            return report;
        }
    };

    for index in 0..containers {
        if let Err(err) = harness.view(tag(index).0) {
            report.violations.push(format!("setup: view {} failed: {}", index, err));
            return report;
        }
    }

    for (step, op) in ops.iter().enumerate() {
        debug!(step, ?op, "chaos step");
        apply(&harness, containers, op).await;
        report.ops_run += 1;

        for violation in check_invariants(&harness).await {
            report
                .violations
                .push(format!("step {} {:?}: {}", step, op, violation));
        }
    }

    let stats = harness.stats().await;
    report.controllers_created = stats.controllers_created;
    report.controllers_torn_down = stats.controllers_torn_down;
    report.retries_scheduled = stats.retries_scheduled;
    report.panics_caught = stats.panics_caught;
    report
}

async fn apply(harness: &Harness, containers: usize, op: &ChaosOp) {
    let ui = harness.bridge.ui();
    let dispatcher = harness.bridge.dispatcher();
    let id = |index: usize| tag(index % containers);

    // Posting only fails once the UI thread is gone, which the invariant
    // check reports on its own
    match op {
        ChaosOp::Attach(i) => {
            let _ = ui.attach(id(*i));
        }
        ChaosOp::Detach(i) => {
            let _ = ui.detach(id(*i));
        }
        ChaosOp::Create(i) => dispatcher.dispatch_command(
            ContainerId::new(1),
            &CommandId::Name("create".into()),
            &[PropValue::Int(i64::from(id(*i).0))],
        ),
        ChaosOp::Teardown(i) => {
            let _ = ui.teardown(id(*i));
        }
        ChaosOp::Resize {
            index,
            width,
            height,
        } => {
            dispatcher.set_property(id(*index), "width", PropValue::Int(i64::from(*width)));
            dispatcher.set_property(id(*index), "height", PropValue::Int(i64::from(*height)));
        }
        ChaosOp::Frames(n) => {
            for _ in 0..*n {
                let _ = ui.frame();
            }
        }
        ChaosOp::ActivityLost => harness.host.set_activity(false),
        ChaosOp::ActivityRestored => harness.host.set_activity(true),
        ChaosOp::ParentLost(i) => harness.host.set_parent(id(*i), None),
        ChaosOp::ParentZeroed(i) => harness.host.set_parent(id(*i), Some(Rect::new(0, 0, 0, 0))),
        ChaosOp::ParentRestored(i) => harness.host.set_parent(id(*i), Some(PHONE_SCREEN)),
        ChaosOp::SwitchCamera => dispatcher.switch_capture_source(),
        ChaosOp::Wait(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
}

/// Cross-check host, backend and bridge state
pub async fn check_invariants(harness: &Harness) -> Vec<String> {
    let mut violations = harness.violations();
    if harness.bridge.ui().is_closed() {
        violations.push("UI thread stopped".to_string());
        return violations;
    }

    let snapshots = harness.settle().await;
    let mut live = 0;
    for snap in &snapshots {
        let embedded = harness.host.embedded(snap.id);
        let expected: Vec<_> = snap.controller.into_iter().collect();
        if embedded != expected {
            violations.push(format!(
                "container {}: host holds {:?}, bridge holds {:?}",
                snap.id, embedded, expected
            ));
        }

        if let Some(controller) = snap.controller {
            live += 1;
            if !snap.frame_registered() {
                violations.push(format!(
                    "container {}: controller {} without a frame loop",
                    snap.id, controller
                ));
            }
            if harness.backend.facing_of(controller).is_none() {
                violations.push(format!(
                    "container {}: controller {} has no open session",
                    snap.id, controller
                ));
            }
        }
    }

    let open = harness.backend.open_sessions();
    if open != live {
        violations.push(format!("{} sessions open for {} live controllers", open, live));
    }
    violations
}
