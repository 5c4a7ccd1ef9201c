//! Per-frame corrective layout
//!
//! The host's layout pass does not reliably size views it does not own, so
//! every display frame each registered container is forced back onto its
//! target size and its parent's bounds:
//! 1. Read the target size
//! 2. Read the parent bounds (no parent: skip, stay registered)
//! 3. Measure to exactly the target if it is nonzero and changed or dirty
//! 4. Lay out at the parent's full bounds if they are nonzero
//! 5. Notify the host's layout observers
//!
//! Registrations and frames are both handled on the UI thread, so once a
//! registration is cancelled no later frame can touch that container.

use std::collections::{BTreeMap, HashMap};

use posebridge_core::{ContainerId, LayoutTarget};
use tracing::trace;

use crate::container::Container;
use crate::host::HostTree;

/// What one frame did, summed over all registered containers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub visited: u32,
    pub measured: u32,
    pub laid_out: u32,
    pub skipped_no_parent: u32,
}

/// Registry of frame callbacks, one per container
#[derive(Debug, Default)]
pub struct FrameLayoutLoop {
    registrations: BTreeMap<ContainerId, u64>,
    next_generation: u64,
    frames: u64,
}

impl FrameLayoutLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `container`, replacing any prior registration.
    /// Returns the new generation.
    pub fn start(&mut self, container: ContainerId) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        if let Some(prev) = self.registrations.insert(container, generation) {
            trace!(container = %container, prev, generation, "frame loop restarted");
        } else {
            trace!(container = %container, generation, "frame loop started");
        }
        generation
    }

    /// Drop the registration for `container`. Returns true if one existed.
    pub fn cancel(&mut self, container: ContainerId) -> bool {
        self.registrations.remove(&container).is_some()
    }

    #[inline]
    pub fn is_registered(&self, container: ContainerId) -> bool {
        self.registrations.contains_key(&container)
    }

    pub fn generation(&self, container: ContainerId) -> Option<u64> {
        self.registrations.get(&container).copied()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Frames processed so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run one display frame over every registered container
    pub fn run_frame(
        &mut self,
        containers: &mut HashMap<ContainerId, Container>,
        host: &dyn HostTree,
    ) -> FrameReport {
        self.frames += 1;
        let mut report = FrameReport::default();

        // Registrations whose container is gone are dropped here
        self.registrations.retain(|id, _| containers.contains_key(id));

        for id in self.registrations.keys() {
            let Some(container) = containers.get_mut(id) else {
                continue;
            };
            report.visited += 1;

            let Some(parent) = host.parent_bounds(*id) else {
                report.skipped_no_parent += 1;
                continue;
            };

            let target = LayoutTarget::derive(container.target, parent);
            if target.should_measure() && container.needs_measure() {
                host.measure(*id, target.measure);
                container.last_measured = Some(target.measure);
                container.dirty = false;
                report.measured += 1;
            }
            if target.should_fill() {
                host.layout(*id, target.frame);
                report.laid_out += 1;
            }
            host.notify_layout_changed(*id);
        }

        report
    }
}
