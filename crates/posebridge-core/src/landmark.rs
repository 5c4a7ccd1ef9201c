//! Landmark events emitted by the capture pipeline
//!
//! The pipeline itself is external; this module fixes the payload shape it
//! hands to the control channel and the rate gate it must honor.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::skeleton::POSE_LANDMARK_COUNT;
use crate::{BridgeError, BridgeResult};

/// A single detected landmark (normalized image coordinates)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
    pub presence: f32,
}

/// Dimensions of the frame the landmarks were detected in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameInfo {
    pub height: u32,
    pub width: u32,
}

/// Payload of one `onLandmark` event
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkEvent {
    pub landmarks: Vec<Landmark>,
    pub world_landmarks: Vec<Landmark>,
    pub additional_data: FrameInfo,
}

impl LandmarkEvent {
    /// Build an event; world landmarks are only kept when the full pose is present
    pub fn new(
        landmarks: Vec<Landmark>,
        world_landmarks: Vec<Landmark>,
        width: u32,
        height: u32,
    ) -> Self {
        let world_landmarks = if world_landmarks.len() == POSE_LANDMARK_COUNT {
            world_landmarks
        } else {
            Vec::new()
        };

        LandmarkEvent {
            landmarks,
            world_landmarks,
            additional_data: FrameInfo { height, width },
        }
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        serde_json::to_string(self).map_err(|e| BridgeError::Capture(e.to_string()))
    }
}

/// Rate gate for landmark events
///
/// With a rate of `hz` events per second, an event passes only if at least
/// `1000 / hz` milliseconds elapsed since the last one that passed. A rate of
/// zero disables the gate.
#[derive(Debug, Default)]
pub struct EventThrottle {
    last_emit: Mutex<Option<Instant>>,
}

impl EventThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum spacing between events for a rate, if throttled
    pub fn interval_for(hz: u32) -> Option<Duration> {
        if hz == 0 {
            None
        } else {
            Some(Duration::from_millis(1000 / u64::from(hz)))
        }
    }

    /// Decide whether an event at `now` may be emitted, recording it if so
    pub fn try_acquire(&self, now: Instant, hz: u32) -> bool {
        let Some(interval) = Self::interval_for(hz) else {
            return true;
        };

        let mut last = self.last_emit.lock();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Forget the last emission (e.g. when the capture session restarts)
    pub fn reset(&self) {
        *self.last_emit.lock() = None;
    }
}
