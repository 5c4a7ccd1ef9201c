//! Shared capture configuration
//!
//! One instance lives for the whole process and is shared explicitly through
//! an `Arc`: the control channel writes it, the capture pipeline reads it once
//! per processed frame.
//!
//! # Visibility
//!
//! Every field is an independent atomic accessed with `Ordering::Relaxed`.
//! A write becomes visible to later reads eventually, a single field is never
//! torn, and nothing is promised about the order in which writes to
//! *different* fields become visible. There is no multi-field transaction;
//! last write wins per field.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::skeleton::Segment;

/// Body parts the overlay and event consumers can toggle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum BodyPart {
    Face = 0,
    Torso = 1,
    LeftArm = 2,
    RightArm = 3,
    LeftWrist = 4,
    RightWrist = 5,
    LeftLeg = 6,
    RightLeg = 7,
    LeftAnkle = 8,
    RightAnkle = 9,
}

impl BodyPart {
    pub const COUNT: usize = 10;

    /// All body parts in index order
    pub fn all() -> &'static [BodyPart] {
        &[
            BodyPart::Face,
            BodyPart::Torso,
            BodyPart::LeftArm,
            BodyPart::RightArm,
            BodyPart::LeftWrist,
            BodyPart::RightWrist,
            BodyPart::LeftLeg,
            BodyPart::RightLeg,
            BodyPart::LeftAnkle,
            BodyPart::RightAnkle,
        ]
    }

    /// Property key used by the control channel
    pub fn property_key(self) -> &'static str {
        match self {
            BodyPart::Face => "face",
            BodyPart::Torso => "torso",
            BodyPart::LeftArm => "leftArm",
            BodyPart::RightArm => "rightArm",
            BodyPart::LeftWrist => "leftWrist",
            BodyPart::RightWrist => "rightWrist",
            BodyPart::LeftLeg => "leftLeg",
            BodyPart::RightLeg => "rightLeg",
            BodyPart::LeftAnkle => "leftAnkle",
            BodyPart::RightAnkle => "rightAnkle",
        }
    }

    /// Look up a body part by its property key
    pub fn from_property_key(key: &str) -> Option<Self> {
        BodyPart::all()
            .iter()
            .copied()
            .find(|part| part.property_key() == key)
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Device orientation the pipeline should assume
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Orientation {
    #[default]
    Portrait = 0,
    Landscape = 1,
}

impl Orientation {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Orientation::Portrait),
            1 => Some(Orientation::Landscape),
            _ => None,
        }
    }

    /// Parse a control-channel name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "portrait" => Some(Orientation::Portrait),
            "landscape" => Some(Orientation::Landscape),
            _ => None,
        }
    }
}

/// Pose landmarker model variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ModelVariant {
    #[default]
    Lite = 0,
    Full = 1,
    Heavy = 2,
}

impl ModelVariant {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ModelVariant::Lite),
            1 => Some(ModelVariant::Full),
            2 => Some(ModelVariant::Heavy),
            _ => None,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lite" => Some(ModelVariant::Lite),
            "full" => Some(ModelVariant::Full),
            "heavy" => Some(ModelVariant::Heavy),
            _ => None,
        }
    }

    /// Integer codes used by the Android landmarker helper
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ModelVariant::Full),
            1 => Some(ModelVariant::Lite),
            2 => Some(ModelVariant::Heavy),
            _ => None,
        }
    }

    /// Model asset file the pipeline loads
    pub fn asset_name(self) -> &'static str {
        match self {
            ModelVariant::Lite => "pose_landmarker_lite.task",
            ModelVariant::Full => "pose_landmarker_full.task",
            ModelVariant::Heavy => "pose_landmarker_heavy.task",
        }
    }
}

/// Where inference runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum ComputeDelegate {
    Cpu = 0,
    #[default]
    Gpu = 1,
}

impl ComputeDelegate {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ComputeDelegate::Cpu),
            1 => Some(ComputeDelegate::Gpu),
            _ => None,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "CPU" => Some(ComputeDelegate::Cpu),
            "GPU" => Some(ComputeDelegate::Gpu),
            _ => None,
        }
    }

    /// Integer codes used by the Android landmarker helper
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ComputeDelegate::Cpu),
            1 => Some(ComputeDelegate::Gpu),
            _ => None,
        }
    }
}

/// Which camera the capture session uses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CameraFacing {
    #[default]
    Front = 0,
    Back = 1,
}

impl CameraFacing {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(CameraFacing::Front),
            1 => Some(CameraFacing::Back),
            _ => None,
        }
    }

    /// The other camera
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

/// Default landmarker confidence thresholds
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
/// Default number of poses to detect
pub const DEFAULT_NUM_POSES: u32 = 1;

/// Process-wide capture configuration
#[derive(Debug)]
pub struct SharedConfiguration {
    body_parts: [AtomicBool; BodyPart::COUNT],
    orientation: AtomicU8,
    model: AtomicU8,
    delegate: AtomicU8,
    /// Landmark events per second, 0 = unthrottled
    event_hz: AtomicU32,
    show_overlay: AtomicBool,
    num_poses: AtomicU32,
    // f32 bit patterns
    min_detection_confidence: AtomicU32,
    min_tracking_confidence: AtomicU32,
    min_presence_confidence: AtomicU32,
    camera_facing: AtomicU8,
}

impl Default for SharedConfiguration {
    fn default() -> Self {
        SharedConfiguration {
            body_parts: std::array::from_fn(|_| AtomicBool::new(false)),
            orientation: AtomicU8::new(Orientation::default() as u8),
            model: AtomicU8::new(ModelVariant::default() as u8),
            delegate: AtomicU8::new(ComputeDelegate::default() as u8),
            event_hz: AtomicU32::new(0),
            show_overlay: AtomicBool::new(true),
            num_poses: AtomicU32::new(DEFAULT_NUM_POSES),
            min_detection_confidence: AtomicU32::new(DEFAULT_CONFIDENCE.to_bits()),
            min_tracking_confidence: AtomicU32::new(DEFAULT_CONFIDENCE.to_bits()),
            min_presence_confidence: AtomicU32::new(DEFAULT_CONFIDENCE.to_bits()),
            camera_facing: AtomicU8::new(CameraFacing::default() as u8),
        }
    }
}

impl SharedConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shareable handle
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // Body parts

    pub fn body_part_enabled(&self, part: BodyPart) -> bool {
        self.body_parts[part.index()].load(Ordering::Relaxed)
    }

    pub fn set_body_part(&self, part: BodyPart, enabled: bool) {
        self.body_parts[part.index()].store(enabled, Ordering::Relaxed);
    }

    /// Enabled body parts in index order
    pub fn enabled_parts(&self) -> Vec<BodyPart> {
        BodyPart::all()
            .iter()
            .copied()
            .filter(|part| self.body_part_enabled(*part))
            .collect()
    }

    /// Skeleton segments the overlay should draw for the enabled parts
    pub fn enabled_segments(&self) -> Vec<Segment> {
        self.enabled_parts()
            .into_iter()
            .flat_map(|part| part.segments().iter().copied())
            .collect()
    }

    // Pipeline parameters

    pub fn orientation(&self) -> Orientation {
        Orientation::from_byte(self.orientation.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_orientation(&self, orientation: Orientation) {
        self.orientation.store(orientation as u8, Ordering::Relaxed);
    }

    pub fn model(&self) -> ModelVariant {
        ModelVariant::from_byte(self.model.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_model(&self, model: ModelVariant) {
        self.model.store(model as u8, Ordering::Relaxed);
    }

    pub fn delegate(&self) -> ComputeDelegate {
        ComputeDelegate::from_byte(self.delegate.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_delegate(&self, delegate: ComputeDelegate) {
        self.delegate.store(delegate as u8, Ordering::Relaxed);
    }

    pub fn event_hz(&self) -> u32 {
        self.event_hz.load(Ordering::Relaxed)
    }

    pub fn set_event_hz(&self, hz: u32) {
        self.event_hz.store(hz, Ordering::Relaxed);
    }

    pub fn show_overlay(&self) -> bool {
        self.show_overlay.load(Ordering::Relaxed)
    }

    pub fn set_show_overlay(&self, show: bool) {
        self.show_overlay.store(show, Ordering::Relaxed);
    }

    pub fn num_poses(&self) -> u32 {
        self.num_poses.load(Ordering::Relaxed)
    }

    /// Clamped to at least one pose
    pub fn set_num_poses(&self, num_poses: u32) {
        self.num_poses.store(num_poses.max(1), Ordering::Relaxed);
    }

    pub fn min_detection_confidence(&self) -> f32 {
        f32::from_bits(self.min_detection_confidence.load(Ordering::Relaxed))
    }

    /// Non-finite input is ignored; finite input is clamped to [0, 1]
    pub fn set_min_detection_confidence(&self, confidence: f32) {
        store_confidence(&self.min_detection_confidence, confidence);
    }

    pub fn min_tracking_confidence(&self) -> f32 {
        f32::from_bits(self.min_tracking_confidence.load(Ordering::Relaxed))
    }

    pub fn set_min_tracking_confidence(&self, confidence: f32) {
        store_confidence(&self.min_tracking_confidence, confidence);
    }

    pub fn min_presence_confidence(&self) -> f32 {
        f32::from_bits(self.min_presence_confidence.load(Ordering::Relaxed))
    }

    pub fn set_min_presence_confidence(&self, confidence: f32) {
        store_confidence(&self.min_presence_confidence, confidence);
    }

    pub fn camera_facing(&self) -> CameraFacing {
        CameraFacing::from_byte(self.camera_facing.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_camera_facing(&self, facing: CameraFacing) {
        self.camera_facing.store(facing as u8, Ordering::Relaxed);
    }

    /// Read every field once
    ///
    /// Fields are read independently; a concurrent writer may be half-way
    /// through a sequence of updates.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            enabled_parts: self.enabled_parts(),
            orientation: self.orientation(),
            model: self.model(),
            delegate: self.delegate(),
            event_hz: self.event_hz(),
            show_overlay: self.show_overlay(),
            num_poses: self.num_poses(),
            min_detection_confidence: self.min_detection_confidence(),
            min_tracking_confidence: self.min_tracking_confidence(),
            min_presence_confidence: self.min_presence_confidence(),
            camera_facing: self.camera_facing(),
        }
    }
}

fn store_confidence(slot: &AtomicU32, confidence: f32) {
    if !confidence.is_finite() {
        return;
    }
    slot.store(confidence.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
}

/// Point-in-time copy of the configuration, taken once per processed frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub enabled_parts: Vec<BodyPart>,
    pub orientation: Orientation,
    pub model: ModelVariant,
    pub delegate: ComputeDelegate,
    pub event_hz: u32,
    pub show_overlay: bool,
    pub num_poses: u32,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub min_presence_confidence: f32,
    pub camera_facing: CameraFacing,
}

impl ConfigSnapshot {
    pub fn is_enabled(&self, part: BodyPart) -> bool {
        self.enabled_parts.contains(&part)
    }
}

/// Read-only view of the configuration handed to the capture pipeline
#[derive(Clone, Debug)]
pub struct ConfigReader {
    inner: Arc<SharedConfiguration>,
}

impl ConfigReader {
    pub fn new(inner: Arc<SharedConfiguration>) -> Self {
        ConfigReader { inner }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.inner.snapshot()
    }

    pub fn body_part_enabled(&self, part: BodyPart) -> bool {
        self.inner.body_part_enabled(part)
    }

    pub fn enabled_segments(&self) -> Vec<Segment> {
        self.inner.enabled_segments()
    }

    pub fn orientation(&self) -> Orientation {
        self.inner.orientation()
    }

    pub fn model(&self) -> ModelVariant {
        self.inner.model()
    }

    pub fn delegate(&self) -> ComputeDelegate {
        self.inner.delegate()
    }

    pub fn event_hz(&self) -> u32 {
        self.inner.event_hz()
    }

    pub fn show_overlay(&self) -> bool {
        self.inner.show_overlay()
    }

    pub fn num_poses(&self) -> u32 {
        self.inner.num_poses()
    }

    pub fn min_detection_confidence(&self) -> f32 {
        self.inner.min_detection_confidence()
    }

    pub fn min_tracking_confidence(&self) -> f32 {
        self.inner.min_tracking_confidence()
    }

    pub fn min_presence_confidence(&self) -> f32 {
        self.inner.min_presence_confidence()
    }

    pub fn camera_facing(&self) -> CameraFacing {
        self.inner.camera_facing()
    }
}
