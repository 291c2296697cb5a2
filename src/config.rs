use crate::assets::{
    FRAME_RATE, MAX_DURATION, MIN_DURATION, NOTE_SIDE, RETAINED_BUFFERS, WARMUP_EVENTS,
};
use std::time::Duration;

/// Capture quality preset requested from a video source.
///
/// A source that cannot honor the requested preset reports the closest
/// one it supports and the session silently falls back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityPreset {
    Low,
    Medium,
    High,
}

impl QualityPreset {
    /// Capture resolution hint for this preset, as (width, height).
    pub fn resolution_hint(&self) -> (u32, u32) {
        match self {
            QualityPreset::Low => (480, 360),
            QualityPreset::Medium => (640, 480),
            QualityPreset::High => (1280, 720),
        }
    }
}

/// Tunables recognized by the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Output geometry of the rendered (square) note.
    pub note_side: u32,
    pub frame_rate: u32,
    /// Recording is cut off once this much media has been appended.
    pub max_duration: Duration,
    /// Recordings shorter than this are discarded on stop.
    pub min_duration: Duration,
    /// Leading audio+video events discarded while the camera settles.
    pub warmup_events: u32,
    /// Upper bound on rendered buffers retained by the render stage.
    pub retained_buffers: usize,
    pub preset: QualityPreset,
    /// Mirror the image horizontally (front-camera selfie view).
    pub mirror: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            note_side: NOTE_SIDE,
            frame_rate: FRAME_RATE,
            max_duration: MAX_DURATION,
            min_duration: MIN_DURATION,
            warmup_events: WARMUP_EVENTS,
            retained_buffers: RETAINED_BUFFERS,
            preset: QualityPreset::Medium,
            mirror: true,
        }
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
