//! Core types shared across the recording pipeline

use std::sync::Arc;
use std::time::Duration;

/// Presentation timestamp of a captured frame or sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    /// Microseconds since the stream started delivering
    pub micros: i64,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { micros: 0 };

    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            micros: duration.as_micros() as i64,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.micros.max(0) as u64)
    }

    /// Absolute difference between two timestamps.
    pub fn diff(&self, other: Timestamp) -> Duration {
        Duration::from_micros((self.micros - other.micros).unsigned_abs())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.micros)
    }
}

/// Owned, encoder-ready video frame produced by the render stage.
///
/// The pixel data is NV12 (full-size luma plane followed by interleaved
/// half-height chroma), already mirrored and orientation-corrected, with
/// the capture timestamp preserved. Ownership passes to the recorder when
/// appended; the backing buffer is recycled into the render pool afterwards.
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    /// Luma plane followed by interleaved UV, tightly packed.
    pub nv12: Vec<u8>,
    pub pts: Timestamp,
}

impl RenderedFrame {
    pub fn luma(&self) -> &[u8] {
        &self.nv12[..(self.width * self.height) as usize]
    }

    pub fn chroma(&self) -> &[u8] {
        &self.nv12[(self.width * self.height) as usize..]
    }

    /// Reclaim the backing buffer for pool reuse.
    pub fn into_buffer(self) -> Vec<u8> {
        self.nv12
    }
}

impl std::fmt::Debug for RenderedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pts", &self.pts)
            .field("size", &self.nv12.len())
            .finish()
    }
}

/// One still image derived from the first successfully rendered frame.
///
/// Immutable after creation; cheap to clone so it can ride along both the
/// one-shot event and the final recording result.
#[derive(Clone)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    rgba: Arc<Vec<u8>>,
}

impl Thumbnail {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba: Arc::new(rgba),
        }
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

impl std::fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
