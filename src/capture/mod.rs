//! Capture module
//!
//! Owns the device seams (camera and microphone sources), the capture
//! session that funnels both callback streams into one ordered delivery
//! path, and the frame/sample types that cross it.

pub mod audio;
pub mod pattern;
pub mod session;
mod traits;

pub use audio::MicrophoneSource;
pub use pattern::TestPatternSource;
pub use session::{CaptureSession, CaptureSink};
pub use traits::{AudioSource, RawAudioSample, RawVideoFrame, VideoSource};

use crate::pipeline::types::Timestamp;

/// Pixel layout of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Full-size luma plane followed by interleaved half-height chroma.
    Nv12,
    /// 8-bit RGBA, row-major.
    Rgba,
}

/// Device-native orientation of delivered frames. The render stage rotates
/// the pixels so the encoded stream is always upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Rotate180,
    Counterclockwise90,
}

/// Capability descriptor of a video stream: everything needed to configure
/// an encoder track for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub layout: PixelLayout,
    pub rotation: Rotation,
}

impl VideoFormat {
    /// Frame byte length for this format, stride included.
    pub fn frame_len(&self, stride: u32) -> usize {
        match self.layout {
            PixelLayout::Nv12 => (stride * self.height * 3 / 2) as usize,
            PixelLayout::Rgba => (stride * self.height * 4) as usize,
        }
    }
}

/// Capability descriptor of an audio stream. Samples are interleaved i16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Owned copy of one video callback's buffer, produced by the capture
/// sink's copy-out and delivered over the serial channel.
pub struct OwnedVideoFrame {
    pub format: VideoFormat,
    /// Pixel rows, `stride` pixels apart (bytes for NV12, 4x for RGBA).
    pub data: Vec<u8>,
    pub stride: u32,
    pub pts: Timestamp,
}

impl std::fmt::Debug for OwnedVideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedVideoFrame")
            .field("format", &self.format)
            .field("stride", &self.stride)
            .field("pts", &self.pts)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Owned copy of one audio callback's samples.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub format: AudioFormat,
    /// Interleaved i16 samples.
    pub samples: Vec<i16>,
    pub pts: Timestamp,
}

impl AudioChunk {
    /// Playback length of this chunk.
    pub fn duration(&self) -> std::time::Duration {
        let frames = self.samples.len() as u64 / self.format.channels.max(1) as u64;
        std::time::Duration::from_micros(frames * 1_000_000 / self.format.sample_rate as u64)
    }
}

/// A single event on the ordered capture delivery path.
#[derive(Debug)]
pub enum CaptureEvent {
    Video(OwnedVideoFrame),
    Audio(AudioChunk),
}
