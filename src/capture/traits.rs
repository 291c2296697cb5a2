//! Traits for capture sources
//!
//! A source owns one hardware stream and pushes timestamped raw buffers
//! into the session's [`CaptureSink`] from its own delivery thread. Raw
//! frames and samples are borrowed views: they are valid only for the
//! duration of one callback and must be copied out before retention. The
//! sink performs that copy-out after the warm-up gate admits the event.

use crate::capture::session::CaptureSink;
use crate::capture::{AudioChunk, AudioFormat, OwnedVideoFrame, VideoFormat};
use crate::config::QualityPreset;
use crate::pipeline::types::Timestamp;
use anyhow::Result;

/// Borrowed view of a hardware-owned image buffer.
///
/// The lifetime ties it to the capture callback that produced it.
pub struct RawVideoFrame<'a> {
    pub format: &'a VideoFormat,
    pub data: &'a [u8],
    /// Row pitch in pixels; may exceed `format.width` for padded buffers.
    pub stride: u32,
    pub pts: Timestamp,
}

impl RawVideoFrame<'_> {
    /// Explicit copy-out, the only way to retain a frame past its callback.
    pub fn copy_out(&self) -> OwnedVideoFrame {
        OwnedVideoFrame {
            format: *self.format,
            data: self.data.to_vec(),
            stride: self.stride,
            pts: self.pts,
        }
    }
}

/// Borrowed view of hardware-owned PCM samples (interleaved i16).
pub struct RawAudioSample<'a> {
    pub format: &'a AudioFormat,
    pub samples: &'a [i16],
    pub pts: Timestamp,
}

impl RawAudioSample<'_> {
    pub fn copy_out(&self) -> AudioChunk {
        AudioChunk {
            format: *self.format,
            samples: self.samples.to_vec(),
            pts: self.pts,
        }
    }
}

/// Trait for camera implementations
pub trait VideoSource: Send {
    /// Begin delivering frames into `sink` from the source's own thread.
    fn start(&mut self, sink: CaptureSink) -> Result<()>;

    /// Halt delivery. No frames are pushed after this returns.
    fn stop(&mut self);

    /// Closest preset this device can honor for the requested one.
    fn nearest_preset(&self, wanted: QualityPreset) -> QualityPreset {
        wanted
    }

    /// Reconfigure the delivery frame rate without tearing the stream down.
    fn set_frame_rate(&mut self, _fps: u32) {}

    /// Get the name of this source for logging
    fn name(&self) -> &'static str;
}

/// Trait for microphone implementations
pub trait AudioSource: Send {
    fn start(&mut self, sink: CaptureSink) -> Result<()>;

    fn stop(&mut self);

    fn name(&self) -> &'static str;
}
