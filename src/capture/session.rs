//! Capture session
//!
//! Owns the selected camera and microphone and merges their callback
//! streams into one ordered delivery path: a single bounded channel
//! consumed by the pipeline's serial task. Sources push borrowed frames
//! from their own threads; the sink gates them through the warm-up filter
//! before paying for a copy-out, then publishes owned events with a
//! drop-oldest policy under backpressure.

use crate::capture::{
    AudioSource, CaptureEvent, RawAudioSample, RawVideoFrame, VideoSource,
};
use crate::config::QualityPreset;
use crate::pipeline::warmup::WarmupGate;
use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Channel capacity of the delivery path. At 30fps plus audio callbacks
/// this is roughly two seconds of slack before frames start dropping.
const DELIVERY_CAPACITY: usize = 128;

/// Shared handle sources push into from their delivery threads.
///
/// Cloneable; every clone feeds the same serial channel, which is what
/// serializes inherently concurrent hardware delivery into one order.
#[derive(Clone)]
pub struct CaptureSink {
    tx: mpsc::Sender<CaptureEvent>,
    warmup: Arc<WarmupGate>,
    drops: Arc<AtomicU64>,
}

impl CaptureSink {
    /// Deliver one video frame. Suppressed frames and backpressure drops
    /// cost no copy.
    pub fn push_video(&self, frame: RawVideoFrame<'_>) {
        if !self.warmup.admit() {
            return;
        }
        self.publish(CaptureEvent::Video(frame.copy_out()));
    }

    /// Deliver one audio callback's samples.
    pub fn push_audio(&self, sample: RawAudioSample<'_>) {
        if !self.warmup.admit() {
            return;
        }
        self.publish(CaptureEvent::Audio(sample.copy_out()));
    }

    fn publish(&self, event: CaptureEvent) {
        if self.tx.try_send(event).is_err() {
            let dropped = self.drops.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % 30 == 1 {
                // Log every 30 drops to avoid spam
                warn!("capture event dropped (channel full, {} total drops)", dropped);
            }
        }
    }
}

/// Owns the active camera/microphone pair and their lifecycle.
pub struct CaptureSession {
    video: Option<Box<dyn VideoSource>>,
    audio: Option<Box<dyn AudioSource>>,
    sink: CaptureSink,
    preset: QualityPreset,
    running: bool,
}

impl CaptureSession {
    /// Create a session and the receiving end of its delivery path.
    pub fn new(
        preset: QualityPreset,
        warmup: Arc<WarmupGate>,
    ) -> (Self, mpsc::Receiver<CaptureEvent>) {
        let (tx, rx) = mpsc::channel(DELIVERY_CAPACITY);
        let session = Self {
            video: None,
            audio: None,
            sink: CaptureSink {
                tx,
                warmup,
                drops: Arc::new(AtomicU64::new(0)),
            },
            preset,
            running: false,
        };
        (session, rx)
    }

    /// Swap the active camera. The outgoing source is stopped before the
    /// new one is installed, so no frames are emitted mid-swap. Falls back
    /// to the nearest preset the device supports.
    pub fn select_video_source(&mut self, source: Box<dyn VideoSource>) -> Result<()> {
        if let Some(mut old) = self.video.take() {
            old.stop();
        }

        let supported = source.nearest_preset(self.preset);
        if supported != self.preset {
            debug!(
                "source {} does not support {:?}, falling back to {:?}",
                source.name(),
                self.preset,
                supported
            );
            self.preset = supported;
        }

        self.video = Some(source);
        if self.running {
            self.start_video()?;
        }
        Ok(())
    }

    /// Swap the active microphone; same no-emission-mid-swap rule.
    pub fn select_audio_source(&mut self, source: Box<dyn AudioSource>) -> Result<()> {
        if let Some(mut old) = self.audio.take() {
            old.stop();
        }
        self.audio = Some(source);
        if self.running {
            self.start_audio()?;
        }
        Ok(())
    }

    /// Begin hardware streaming on whatever sources are attached. A missing
    /// kind degrades the session (video-only or audio-only) rather than
    /// failing.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.running = true;

        if self.video.is_none() {
            info!("no camera attached, capturing audio only");
        }
        if self.audio.is_none() {
            info!("no microphone attached, capturing video only");
        }

        self.start_video()?;
        self.start_audio()?;
        Ok(())
    }

    /// Halt hardware streaming. Does not finalize any file.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(video) = self.video.as_mut() {
            video.stop();
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.stop();
        }
        info!("capture session stopped");
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn preset(&self) -> QualityPreset {
        self.preset
    }

    fn start_video(&mut self) -> Result<()> {
        if let Some(video) = self.video.as_mut() {
            video.start(self.sink.clone())?;
            info!("camera source {} started", video.name());
        }
        Ok(())
    }

    fn start_audio(&mut self) -> Result<()> {
        if let Some(audio) = self.audio.as_mut() {
            audio.start(self.sink.clone())?;
            info!("microphone source {} started", audio.name());
        }
        Ok(())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
