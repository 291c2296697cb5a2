//! Synthetic camera source
//!
//! Deterministic NV12 test-pattern generator used by the demo binary when
//! no camera backend is compiled in, and by the integration tests. Paces
//! itself on a frame budget and honors runtime frame-rate reconfiguration
//! without tearing the stream down.

use crate::capture::session::CaptureSink;
use crate::capture::{PixelLayout, RawVideoFrame, Rotation, VideoFormat, VideoSource};
use crate::config::QualityPreset;
use crate::pipeline::types::Timestamp;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct TestPatternSource {
    width: u32,
    height: u32,
    fps_tx: watch::Sender<u32>,
    fps_rx: watch::Receiver<u32>,
    cancel: Option<CancellationToken>,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        // Even dimensions for NV12 chroma alignment
        let (fps_tx, fps_rx) = watch::channel(fps.max(1));
        Self {
            width: width + (width % 2),
            height: height + (height % 2),
            fps_tx,
            fps_rx,
            cancel: None,
        }
    }

    /// Fill an NV12 buffer with a slowly drifting gradient so consecutive
    /// frames differ and the thumbnail is non-trivial.
    fn paint(buf: &mut [u8], w: u32, h: u32, tick: u64) {
        let (luma, chroma) = buf.split_at_mut((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                luma[(y * w + x) as usize] = ((x + y + tick as u32) % 256) as u8;
            }
        }
        for v in chroma.iter_mut() {
            *v = 128;
        }
    }
}

impl VideoSource for TestPatternSource {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        if self.cancel.is_some() {
            return Err(anyhow!("Test pattern already running"));
        }
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let (w, h) = (self.width, self.height);
        let mut fps_rx = self.fps_rx.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; (w * h * 3 / 2) as usize];
            let mut tick = 0u64;
            let mut elapsed = Duration::ZERO;

            loop {
                if cancel.is_cancelled() {
                    break;
                }

                let fps = (*fps_rx.borrow_and_update()).max(1);
                let budget = Duration::from_micros(1_000_000 / fps as u64);

                Self::paint(&mut buf, w, h, tick);
                let format = VideoFormat {
                    width: w,
                    height: h,
                    frame_rate: fps,
                    layout: PixelLayout::Nv12,
                    rotation: Rotation::None,
                };
                sink.push_video(RawVideoFrame {
                    format: &format,
                    data: &buf,
                    stride: w,
                    pts: Timestamp::from_duration(elapsed),
                });

                tick += 1;
                elapsed += budget;

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(budget) => {}
                }
            }
        });

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    fn nearest_preset(&self, wanted: QualityPreset) -> QualityPreset {
        // The generator tops out at SD resolutions
        wanted.min(QualityPreset::Medium)
    }

    fn set_frame_rate(&mut self, fps: u32) {
        let _ = self.fps_tx.send(fps.max(1));
    }

    fn name(&self) -> &'static str {
        "test-pattern"
    }
}
