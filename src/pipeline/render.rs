//! Video render stage
//!
//! Converts raw camera frames into encoder-ready NV12: orientation
//! correction, horizontal mirroring (selfie view), center-crop to the
//! square note geometry, and pixel format conversion (BT.601 for RGBA
//! input). The first successfully rendered frame additionally yields the
//! one-shot thumbnail. Frames that fail to convert are dropped silently;
//! camera streams occasionally emit unusable buffers and a drop must not
//! stall the pipeline.
//!
//! Rendered buffers come from a bounded pool: the recorder hands each
//! buffer back after appending, and at most `retained_buffers` are kept,
//! so memory stays capped even when hardware delivery outruns encoding.

use crate::capture::{OwnedVideoFrame, PixelLayout, Rotation, VideoFormat};
use crate::config::PipelineOptions;
use crate::pipeline::types::{RenderedFrame, Thumbnail};
use log::debug;
use std::collections::VecDeque;

pub struct VideoRenderStage {
    note_side: u32,
    mirror: bool,
    retained_buffers: usize,
    prepared: Option<VideoFormat>,
    enabled: bool,
    pool: VecDeque<Vec<u8>>,
    thumbnail: Option<Thumbnail>,
    thumbnail_pending: bool,
}

impl VideoRenderStage {
    pub fn new(options: &PipelineOptions) -> Self {
        let side = options.note_side.max(2);
        Self {
            note_side: side + (side % 2),
            mirror: options.mirror,
            retained_buffers: options.retained_buffers,
            prepared: None,
            enabled: false,
            pool: VecDeque::new(),
            thumbnail: None,
            thumbnail_pending: false,
        }
    }

    /// Fix the output format from the first frame's capability descriptor.
    /// Idempotent; descriptor changes mid-session are not supported and
    /// later calls are ignored.
    pub fn prepare(&mut self, format: &VideoFormat) {
        if self.prepared.is_none() {
            self.prepared = Some(*format);
        }
    }

    pub fn prepared_format(&self) -> Option<&VideoFormat> {
        self.prepared.as_ref()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Render one frame. Returns `None` while rendering is disabled or
    /// when the frame cannot be converted.
    pub fn render(&mut self, frame: &OwnedVideoFrame) -> Option<RenderedFrame> {
        if !self.enabled {
            return None;
        }
        self.prepare(&frame.format);

        let format = &frame.format;
        if format.width < 2 || format.height < 2 || frame.stride < format.width {
            debug!("dropping malformed frame: {:?}", format);
            return None;
        }
        if frame.data.len() < format.frame_len(frame.stride) {
            debug!(
                "dropping truncated frame: {} bytes for {:?}",
                frame.data.len(),
                format
            );
            return None;
        }

        let side = self.note_side;
        let mut out = self.take_buffer();
        convert(frame, side, self.mirror, &mut out);

        let rendered = RenderedFrame {
            width: side,
            height: side,
            nv12: out,
            pts: frame.pts,
        };

        if self.thumbnail.is_none() {
            self.thumbnail = Some(thumbnail_from_nv12(&rendered));
            self.thumbnail_pending = true;
        }

        Some(rendered)
    }

    /// One-shot: the thumbnail event, available exactly once after the
    /// first successful render.
    pub fn take_thumbnail_event(&mut self) -> Option<Thumbnail> {
        if self.thumbnail_pending {
            self.thumbnail_pending = false;
            self.thumbnail.clone()
        } else {
            None
        }
    }

    /// The thumbnail itself, for the final recording result.
    pub fn thumbnail(&self) -> Option<Thumbnail> {
        self.thumbnail.clone()
    }

    /// Hand a consumed buffer back for reuse.
    pub fn recycle(&mut self, buf: Vec<u8>) {
        if self.pool.len() < self.retained_buffers {
            self.pool.push_back(buf);
        }
    }

    fn take_buffer(&mut self) -> Vec<u8> {
        let len = (self.note_side * self.note_side * 3 / 2) as usize;
        match self.pool.pop_front() {
            Some(mut buf) => {
                buf.resize(len, 0);
                buf
            }
            None => vec![0u8; len],
        }
    }
}

/// Map an upright output coordinate back into source-crop coordinates,
/// undoing the device rotation and applying the mirror.
#[inline]
fn source_coord(x: u32, y: u32, side: u32, rotation: Rotation, mirror: bool) -> (u32, u32) {
    let x = if mirror { side - 1 - x } else { x };
    match rotation {
        Rotation::None => (x, y),
        Rotation::Clockwise90 => (y, side - 1 - x),
        Rotation::Rotate180 => (side - 1 - x, side - 1 - y),
        Rotation::Counterclockwise90 => (side - 1 - y, x),
    }
}

fn convert(frame: &OwnedVideoFrame, out_side: u32, mirror: bool, out: &mut [u8]) {
    let format = &frame.format;
    let crop = format.width.min(format.height) & !1;
    let crop_x = (format.width - crop) / 2;
    let crop_y = (format.height - crop) / 2;

    let (out_luma, out_chroma) = out.split_at_mut((out_side * out_side) as usize);

    for oy in 0..out_side {
        for ox in 0..out_side {
            let (cx, cy) = source_coord(ox, oy, out_side, format.rotation, mirror);
            // Nearest-neighbor into the centered square crop
            let sx = crop_x + cx * crop / out_side;
            let sy = crop_y + cy * crop / out_side;
            out_luma[(oy * out_side + ox) as usize] = sample_luma(frame, sx, sy);
        }
    }

    let half = out_side / 2;
    for oy in 0..half {
        for ox in 0..half {
            let (cx, cy) = source_coord(ox * 2, oy * 2, out_side, format.rotation, mirror);
            let sx = crop_x + cx * crop / out_side;
            let sy = crop_y + cy * crop / out_side;
            let (u, v) = sample_chroma(frame, sx, sy);
            let base = ((oy * half + ox) * 2) as usize;
            out_chroma[base] = u;
            out_chroma[base + 1] = v;
        }
    }
}

#[inline]
fn sample_luma(frame: &OwnedVideoFrame, x: u32, y: u32) -> u8 {
    match frame.format.layout {
        PixelLayout::Nv12 => frame.data[(y * frame.stride + x) as usize],
        PixelLayout::Rgba => {
            let p = ((y * frame.stride + x) * 4) as usize;
            let (r, g, b) = (
                frame.data[p] as i32,
                frame.data[p + 1] as i32,
                frame.data[p + 2] as i32,
            );
            // BT.601 limited range
            (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
        }
    }
}

#[inline]
fn sample_chroma(frame: &OwnedVideoFrame, x: u32, y: u32) -> (u8, u8) {
    match frame.format.layout {
        PixelLayout::Nv12 => {
            let luma_len = (frame.stride * frame.format.height) as usize;
            let base = luma_len + ((y / 2) * frame.stride + (x & !1)) as usize;
            (frame.data[base], frame.data[base + 1])
        }
        PixelLayout::Rgba => {
            let p = ((y * frame.stride + x) * 4) as usize;
            let (r, g, b) = (
                frame.data[p] as i32,
                frame.data[p + 1] as i32,
                frame.data[p + 2] as i32,
            );
            let u = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            let v = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            (u, v)
        }
    }
}

/// Derive the still RGBA thumbnail from a rendered NV12 frame.
fn thumbnail_from_nv12(frame: &RenderedFrame) -> Thumbnail {
    let (w, h) = (frame.width, frame.height);
    let luma = frame.luma();
    let chroma = frame.chroma();
    let mut rgba = vec![0u8; (w * h * 4) as usize];

    for y in 0..h {
        for x in 0..w {
            let yv = luma[(y * w + x) as usize] as i32;
            let cbase = (((y / 2) * (w / 2) + x / 2) * 2) as usize;
            let u = chroma[cbase] as i32 - 128;
            let v = chroma[cbase + 1] as i32 - 128;

            let c = (yv - 16).max(0) * 298;
            let r = ((c + 409 * v + 128) >> 8).clamp(0, 255) as u8;
            let g = ((c - 100 * u - 208 * v + 128) >> 8).clamp(0, 255) as u8;
            let b = ((c + 516 * u + 128) >> 8).clamp(0, 255) as u8;

            let p = ((y * w + x) * 4) as usize;
            rgba[p] = r;
            rgba[p + 1] = g;
            rgba[p + 2] = b;
            rgba[p + 3] = 255;
        }
    }

    Thumbnail::new(w, h, rgba)
}
