//! MP4 container sink
//!
//! Encodes rendered NV12 frames to H.264 and interleaved i16 audio to AAC,
//! muxed into an MP4 file. Tracks are declared up front but the muxer (and
//! the file) only comes into existence on the first appended sample, since
//! the container header must know the full stream set.

use crate::capture::{AudioChunk, AudioFormat, VideoFormat};
use crate::encoder::frame_pool::FramePool;
use crate::pipeline::recorder::ContainerSink;
use crate::pipeline::types::RenderedFrame;
use ac_ffmpeg::codec::audio::frame::get_sample_format;
use ac_ffmpeg::codec::audio::{AudioEncoder, AudioFrameMut, ChannelLayout};
use ac_ffmpeg::codec::video::VideoEncoder;
use ac_ffmpeg::codec::{Encoder, video};
use ac_ffmpeg::format::io::IO;
use ac_ffmpeg::format::muxer::{Muxer, OutputFormat};
use ac_ffmpeg::time::{TimeBase, Timestamp as MediaTime};
use anyhow::{Result, anyhow};
use log::{debug, info};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Encoder fallback chain: hardware first, libx264 as the always-available
/// software fallback. Tuned for small square notes, not streaming.
const ENCODER_CHAIN: &[(&str, &[(&str, &str)])] = &[
    (
        "h264_videotoolbox",
        &[
            ("realtime", "1"),
            ("b", "1000000"), // 1 Mbps is plenty for 384px notes
        ],
    ),
    (
        "libx264",
        &[
            ("profile", "main"),
            ("preset", "veryfast"),
            ("crf", "23"),
            ("keyint", "60"),
            ("min-keyint", "30"),
            ("bframes", "0"),
            ("threads", "0"),
        ],
    ),
];

struct VideoTrack {
    encoder: VideoEncoder,
    pool: FramePool,
    side: usize,
    stream_index: usize,
    time_base: TimeBase,
    /// Capture timestamp of the first frame; the track timeline starts at
    /// zero regardless of how long warm-up took.
    first_pts: Option<i64>,
}

struct AudioTrack {
    encoder: AudioEncoder,
    stream_index: usize,
    sample_rate: u32,
    channels: usize,
    /// Per-channel samples the codec wants per frame (1024 for AAC).
    frame_samples: usize,
    /// Interleaved samples not yet grouped into a full codec frame.
    pending: Vec<i16>,
    /// Per-channel samples already encoded; pts basis in 1/sample_rate.
    sent_samples: i64,
}

pub struct Mp4Sink {
    path: PathBuf,
    muxer: Option<Muxer<File>>,
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
}

// ac-ffmpeg handles are raw pointers underneath; the sink is only ever
// driven from one task at a time.
unsafe impl Send for Mp4Sink {}

impl Mp4Sink {
    pub fn create<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            muxer: None,
            video: None,
            audio: None,
        }
    }

    /// Build the muxer over the declared tracks and create the output file.
    fn ensure_muxer(&mut self) -> Result<()> {
        if self.muxer.is_some() {
            return Ok(());
        }

        let mut builder = Muxer::builder();
        let mut next_index = 0;
        if let Some(track) = self.video.as_mut() {
            builder.add_stream(&track.encoder.codec_parameters().into())?;
            track.stream_index = next_index;
            next_index += 1;
        }
        if let Some(track) = self.audio.as_mut() {
            builder.add_stream(&track.encoder.codec_parameters().into())?;
            track.stream_index = next_index;
        }

        let name = self.path.to_string_lossy();
        let output_format = OutputFormat::guess_from_file_name(&name)
            .ok_or_else(|| anyhow!("unable to guess container format for {name}"))?;
        let io = IO::from_seekable_write_stream(File::create(&self.path)?);
        self.muxer = Some(builder.build(io, output_format)?);
        info!("container opened: {}", self.path.display());
        Ok(())
    }
}

impl ContainerSink for Mp4Sink {
    fn add_video_track(&mut self, format: &VideoFormat) -> Result<()> {
        if self.muxer.is_some() || self.video.is_some() {
            return Err(anyhow!("video track already declared"));
        }
        let side = format.width.max(format.height) as usize;
        let time_base = TimeBase::new(1, 90_000);
        let pixel_format = video::frame::get_pixel_format("nv12");
        let (encoder, codec_name) = build_video_encoder(side, time_base, pixel_format)?;
        info!("video track: {}x{} via {}", side, side, codec_name);

        self.video = Some(VideoTrack {
            encoder,
            pool: FramePool::new(side, time_base, pixel_format),
            side,
            stream_index: 0,
            time_base,
            first_pts: None,
        });
        Ok(())
    }

    fn add_audio_track(&mut self, format: &AudioFormat) -> Result<()> {
        if self.muxer.is_some() || self.audio.is_some() {
            return Err(anyhow!("audio track already declared"));
        }
        let layout = ChannelLayout::from_channels(format.channels as u32)
            .ok_or_else(|| anyhow!("unsupported channel count {}", format.channels))?;
        let encoder = AudioEncoder::builder("aac")?
            .sample_rate(format.sample_rate)
            .channel_layout(layout)
            .sample_format(get_sample_format("fltp"))
            .build()?;
        let frame_samples = encoder.samples_per_frame().unwrap_or(1024);
        info!(
            "audio track: {} Hz, {} channel(s) via aac",
            format.sample_rate, format.channels
        );

        self.audio = Some(AudioTrack {
            encoder,
            stream_index: 0,
            sample_rate: format.sample_rate,
            channels: format.channels.max(1) as usize,
            frame_samples,
            pending: Vec::new(),
            sent_samples: 0,
        });
        Ok(())
    }

    fn append_video(&mut self, frame: &RenderedFrame) -> Result<()> {
        self.ensure_muxer()?;
        let (Some(track), Some(muxer)) = (self.video.as_mut(), self.muxer.as_mut()) else {
            return Err(anyhow!("no video track"));
        };

        let first = *track.first_pts.get_or_insert(frame.pts.micros);
        let ticks = (frame.pts.micros - first) * 9 / 100;
        let mut av_frame = track
            .pool
            .take()
            .with_pts(MediaTime::new(ticks, track.time_base));

        {
            let mut planes = av_frame.planes_mut();
            copy_plane(frame.luma(), track.side, track.side, planes[0].data_mut());
        }
        {
            let mut planes = av_frame.planes_mut();
            copy_plane(
                frame.chroma(),
                track.side,
                track.side / 2,
                planes[1].data_mut(),
            );
        }

        let av_frame = av_frame.freeze();
        track.encoder.push(av_frame.clone())?;
        track.pool.put(av_frame);

        while let Some(packet) = track.encoder.take()? {
            muxer.push(packet.with_stream_index(track.stream_index))?;
        }
        Ok(())
    }

    fn append_audio(&mut self, chunk: &AudioChunk) -> Result<()> {
        self.ensure_muxer()?;
        let (Some(track), Some(muxer)) = (self.audio.as_mut(), self.muxer.as_mut()) else {
            return Err(anyhow!("no audio track"));
        };

        track.pending.extend_from_slice(&chunk.samples);
        let frame_len = track.frame_samples * track.channels;
        while track.pending.len() >= frame_len {
            let block: Vec<i16> = track.pending.drain(..frame_len).collect();
            track.encode_block(&block)?;
            while let Some(packet) = track.encoder.take()? {
                muxer.push(packet.with_stream_index(track.stream_index))?;
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.ensure_muxer()?;
        let muxer = self
            .muxer
            .as_mut()
            .ok_or_else(|| anyhow!("container was never opened"))?;

        if let Some(track) = self.video.as_mut() {
            track.encoder.flush()?;
            while let Some(packet) = track.encoder.take()? {
                muxer.push(packet.with_stream_index(track.stream_index))?;
            }
        }
        if let Some(track) = self.audio.as_mut() {
            // A trailing sub-frame block (under ~23ms of audio) is dropped
            track.encoder.flush()?;
            while let Some(packet) = track.encoder.take()? {
                muxer.push(packet.with_stream_index(track.stream_index))?;
            }
        }

        muxer.flush()?;
        info!("container finalized: {}", self.path.display());
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioTrack {
    /// Encode one codec-sized block of interleaved i16 samples as planar
    /// f32.
    fn encode_block(&mut self, block: &[i16]) -> Result<()> {
        let mut frame = AudioFrameMut::silence(
            self.encoder.codec_parameters().channel_layout(),
            self.encoder.codec_parameters().sample_format(),
            self.sample_rate,
            self.frame_samples,
        )
        .with_time_base(TimeBase::new(1, self.sample_rate as i32))
        .with_pts(MediaTime::new(
            self.sent_samples,
            TimeBase::new(1, self.sample_rate as i32),
        ));

        {
            let mut planes = frame.planes_mut();
            for (channel, plane) in planes.iter_mut().enumerate().take(self.channels) {
                let data = plane.data_mut();
                let samples: &mut [f32] = unsafe {
                    std::slice::from_raw_parts_mut(
                        data.as_mut_ptr() as *mut f32,
                        data.len() / std::mem::size_of::<f32>(),
                    )
                };
                for (i, out) in samples.iter_mut().enumerate().take(self.frame_samples) {
                    *out = block[i * self.channels + channel] as f32 / 32_768.0;
                }
            }
        }

        self.encoder.push(frame.freeze())?;
        self.sent_samples += self.frame_samples as i64;
        Ok(())
    }
}

fn build_video_encoder(
    side: usize,
    time_base: TimeBase,
    pixel_format: video::frame::PixelFormat,
) -> Result<(VideoEncoder, String)> {
    for (codec, options) in ENCODER_CHAIN {
        let mut builder = match VideoEncoder::builder(codec) {
            Ok(b) => b,
            Err(e) => {
                debug!("encoder {} not available, skipping: {}", codec, e);
                continue;
            }
        };
        builder = builder
            .pixel_format(pixel_format)
            .width(side)
            .height(side)
            .time_base(time_base);
        for (k, v) in *options {
            builder = builder.set_option(k, v);
        }
        match builder.build() {
            Ok(encoder) => return Ok((encoder, codec.to_string())),
            Err(e) => debug!("encoder {} failed to initialize: {}", codec, e),
        }
    }
    Err(anyhow!(
        "no H.264 encoder available, install FFmpeg with libx264 support"
    ))
}

/// Copy a tightly packed plane into the encoder's buffer, whose rows may
/// carry alignment padding.
fn copy_plane(source: &[u8], width: usize, rows: usize, destination: &mut [u8]) {
    let line_size = destination.len() / rows;
    if line_size == width {
        destination[..width * rows].copy_from_slice(&source[..width * rows]);
        return;
    }
    for row in 0..rows {
        let src = row * width;
        let dst = row * line_size;
        destination[dst..dst + width].copy_from_slice(&source[src..src + width]);
    }
}
