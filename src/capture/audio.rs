//! Microphone capture implementation
//!
//! Captures from the default cpal input device on a dedicated thread
//! (cpal streams are not Send) and pushes raw PCM into the session sink.
//! Samples are normalized to interleaved i16, the layout the recorder's
//! audio track expects.

use crate::capture::session::CaptureSink;
use crate::capture::{AudioFormat, AudioSource, RawAudioSample};
use crate::pipeline::types::Timestamp;
use anyhow::{Result, anyhow};
use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};
use std::thread;
use tokio_util::sync::CancellationToken;

trait ToI16: Copy {
    fn to_i16(self) -> i16;
}

impl ToI16 for i8 {
    fn to_i16(self) -> i16 {
        (self as i16) << 8
    }
}

impl ToI16 for i16 {
    fn to_i16(self) -> i16 {
        self
    }
}

impl ToI16 for i32 {
    fn to_i16(self) -> i16 {
        (self >> 16) as i16
    }
}

impl ToI16 for f32 {
    fn to_i16(self) -> i16 {
        (self.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }
}

struct MicStream {
    sink: CaptureSink,
    format: AudioFormat,
    /// Interleaved samples delivered so far, for pts derivation.
    delivered: u64,
    scratch: Vec<i16>,
}

impl MicStream {
    fn write_input_data<T>(&mut self, input: &[T])
    where
        T: ToI16,
    {
        self.scratch.clear();
        self.scratch.extend(input.iter().map(|s| s.to_i16()));

        let frames = self.delivered / self.format.channels.max(1) as u64;
        let pts = Timestamp::from_micros(
            (frames * 1_000_000 / self.format.sample_rate as u64) as i64,
        );
        self.delivered += input.len() as u64;

        self.sink.push_audio(RawAudioSample {
            format: &self.format,
            samples: &self.scratch,
            pts,
        });
    }
}

/// Default-input-device microphone source.
pub struct MicrophoneSource {
    cancel: Option<CancellationToken>,
}

impl MicrophoneSource {
    pub fn new() -> Self {
        Self { cancel: None }
    }
}

impl Default for MicrophoneSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MicrophoneSource {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        if self.cancel.is_some() {
            return Err(anyhow!("Microphone already running"));
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No default input device found"))?;
        let config = device
            .default_input_config()
            .map_err(|e| anyhow!("Failed to get default input config: {}", e))?;

        info!("Microphone capture config: {:?}", config);

        let format = AudioFormat {
            sample_rate: config.sample_rate(),
            channels: config.channels(),
        };

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        // cpal requires a dedicated thread; the stream handle is not Send
        let handle = tokio::runtime::Handle::current();
        thread::spawn(move || -> Result<()> {
            let mut mic = MicStream {
                sink,
                format,
                delivered: 0,
                scratch: Vec::new(),
            };

            let err_fn = |err| error!("Microphone stream error: {}", err);

            let stream = match config.sample_format() {
                SampleFormat::I8 => device.build_input_stream(
                    &config.into(),
                    move |data, _: &_| mic.write_input_data::<i8>(data),
                    err_fn,
                    None,
                )?,
                SampleFormat::I16 => device.build_input_stream(
                    &config.into(),
                    move |data, _: &_| mic.write_input_data::<i16>(data),
                    err_fn,
                    None,
                )?,
                SampleFormat::I32 => device.build_input_stream(
                    &config.into(),
                    move |data, _: &_| mic.write_input_data::<i32>(data),
                    err_fn,
                    None,
                )?,
                SampleFormat::F32 => device.build_input_stream(
                    &config.into(),
                    move |data, _: &_| mic.write_input_data::<f32>(data),
                    err_fn,
                    None,
                )?,
                _ => return Err(anyhow!("Unsupported sample format")),
            };

            stream.play()?;
            info!("Microphone capture started");

            // Wait for cancellation
            tokio::task::block_in_place(move || {
                handle.block_on(async move { cancel.cancelled().await });
            });

            stream.pause()?;
            info!("Microphone capture stopped");
            Ok(())
        });

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    fn name(&self) -> &'static str {
        "microphone"
    }
}
