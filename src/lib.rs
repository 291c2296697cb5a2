//! Short-form video note recording: capture camera and microphone streams,
//! render square upright video, encode and mux into a playable MP4 while
//! the recording is still in progress.

pub mod assets;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod pipeline;

pub use capture::{CaptureSession, MicrophoneSource, TestPatternSource};
pub use config::{PipelineOptions, QualityPreset};
pub use encoder::Mp4Sink;
pub use pipeline::{
    FinishedRecording, PipelineEvent, RecordingState, TelemetrySample, VideoNotePipeline,
    WarmupGate,
};
