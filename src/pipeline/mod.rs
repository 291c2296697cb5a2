//! Recording pipeline
//!
//! The coordinator task drives a session through the recording state
//! machine: capture events pass the warm-up filter, the start gate
//! negotiates track formats, the render stage squares and uprights video,
//! and the recorder appends into the container sink while telemetry and
//! live-upload observers are kept current.

pub mod coordinator;
pub mod gate;
pub mod recorder;
pub mod render;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod upload;
pub mod warmup;

pub use coordinator::{PipelineEvent, VideoNotePipeline};
pub use gate::{StartGate, TrackFormats};
pub use recorder::{ContainerSink, FinishedRecording, Recorder};
pub use render::VideoRenderStage;
pub use state::RecordingState;
pub use telemetry::{Telemetry, TelemetrySample};
pub use types::{RenderedFrame, Thumbnail, Timestamp};
pub use upload::LiveUpload;
pub use warmup::WarmupGate;
