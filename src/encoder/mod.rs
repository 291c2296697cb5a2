//! Encoding and muxing
//!
//! The FFmpeg-backed container sink: H.264 for the square note video, AAC
//! for audio, muxed into MP4.

mod frame_pool;
pub mod mp4;

pub use mp4::Mp4Sink;
