//! Recorder
//!
//! Owns the output container through the [`ContainerSink`] collaborator:
//! creates tracks lazily from the capability descriptors released by the
//! start gate, appends samples in delivery order, keeps the duration
//! accumulator, and notifies the live-upload collaborator after every
//! append. Finalize/discard is decided by the coordinator; the recorder
//! only ever does one of the two.

use crate::capture::{AudioChunk, AudioFormat, VideoFormat};
use crate::pipeline::gate::TrackFormats;
use crate::pipeline::types::{RenderedFrame, Thumbnail, Timestamp};
use crate::pipeline::upload::LiveUpload;
use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Container/muxer collaborator: open tracks, append timestamped samples,
/// finalize the file. Implementations own the file exclusively.
pub trait ContainerSink: Send {
    fn add_video_track(&mut self, format: &VideoFormat) -> Result<()>;

    fn add_audio_track(&mut self, format: &AudioFormat) -> Result<()>;

    fn append_video(&mut self, frame: &RenderedFrame) -> Result<()>;

    fn append_audio(&mut self, chunk: &AudioChunk) -> Result<()>;

    /// Flush and close the container so the file becomes playable.
    fn finalize(&mut self) -> Result<()>;

    fn path(&self) -> &Path;
}

/// Terminal result of a successfully finalized recording.
#[derive(Debug, Clone)]
pub struct FinishedRecording {
    pub path: PathBuf,
    pub duration: Duration,
    pub thumbnail: Option<Thumbnail>,
    pub upload_id: Option<i64>,
}

#[derive(Default)]
struct TrackSpan {
    first: Option<Timestamp>,
    end: Option<Timestamp>,
}

impl TrackSpan {
    fn cover(&mut self, start: Timestamp, end: Timestamp) {
        if self.first.is_none() {
            self.first = Some(start);
        }
        if self.end.map_or(true, |e| end > e) {
            self.end = Some(end);
        }
    }

    fn span(&self) -> Duration {
        match (self.first, self.end) {
            (Some(first), Some(end)) if end > first => end.diff(first),
            _ => Duration::ZERO,
        }
    }
}

pub struct Recorder {
    sink: Box<dyn ContainerSink>,
    upload: Option<Arc<dyn LiveUpload>>,
    video_track: bool,
    audio_track: bool,
    tracks_opened: bool,
    video_span: TrackSpan,
    audio_span: TrackSpan,
    appended: u64,
    /// Monotonically non-decreasing duration accumulator.
    duration: Duration,
}

impl Recorder {
    pub fn new(sink: Box<dyn ContainerSink>, upload: Option<Arc<dyn LiveUpload>>) -> Self {
        Self {
            sink,
            upload,
            video_track: false,
            audio_track: false,
            tracks_opened: false,
            video_span: TrackSpan::default(),
            audio_span: TrackSpan::default(),
            appended: 0,
            duration: Duration::ZERO,
        }
    }

    /// Create the tracks from the descriptor pair released by the start
    /// gate. Callable at most once per session.
    pub fn open_tracks(&mut self, formats: &TrackFormats) -> Result<()> {
        if self.tracks_opened {
            return Err(anyhow!("tracks already opened"));
        }
        self.tracks_opened = true;

        if let Some(video) = &formats.video {
            self.sink.add_video_track(video)?;
            self.video_track = true;
        }
        if let Some(audio) = &formats.audio {
            self.sink.add_audio_track(audio)?;
            self.audio_track = true;
        }
        info!(
            "recording tracks opened (video: {}, audio: {}) -> {}",
            self.video_track,
            self.audio_track,
            self.sink.path().display()
        );
        Ok(())
    }

    pub fn tracks_opened(&self) -> bool {
        self.tracks_opened
    }

    pub fn append_video(&mut self, frame: &RenderedFrame) -> Result<()> {
        if !self.video_track {
            debug!("no video track, frame dropped");
            return Ok(());
        }
        self.sink.append_video(frame)?;
        self.video_span.cover(frame.pts, frame.pts);
        self.grew();
        Ok(())
    }

    pub fn append_audio(&mut self, chunk: &AudioChunk) -> Result<()> {
        if !self.audio_track {
            debug!("no audio track, samples dropped");
            return Ok(());
        }
        self.sink.append_audio(chunk)?;
        let end = Timestamp::from_micros(chunk.pts.micros + chunk.duration().as_micros() as i64);
        self.audio_span.cover(chunk.pts, end);
        self.grew();
        Ok(())
    }

    /// Accumulated media duration, never decreasing.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn samples_appended(&self) -> u64 {
        self.appended
    }

    pub fn upload_id(&self) -> Option<i64> {
        self.upload.as_ref().and_then(|u| u.id())
    }

    pub fn path(&self) -> PathBuf {
        self.sink.path().to_path_buf()
    }

    /// Hand the sink over for asynchronous finalization, together with the
    /// upload collaborator to notify once the file is complete.
    pub fn into_finalize_parts(self) -> (Box<dyn ContainerSink>, Option<Arc<dyn LiveUpload>>) {
        (self.sink, self.upload)
    }

    /// Drop the container and delete the partial file. Used for both the
    /// sub-threshold discard and the dispose-while-recording path.
    pub fn discard(self) {
        let path = self.sink.path().to_path_buf();
        drop(self.sink);
        match std::fs::remove_file(&path) {
            Ok(()) => info!("discarded partial recording {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to delete {}: {}", path.display(), e),
        }
    }

    fn grew(&mut self) {
        self.appended += 1;
        let span = self.video_span.span().max(self.audio_span.span());
        if span > self.duration {
            self.duration = span;
        }
        if let Some(upload) = &self.upload {
            upload.file_grew(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PixelLayout, Rotation};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct NullSink {
        path: PathBuf,
        video_tracks: u32,
        audio_tracks: u32,
        appended: u32,
    }

    impl ContainerSink for NullSink {
        fn add_video_track(&mut self, _format: &VideoFormat) -> Result<()> {
            self.video_tracks += 1;
            Ok(())
        }
        fn add_audio_track(&mut self, _format: &AudioFormat) -> Result<()> {
            self.audio_tracks += 1;
            Ok(())
        }
        fn append_video(&mut self, _frame: &RenderedFrame) -> Result<()> {
            self.appended += 1;
            Ok(())
        }
        fn append_audio(&mut self, _chunk: &AudioChunk) -> Result<()> {
            self.appended += 1;
            Ok(())
        }
        fn finalize(&mut self) -> Result<()> {
            Ok(())
        }
        fn path(&self) -> &Path {
            &self.path
        }
    }

    struct CountingUpload {
        grew: AtomicU64,
        finals: AtomicU64,
    }

    impl LiveUpload for CountingUpload {
        fn file_grew(&self, is_final: bool) {
            if is_final {
                self.finals.fetch_add(1, Ordering::SeqCst);
            } else {
                self.grew.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn formats() -> TrackFormats {
        TrackFormats {
            video: Some(VideoFormat {
                width: 4,
                height: 4,
                frame_rate: 30,
                layout: PixelLayout::Nv12,
                rotation: Rotation::None,
            }),
            audio: Some(AudioFormat {
                sample_rate: 8_000,
                channels: 1,
            }),
        }
    }

    fn frame(pts_micros: i64) -> RenderedFrame {
        RenderedFrame {
            width: 4,
            height: 4,
            nv12: vec![0u8; 24],
            pts: Timestamp::from_micros(pts_micros),
        }
    }

    #[test]
    fn test_tracks_open_at_most_once() {
        let mut recorder = Recorder::new(Box::new(NullSink::default()), None);
        assert!(recorder.open_tracks(&formats()).is_ok());
        assert!(recorder.open_tracks(&formats()).is_err());
    }

    #[test]
    fn test_duration_accumulates_monotonically() {
        let mut recorder = Recorder::new(Box::new(NullSink::default()), None);
        recorder.open_tracks(&formats()).unwrap();

        recorder.append_video(&frame(0)).unwrap();
        recorder.append_video(&frame(600_000)).unwrap();
        assert_eq!(recorder.duration(), Duration::from_millis(600));

        // An out-of-order late frame never shrinks the accumulator
        recorder.append_video(&frame(300_000)).unwrap();
        assert_eq!(recorder.duration(), Duration::from_millis(600));
    }

    #[test]
    fn test_audio_span_includes_chunk_length() {
        let mut recorder = Recorder::new(Box::new(NullSink::default()), None);
        recorder.open_tracks(&formats()).unwrap();

        // 8000 samples at 8kHz mono = 1s starting at t=0
        let chunk = AudioChunk {
            format: AudioFormat {
                sample_rate: 8_000,
                channels: 1,
            },
            samples: vec![0i16; 8_000],
            pts: Timestamp::ZERO,
        };
        recorder.append_audio(&chunk).unwrap();
        assert_eq!(recorder.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_upload_notified_per_append() {
        let upload = Arc::new(CountingUpload {
            grew: AtomicU64::new(0),
            finals: AtomicU64::new(0),
        });
        let mut recorder = Recorder::new(Box::new(NullSink::default()), Some(upload.clone()));
        recorder.open_tracks(&formats()).unwrap();

        for i in 0..5 {
            recorder.append_video(&frame(i * 33_000)).unwrap();
        }
        assert_eq!(upload.grew.load(Ordering::SeqCst), 5);
        assert_eq!(upload.finals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_append_without_track_is_ignored() {
        let mut recorder = Recorder::new(Box::new(NullSink::default()), None);
        recorder
            .open_tracks(&TrackFormats {
                video: None,
                audio: formats().audio,
            })
            .unwrap();
        // Video-less session: frames are dropped, not errors
        assert!(recorder.append_video(&frame(0)).is_ok());
        assert_eq!(recorder.duration(), Duration::ZERO);
    }
}
