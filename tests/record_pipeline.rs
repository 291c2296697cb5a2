//! End-to-end pipeline tests over scripted sources and a probe container
//! sink, so no camera, microphone, or FFmpeg install is required.

use anyhow::Result;
use notecap::capture::{
    AudioChunk, AudioFormat, AudioSource, CaptureSession, CaptureSink, RawAudioSample,
    TestPatternSource, VideoFormat,
};
use notecap::config::PipelineOptions;
use notecap::pipeline::{
    ContainerSink, LiveUpload, PipelineEvent, RecordingState, RenderedFrame, Timestamp,
    VideoNotePipeline, WarmupGate,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Observable side of the probe sink, readable after the sink was boxed
/// away into the pipeline.
#[derive(Clone, Default)]
struct SinkProbe {
    appends: Arc<AtomicU32>,
    finalized: Arc<AtomicBool>,
}

/// Container sink that creates a marker file when tracks open and counts
/// every append, standing in for the FFmpeg-backed MP4 sink.
struct ProbeSink {
    path: PathBuf,
    probe: SinkProbe,
}

impl ProbeSink {
    fn create(path: &Path) -> (Box<dyn ContainerSink>, SinkProbe) {
        let probe = SinkProbe::default();
        let sink = ProbeSink {
            path: path.to_path_buf(),
            probe: probe.clone(),
        };
        (Box::new(sink), probe)
    }

    fn touch(&self) -> Result<()> {
        if !self.path.exists() {
            std::fs::write(&self.path, b"note")?;
        }
        Ok(())
    }
}

impl ContainerSink for ProbeSink {
    fn add_video_track(&mut self, _format: &VideoFormat) -> Result<()> {
        self.touch()
    }

    fn add_audio_track(&mut self, _format: &AudioFormat) -> Result<()> {
        self.touch()
    }

    fn append_video(&mut self, _frame: &RenderedFrame) -> Result<()> {
        self.probe.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn append_audio(&mut self, _chunk: &AudioChunk) -> Result<()> {
        self.probe.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.probe.finalized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Microphone stand-in pushing fixed-amplitude chunks on a timer, with
/// synthetic pts derived from the amount of audio already delivered.
struct ScriptedAudio {
    format: AudioFormat,
    amplitude: i16,
    chunk_samples: usize,
    cancel: Option<CancellationToken>,
}

impl ScriptedAudio {
    fn new(sample_rate: u32, amplitude: i16, chunk_samples: usize) -> Self {
        Self {
            format: AudioFormat {
                sample_rate,
                channels: 1,
            },
            amplitude,
            chunk_samples,
            cancel: None,
        }
    }
}

impl AudioSource for ScriptedAudio {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let format = self.format;
        let chunk = vec![self.amplitude; self.chunk_samples];
        let interval = Duration::from_micros(
            self.chunk_samples as u64 * 1_000_000 / self.format.sample_rate as u64,
        );

        tokio::spawn(async move {
            let mut elapsed = Duration::ZERO;
            loop {
                sink.push_audio(RawAudioSample {
                    format: &format,
                    samples: &chunk,
                    pts: Timestamp::from_duration(elapsed),
                });
                elapsed += interval;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
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

    fn name(&self) -> &'static str {
        "scripted-audio"
    }
}

#[derive(Default)]
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

    fn id(&self) -> Option<i64> {
        Some(42)
    }
}

fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("notecap_{}_{}.mp4", name, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn test_options(min_ms: u64, max_ms: u64, warmup: u32) -> PipelineOptions {
    PipelineOptions {
        note_side: 32,
        min_duration: Duration::from_millis(min_ms),
        max_duration: Duration::from_millis(max_ms),
        warmup_events: warmup,
        ..Default::default()
    }
}

fn launch(
    options: PipelineOptions,
    path: &Path,
    with_video: bool,
    with_audio: bool,
    upload: Option<Arc<dyn LiveUpload>>,
) -> (VideoNotePipeline, SinkProbe) {
    let warmup = Arc::new(WarmupGate::new(options.warmup_events));
    let (mut session, capture_rx) = CaptureSession::new(options.preset, warmup);

    if with_video {
        session
            .select_video_source(Box::new(TestPatternSource::new(64, 48, options.frame_rate)))
            .unwrap();
    }
    if with_audio {
        // 100ms chunks of loud mono audio at 8kHz
        session
            .select_audio_source(Box::new(ScriptedAudio::new(8_000, 3_000, 800)))
            .unwrap();
    }

    let (sink, probe) = ProbeSink::create(path);
    let pipeline = VideoNotePipeline::launch(options, session, capture_rx, sink, upload);
    (pipeline, probe)
}

/// Collect events until the predicate matches, the task ends, or the
/// timeout expires.
async fn drive_until(
    pipeline: &mut VideoNotePipeline,
    timeout: Duration,
    mut done: impl FnMut(&PipelineEvent) -> bool,
) -> Vec<PipelineEvent> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, pipeline.recv_event()).await {
            Ok(Some(event)) => {
                let hit = done(&event);
                events.push(event);
                if hit {
                    return events;
                }
            }
            Ok(None) => return events,
            Err(_) => return events,
        }
    }
}

fn states(events: &[PipelineEvent]) -> Vec<RecordingState> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

fn is_finished(event: &PipelineEvent) -> bool {
    matches!(event, PipelineEvent::Finished(_))
}

fn is_stopped(event: &PipelineEvent) -> bool {
    matches!(event, PipelineEvent::StateChanged(RecordingState::Stopped))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_records_and_finalizes() {
    let path = temp_path("full");
    let (mut pipeline, probe) = launch(test_options(120, 60_000, 2), &path, true, true, None);

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(700)).await;
    pipeline.stop();

    let events = drive_until(&mut pipeline, Duration::from_secs(5), is_finished).await;

    let seen = states(&events);
    assert!(seen.contains(&RecordingState::StartingRecording));
    assert!(seen.contains(&RecordingState::Recording));
    assert!(seen.contains(&RecordingState::Finished));

    let finished = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::Finished(f) => Some(f),
            _ => None,
        })
        .expect("recording should finish");
    assert!(finished.duration >= Duration::from_millis(120));
    assert!(finished.thumbnail.is_some());
    assert!(probe.finalized.load(Ordering::SeqCst));
    assert!(path.exists());
    assert!(probe.appends.load(Ordering::SeqCst) > 0);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_thumbnail_fires_once_before_finish() {
    let path = temp_path("thumb");
    let (mut pipeline, _probe) = launch(test_options(100, 60_000, 0), &path, true, false, None);

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    pipeline.stop();

    let events = drive_until(&mut pipeline, Duration::from_secs(5), is_finished).await;

    let thumb_positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| matches!(e, PipelineEvent::ThumbnailReady(_)).then_some(i))
        .collect();
    let finish_position = events
        .iter()
        .position(is_finished)
        .expect("recording should finish");

    assert_eq!(thumb_positions.len(), 1);
    assert!(thumb_positions[0] < finish_position);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_short_recording_is_discarded() {
    let path = temp_path("short");
    let (mut pipeline, probe) = launch(test_options(500, 60_000, 0), &path, true, false, None);

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    pipeline.stop();

    let events = drive_until(&mut pipeline, Duration::from_secs(5), is_stopped).await;

    assert!(!events.iter().any(is_finished));
    assert!(states(&events).contains(&RecordingState::Stopped));
    assert!(!probe.finalized.load(Ordering::SeqCst));
    assert!(!path.exists(), "partial file must be deleted");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_max_duration_auto_stops() {
    let path = temp_path("maxdur");
    let (mut pipeline, probe) = launch(test_options(50, 250, 0), &path, true, false, None);

    pipeline.start();
    // No stop call; the duration cap must end the recording by itself
    let events = drive_until(&mut pipeline, Duration::from_secs(5), is_finished).await;

    let finished = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::Finished(f) => Some(f),
            _ => None,
        })
        .expect("cap should finish the recording");
    assert!(finished.duration >= Duration::from_millis(250));
    assert!(probe.finalized.load(Ordering::SeqCst));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispose_deletes_partial_file() {
    let path = temp_path("dispose");
    let (mut pipeline, probe) = launch(test_options(100, 60_000, 0), &path, true, false, None);

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(400)).await;
    pipeline.dispose();

    let events = drive_until(&mut pipeline, Duration::from_secs(5), is_stopped).await;

    assert!(!events.iter().any(is_finished));
    assert!(!probe.finalized.load(Ordering::SeqCst));
    assert!(!path.exists(), "disposed recording must leave no file");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispose_after_finish_keeps_file() {
    let path = temp_path("dispose_late");
    let (mut pipeline, _probe) = launch(test_options(100, 60_000, 0), &path, true, false, None);

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    pipeline.stop();
    drive_until(&mut pipeline, Duration::from_secs(5), is_finished).await;
    assert!(path.exists());

    pipeline.dispose();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(path.exists(), "dispose after finish must not delete the file");

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upload_notification_protocol() {
    let path = temp_path("upload");
    let upload = Arc::new(CountingUpload::default());
    let (mut pipeline, probe) = launch(
        test_options(100, 60_000, 0),
        &path,
        true,
        true,
        Some(upload.clone()),
    );

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(600)).await;
    pipeline.stop();

    let events = drive_until(&mut pipeline, Duration::from_secs(5), is_finished).await;

    let finished = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::Finished(f) => Some(f),
            _ => None,
        })
        .expect("recording should finish");

    // One non-final notification per appended sample, one final afterwards
    let appends = probe.appends.load(Ordering::SeqCst) as u64;
    assert!(appends > 0);
    assert_eq!(upload.grew.load(Ordering::SeqCst), appends);
    assert_eq!(upload.finals.load(Ordering::SeqCst), 1);
    assert_eq!(finished.upload_id, Some(42));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_audio_only_session() {
    let path = temp_path("audio_only");
    let (mut pipeline, probe) = launch(test_options(100, 60_000, 0), &path, false, true, None);

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(600)).await;
    pipeline.stop();

    let events = drive_until(&mut pipeline, Duration::from_secs(5), is_finished).await;

    assert!(states(&events).contains(&RecordingState::Recording));
    let finished = events
        .iter()
        .find_map(|e| match e {
            PipelineEvent::Finished(f) => Some(f),
            _ => None,
        })
        .expect("audio-only recording should finish");
    assert!(finished.thumbnail.is_none());
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::ThumbnailReady(_))));
    assert!(probe.finalized.load(Ordering::SeqCst));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_appends_after_terminal_state() {
    let path = temp_path("post_stop");
    let (mut pipeline, probe) = launch(test_options(100, 60_000, 0), &path, true, true, None);

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(600)).await;
    pipeline.stop();
    drive_until(&mut pipeline, Duration::from_secs(5), is_finished).await;

    let at_finish = probe.appends.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(probe.appends.load(Ordering::SeqCst), at_finish);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_telemetry_reports_power_and_elapsed() {
    let path = temp_path("telemetry");
    let (mut pipeline, _probe) = launch(test_options(100, 60_000, 0), &path, true, true, None);
    let telemetry = pipeline.telemetry();

    pipeline.start();
    tokio::time::sleep(Duration::from_millis(700)).await;

    let sample = *telemetry.borrow();
    // Scripted amplitude 3000 against the /4000 normalization
    assert!(sample.power > 0.5 && sample.power <= 1.0);
    assert!(sample.elapsed_seconds > 0.0);

    pipeline.stop();
    drive_until(&mut pipeline, Duration::from_secs(5), is_finished).await;
    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_warmup_suppresses_early_events() {
    let path = temp_path("warmup");
    // Threshold far above what the sources can deliver in the window
    let (mut pipeline, probe) = launch(test_options(100, 60_000, 10_000), &path, true, true, None);

    pipeline.start();
    let events = drive_until(&mut pipeline, Duration::from_millis(400), |_| false).await;

    assert!(!states(&events).contains(&RecordingState::Recording));
    assert_eq!(probe.appends.load(Ordering::SeqCst), 0);

    pipeline.dispose();
    drive_until(&mut pipeline, Duration::from_secs(5), is_stopped).await;
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_before_start_leaves_nothing() {
    let path = temp_path("idle_stop");
    let (mut pipeline, probe) = launch(test_options(100, 60_000, 0), &path, true, true, None);

    pipeline.stop();
    let events = drive_until(&mut pipeline, Duration::from_secs(5), is_stopped).await;

    assert!(!events.iter().any(is_finished));
    assert_eq!(probe.appends.load(Ordering::SeqCst), 0);
    assert!(!path.exists());
}
