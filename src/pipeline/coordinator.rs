//! Pipeline coordinator
//!
//! One tokio task owns every piece of mutable pipeline state and runs the
//! whole session: it selects over the control channel and the capture
//! delivery channel, so commands and hardware events interleave in a
//! single serial order and no stage needs its own locking. The public
//! handle only sends commands and receives events.

use crate::capture::{
    AudioChunk, CaptureEvent, CaptureSession, OwnedVideoFrame, PixelLayout, Rotation, VideoFormat,
};
use crate::config::PipelineOptions;
use crate::pipeline::gate::{StartGate, TrackFormats};
use crate::pipeline::recorder::{ContainerSink, FinishedRecording, Recorder};
use crate::pipeline::render::VideoRenderStage;
use crate::pipeline::state::RecordingState;
use crate::pipeline::telemetry::{Telemetry, TelemetrySample};
use crate::pipeline::types::Thumbnail;
use crate::pipeline::upload::LiveUpload;
use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
enum Control {
    Start,
    Stop,
    Dispose,
}

/// Events surfaced to the caller, in the order they happened.
#[derive(Debug)]
pub enum PipelineEvent {
    StateChanged(RecordingState),
    /// One-shot, derived from the first rendered frame.
    ThumbnailReady(Thumbnail),
    /// The container was finalized and the file is playable.
    Finished(FinishedRecording),
    /// The session failed and any partial file was deleted.
    Failed(String),
}

/// Handle to a running video-note pipeline.
pub struct VideoNotePipeline {
    control: mpsc::UnboundedSender<Control>,
    events: mpsc::UnboundedReceiver<PipelineEvent>,
    telemetry: watch::Receiver<TelemetrySample>,
    task: JoinHandle<()>,
}

impl VideoNotePipeline {
    /// Spawn the coordinator task over an already-configured capture
    /// session and its delivery channel.
    pub fn launch(
        options: PipelineOptions,
        session: CaptureSession,
        capture_rx: mpsc::Receiver<CaptureEvent>,
        sink: Box<dyn ContainerSink>,
        upload: Option<Arc<dyn LiveUpload>>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (telemetry, telemetry_rx) = Telemetry::new();

        let render = VideoRenderStage::new(&options);
        let worker = Worker {
            options,
            session,
            capture_rx,
            control_rx,
            events: events_tx,
            state: RecordingState::Idle,
            gate: StartGate::new(false, false),
            render,
            recorder: Some(Recorder::new(sink, upload)),
            telemetry,
        };

        let task = tokio::spawn(worker.run());
        Self {
            control: control_tx,
            events: events_rx,
            telemetry: telemetry_rx,
            task,
        }
    }

    /// Begin capturing. Recording starts once the track descriptors are
    /// negotiated, not immediately.
    pub fn start(&self) {
        let _ = self.control.send(Control::Start);
    }

    /// Stop and keep the result: finalize the file, or discard it when the
    /// recording is shorter than the minimum duration.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Abandon the session; deletes the partial file if one is being
    /// written. After a terminal state this is a no-op.
    pub fn dispose(&self) {
        let _ = self.control.send(Control::Dispose);
    }

    /// Receive the next pipeline event; `None` once the session task ended
    /// and all events were drained.
    pub async fn recv_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Latest `(power, elapsed)` telemetry signal.
    pub fn telemetry(&self) -> watch::Receiver<TelemetrySample> {
        self.telemetry.clone()
    }

    pub async fn join(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for VideoNotePipeline {
    fn drop(&mut self) {
        // Dropping the handle abandons the session; harmless after a
        // terminal state.
        let _ = self.control.send(Control::Dispose);
    }
}

struct Worker {
    options: PipelineOptions,
    session: CaptureSession,
    capture_rx: mpsc::Receiver<CaptureEvent>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    state: RecordingState,
    gate: StartGate,
    render: VideoRenderStage,
    recorder: Option<Recorder>,
    telemetry: Telemetry,
}

impl Worker {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.control_rx.recv() => match cmd {
                    Some(Control::Start) => self.on_start(),
                    Some(Control::Stop) => self.on_stop().await,
                    Some(Control::Dispose) | None => self.on_dispose(),
                },
                event = self.capture_rx.recv(), if self.state.is_active() => match event {
                    Some(event) => self.on_capture(event).await,
                    // Every sink handle gone: capture cannot resume
                    None => self.on_stop().await,
                },
            }

            if self.state.is_terminal() {
                break;
            }
        }
        debug!("pipeline task finished in state {}", self.state);
    }

    fn on_start(&mut self) {
        if self.state != RecordingState::Idle {
            debug!("start ignored in state {}", self.state);
            return;
        }
        self.gate = StartGate::new(self.session.has_video(), self.session.has_audio());
        if let Err(e) = self.session.start() {
            self.fail(format!("capture failed to start: {e:#}"));
            return;
        }
        self.render.set_enabled(true);
        self.transition(RecordingState::StartingRecording);
    }

    async fn on_capture(&mut self, event: CaptureEvent) {
        let result = match event {
            CaptureEvent::Video(frame) => self.on_video(&frame),
            CaptureEvent::Audio(chunk) => self.on_audio(&chunk),
        };
        match result {
            Ok(()) => {
                let hit_cap = self
                    .recorder
                    .as_ref()
                    .is_some_and(|r| r.duration() >= self.options.max_duration);
                if hit_cap {
                    info!("maximum duration reached, stopping");
                    self.on_stop().await;
                }
            }
            Err(e) => self.fail(format!("recording failed: {e:#}")),
        }
    }

    fn on_video(&mut self, frame: &OwnedVideoFrame) -> Result<()> {
        let Some(rendered) = self.render.render(frame) else {
            return Ok(());
        };

        if !self.gate.fired() {
            // The track carries upright rendered frames, not the device
            // format, so the descriptor is the output geometry.
            let track = VideoFormat {
                width: rendered.width,
                height: rendered.height,
                frame_rate: self.options.frame_rate,
                layout: PixelLayout::Nv12,
                rotation: Rotation::None,
            };
            if let Some(formats) = self.gate.offer_video(track) {
                self.open_tracks(&formats)?;
            } else if self.gate.waiting_for_audio() {
                self.transition(RecordingState::WaitingForAudioFormat);
            }
        }

        if let Some(thumbnail) = self.render.take_thumbnail_event() {
            self.emit(PipelineEvent::ThumbnailReady(thumbnail));
        }

        if self.state.accepts_samples() {
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.append_video(&rendered)?;
            }
        }
        self.render.recycle(rendered.into_buffer());
        Ok(())
    }

    fn on_audio(&mut self, chunk: &AudioChunk) -> Result<()> {
        if !self.gate.fired() {
            if let Some(formats) = self.gate.offer_audio(chunk.format) {
                self.open_tracks(&formats)?;
            }
        }

        let elapsed = self
            .recorder
            .as_ref()
            .map(|r| r.duration())
            .unwrap_or_default();
        self.telemetry.process(&chunk.samples, elapsed);

        if self.state.accepts_samples() {
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.append_audio(chunk)?;
            }
        }
        Ok(())
    }

    fn open_tracks(&mut self, formats: &TrackFormats) -> Result<()> {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.open_tracks(formats)?;
        }
        self.transition(RecordingState::Recording);
        Ok(())
    }

    async fn on_stop(&mut self) {
        if self.state == RecordingState::Idle {
            // Stopped before start: nothing was ever captured or written
            self.transition(RecordingState::Stopped);
            return;
        }
        if !self.state.is_active() {
            debug!("stop ignored in state {}", self.state);
            return;
        }

        self.transition(RecordingState::StoppingRecording);
        self.session.stop();
        self.render.set_enabled(false);

        let Some(recorder) = self.recorder.take() else {
            self.transition(RecordingState::Stopped);
            return;
        };

        if !recorder.tracks_opened() || recorder.duration() < self.options.min_duration {
            info!(
                "recording too short ({:?} < {:?}), discarding",
                recorder.duration(),
                self.options.min_duration
            );
            recorder.discard();
            self.transition(RecordingState::Stopped);
            return;
        }

        let duration = recorder.duration();
        let path = recorder.path();
        let upload_id = recorder.upload_id();
        let (mut sink, upload) = recorder.into_finalize_parts();

        // Container finalization does blocking file I/O
        let finalized = tokio::task::spawn_blocking(move || {
            sink.finalize()?;
            Ok::<_, anyhow::Error>(())
        })
        .await;

        match finalized {
            Ok(Ok(())) => {
                if let Some(upload) = &upload {
                    upload.file_grew(true);
                }
                info!("recording finalized: {} ({:?})", path.display(), duration);
                self.transition(RecordingState::Finished);
                self.emit(PipelineEvent::Finished(FinishedRecording {
                    path,
                    duration,
                    thumbnail: self.render.thumbnail(),
                    upload_id,
                }));
            }
            Ok(Err(e)) => {
                self.delete_partial(&path);
                self.fail(format!("finalization failed: {e:#}"));
            }
            Err(e) => {
                self.delete_partial(&path);
                self.fail(format!("finalization task panicked: {e}"));
            }
        }
    }

    fn on_dispose(&mut self) {
        if self.state.is_terminal() {
            // A finished file is never deleted by dispose
            return;
        }
        info!("recording disposed in state {}", self.state);
        self.session.stop();
        self.render.set_enabled(false);
        if let Some(recorder) = self.recorder.take() {
            recorder.discard();
        }
        if self.state != RecordingState::Idle {
            self.transition(RecordingState::StoppingRecording);
        }
        self.transition(RecordingState::Stopped);
    }

    /// Abort the session after an internal error: hardware stopped, partial
    /// file deleted, `Failed` surfaced, terminal `Stopped` state.
    fn fail(&mut self, message: String) {
        error!("{message}");
        self.session.stop();
        self.render.set_enabled(false);
        if let Some(recorder) = self.recorder.take() {
            recorder.discard();
        }
        if self.state.is_active() {
            self.transition(RecordingState::StoppingRecording);
        }
        self.transition(RecordingState::Stopped);
        // Last event of the session
        self.emit(PipelineEvent::Failed(message));
    }

    fn delete_partial(&self, path: &std::path::Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to delete {}: {}", path.display(), e);
            }
        }
    }

    fn transition(&mut self, target: RecordingState) {
        if self.state == target {
            return;
        }
        if !self.state.can_transition_to(&target) {
            warn!("invalid state transition {} -> {}", self.state, target);
            return;
        }
        debug!("state {} -> {}", self.state, target);
        self.state = target;
        self.emit(PipelineEvent::StateChanged(target));
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}
