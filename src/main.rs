use clap::{Arg, ArgAction, Command};
use log::{info, warn};
use notecap::capture::CaptureSession;
use notecap::capture::{MicrophoneSource, TestPatternSource};
use notecap::config::{PipelineOptions, app_name, version};
use notecap::encoder::Mp4Sink;
use notecap::pipeline::{PipelineEvent, VideoNotePipeline, WarmupGate};
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file path (container guessed from the extension)")
                .required(false),
        )
        .arg(
            Arg::new("seconds")
                .short('s')
                .long("seconds")
                .value_name("SECONDS")
                .help("Maximum recording length before auto-stop")
                .default_value("60"),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_name("FPS")
                .help("Capture frame rate")
                .default_value("30"),
        )
        .arg(
            Arg::new("no-audio")
                .long("no-audio")
                .action(ArgAction::SetTrue)
                .help("Record video only, without a microphone"),
        )
        .get_matches();

    let output = match matches.get_one::<String>("output") {
        Some(path) => path.clone(),
        None => format!(
            "note_{}.mp4",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        ),
    };
    let seconds: u64 = matches
        .get_one::<String>("seconds")
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);
    let fps: u32 = matches
        .get_one::<String>("fps")
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);
    let no_audio = matches.get_flag("no-audio");

    let options = PipelineOptions {
        frame_rate: fps.max(1),
        max_duration: Duration::from_secs(seconds.max(1)),
        ..Default::default()
    };

    let warmup = Arc::new(WarmupGate::new(options.warmup_events));
    let (mut session, capture_rx) = CaptureSession::new(options.preset, warmup);

    let (w, h) = options.preset.resolution_hint();
    session.select_video_source(Box::new(TestPatternSource::new(w, h, options.frame_rate)))?;
    if !no_audio {
        session.select_audio_source(Box::new(MicrophoneSource::new()))?;
    }

    let sink = Mp4Sink::create(&output);
    let mut pipeline =
        VideoNotePipeline::launch(options, session, capture_rx, Box::new(sink), None);
    let telemetry = pipeline.telemetry();

    // SIGINT stops the recording cleanly instead of killing the process
    let (sig_tx, mut sig_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = sig_tx.send(());
    })?;

    pipeline.start();
    info!("recording to {} (Ctrl-C to stop)", output);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await; // first tick fires immediately
    let mut failed = false;

    loop {
        let mut stop_requested = false;
        tokio::select! {
            _ = sig_rx.recv() => {
                stop_requested = true;
            }
            _ = ticker.tick() => {
                let sample = *telemetry.borrow();
                info!("{:>5.1}s  level {:.2}", sample.elapsed_seconds, sample.power);
            }
            event = pipeline.recv_event() => match event {
                Some(PipelineEvent::StateChanged(state)) => {
                    info!("recording state: {}", state);
                }
                Some(PipelineEvent::ThumbnailReady(thumbnail)) => {
                    info!("thumbnail ready: {}x{}", thumbnail.width, thumbnail.height);
                }
                Some(PipelineEvent::Finished(recording)) => {
                    println!(
                        "saved {} ({:.1}s)",
                        recording.path.display(),
                        recording.duration.as_secs_f64()
                    );
                    break;
                }
                Some(PipelineEvent::Failed(message)) => {
                    warn!("recording failed: {}", message);
                    failed = true;
                    break;
                }
                None => break,
            },
        }
        if stop_requested {
            info!("stopping");
            pipeline.stop();
        }
    }

    pipeline.join().await;
    if failed {
        process::exit(1);
    }
    Ok(())
}
