//! ridewatch-scan - run one video through the detection pipeline offline.
//!
//! Same producer loop as the daemon, without HTTP. Frames are drained as they
//! are produced; crops and reports go wherever the configuration points.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use ridewatch::{DaemonConfig, FrameStream, PipelineRuntime, SessionRegistry, SessionState};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file to scan (or a stub:// clip).
    video: String,
    /// Session id; defaults to the video's file name.
    #[arg(long)]
    name: Option<String>,
    /// Directory for violation crops.
    #[arg(long, env = "DETECTION_FOLDER")]
    detection_dir: Option<PathBuf>,
    /// Detector backend name (stub|tract).
    #[arg(long, env = "RIDEWATCH_DETECTOR")]
    detector: Option<String>,
    /// ONNX model path for the tract backend.
    #[arg(long, env = "MODEL_PATH")]
    model: Option<PathBuf>,
    /// Frame-rate cap; 0 runs as fast as possible.
    #[arg(long, default_value_t = 0)]
    fps: u32,
    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = DaemonConfig::load()?;
    if let Some(dir) = args.detection_dir {
        cfg.detection_dir = dir;
    }
    if let Some(detector) = args.detector {
        cfg.detector.backend = detector.trim().to_lowercase();
    }
    if let Some(model) = args.model {
        cfg.detector.model_path = Some(model);
    }
    // Offline scans are not viewed live; do not throttle unless asked.
    cfg.pipeline.target_fps = args.fps;

    let name = match args.name {
        Some(name) => name,
        None => std::path::Path::new(&args.video)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("cannot derive a session name from {}", args.video))?,
    };

    let runtime = PipelineRuntime::from_config(&cfg)?;
    let notifier = Arc::clone(&runtime.notifier);
    let poll_timeout = runtime.settings.poll_timeout;
    let sessions = SessionRegistry::new(runtime);
    let outcome = sessions.start(&name, &args.video)?;
    let session = Arc::clone(outcome.session());

    let (tx, rx) = mpsc::channel();
    let interrupted = Arc::clone(&session);
    ctrlc::set_handler(move || {
        interrupted.request_stop();
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let drained = FrameStream::new(Arc::clone(&session), poll_timeout).count();
    session.wait_until_stopped(Duration::from_secs(5));
    notifier.shutdown();

    let summary = session.summary();
    let stats = notifier.stats();
    if args.json {
        let report = serde_json::json!({
            "session": summary,
            "notifier": stats,
            "interrupted": rx.try_recv().is_ok(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("video:       {}", summary.source);
        println!("frames:      {} ({} viewed)", summary.frames_streamed, drained);
        println!("violations:  {}", summary.violations);
        println!(
            "confidence:  {:.3} (motorcycle {:.3}, no helmet {:.3}, plate {:.3})",
            summary.confidence.mean,
            summary.confidence.vehicle,
            summary.confidence.missing_helmet,
            summary.confidence.plate
        );
        println!(
            "reports:     {} delivered, {} failed, {} dropped",
            stats.delivered, stats.failed, stats.dropped
        );
    }
    if summary.state != SessionState::Stopped {
        log::warn!("session {} still winding down", summary.video_id);
    }
    Ok(())
}
