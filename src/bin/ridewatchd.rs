//! ridewatchd - helmet-violation detection daemon
//!
//! Loads configuration, builds the detector and notifier, and serves the HTTP
//! API until Ctrl-C. On shutdown every session is asked to stop and given a
//! short grace period to release its decoder.

use anyhow::Result;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use ridewatch::{ApiConfig, ApiServer, DaemonConfig, PipelineRuntime, SessionRegistry};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = DaemonConfig::load()?;
    log::info!(
        "ridewatchd {} starting (detections in {})",
        env!("CARGO_PKG_VERSION"),
        cfg.detection_dir.display()
    );

    let runtime = PipelineRuntime::from_config(&cfg)?;
    let notifier = Arc::clone(&runtime.notifier);
    let sessions = Arc::new(SessionRegistry::new(runtime));

    let api_config = ApiConfig {
        addr: cfg.api_addr.clone(),
        video_root: cfg.video_root.clone(),
    };
    let api_handle = ApiServer::new(api_config, Arc::clone(&sessions)).spawn()?;
    log::info!("ridewatchd api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("ridewatchd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping sessions...");

    sessions.stop_all();
    for summary in sessions.summaries() {
        if let Some(session) = sessions.get(&summary.video_id) {
            if !session.wait_until_stopped(SHUTDOWN_GRACE) {
                log::warn!("session {} did not stop within grace period", summary.video_id);
            }
        }
    }
    api_handle.stop()?;
    notifier.shutdown();

    let stats = notifier.stats();
    log::info!(
        "notifier: {} delivered, {} failed, {} dropped",
        stats.delivered,
        stats.failed,
        stats.dropped
    );
    Ok(())
}
