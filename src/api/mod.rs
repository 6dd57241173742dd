//! HTTP control surface.
//!
//! A small HTTP/1.1 server on `std::net`. The accept loop is non-blocking so
//! `ApiHandle::stop` is honoured promptly; each connection gets its own thread
//! because a live stream holds its connection open for the whole video.

mod http;
mod routes;

use anyhow::{anyhow, Result};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::session::SessionRegistry;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub video_root: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5001".to_string(),
            video_root: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Streams already open finish on their own.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    sessions: Arc<SessionRegistry>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, sessions: Arc<SessionRegistry>) -> Self {
        Self { cfg, sessions }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;
        log::info!("ridewatch api listening on {}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = Arc::new(self.cfg);
        let sessions = self.sessions;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, sessions, shutdown_thread) {
                log::error!("ridewatch api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: Arc<ApiConfig>,
    sessions: Arc<SessionRegistry>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = Arc::clone(&cfg);
                let sessions = Arc::clone(&sessions);
                let spawned = std::thread::Builder::new()
                    .name("api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = routes::handle_connection(stream, &cfg, &sessions) {
                            log::warn!("api request from {} rejected: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("could not spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
