//! Processing sessions, one per video id.
//!
//! A session owns a producer thread that decodes, detects, annotates and
//! enqueues frames, plus the bounded queue viewers read from. State only moves
//! forward: `Running -> Stopping -> Stopped`, or straight to `Stopped` when the
//! producer ends on its own.

mod governor;
mod producer;
mod registry;

pub use governor::FrameGovernor;
pub use registry::{SessionRegistry, StartOutcome, StopOutcome};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::annotate::FrameAnnotator;
use crate::config::{DaemonConfig, PipelineSettings};
use crate::detect::{BackendRegistry, DetectorBackend};
use crate::storage::CropStore;
use crate::stream::StreamQueue;
use crate::transport::{HttpSink, LogSink, ViolationNotifier, ViolationSink};
use crate::violation::ConfidenceSnapshot;

/// Shared dependencies of every producer loop.
pub struct PipelineRuntime {
    pub settings: PipelineSettings,
    pub detector: Arc<dyn DetectorBackend>,
    pub annotator: FrameAnnotator,
    pub crops: CropStore,
    pub notifier: Arc<ViolationNotifier>,
}

impl PipelineRuntime {
    /// Build the detector, crop store and notifier described by `cfg`.
    pub fn from_config(cfg: &DaemonConfig) -> Result<Self> {
        let backends = BackendRegistry::from_settings(&cfg.detector)?;
        let detector = backends.default_backend()?;
        detector.warm_up()?;
        log::info!(
            "detector backend: {} (available: {})",
            detector.name(),
            backends.list().join(", ")
        );

        let sink: Arc<dyn ViolationSink> = match &cfg.notifier.endpoint {
            Some(endpoint) => Arc::new(HttpSink::new(endpoint, cfg.notifier.timeout)?),
            None => {
                log::warn!("no notifier endpoint configured; violations are only logged");
                Arc::new(LogSink)
            }
        };
        let notifier = ViolationNotifier::spawn(sink, cfg.notifier.workers, cfg.notifier.queue_depth)?;

        Ok(Self {
            settings: cfg.pipeline.clone(),
            detector,
            annotator: FrameAnnotator::default(),
            crops: CropStore::open(&cfg.detection_dir)?,
            notifier: Arc::new(notifier),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Stopping,
    Stopped,
}

/// Snapshot of one session for listings.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub video_id: String,
    pub source: String,
    pub state: SessionState,
    pub frames_streamed: u64,
    pub violations: u64,
    pub queued_frames: usize,
    pub dropped_frames: u64,
    pub uptime_secs: u64,
    pub confidence: ConfidenceSnapshot,
}

pub struct Session {
    id: String,
    source: String,
    state: Mutex<SessionState>,
    state_changed: Condvar,
    confidence: Mutex<ConfidenceSnapshot>,
    frames_streamed: AtomicU64,
    violations: AtomicU64,
    queue: StreamQueue,
    worker: Mutex<Option<JoinHandle<()>>>,
    started_at: Instant,
}

impl Session {
    pub(crate) fn new(id: &str, source: &str, queue_capacity: usize) -> Self {
        Self {
            id: id.to_string(),
            source: source.to_string(),
            state: Mutex::new(SessionState::Running),
            state_changed: Condvar::new(),
            confidence: Mutex::new(ConfidenceSnapshot::default()),
            frames_streamed: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            queue: StreamQueue::new(queue_capacity),
            worker: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn queue(&self) -> &StreamQueue {
        &self.queue
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Move forward to `next`. Backward transitions are ignored.
    fn advance(&self, next: SessionState) -> bool {
        let mut state = self.lock_state();
        if next <= *state {
            return false;
        }
        *state = next;
        drop(state);
        self.state_changed.notify_all();
        true
    }

    /// Ask the producer to stop. Returns true if the session was running.
    pub fn request_stop(&self) -> bool {
        let changed = self.advance(SessionState::Stopping);
        if changed {
            log::info!("session {}: stop requested", self.id);
        }
        changed
    }

    pub(crate) fn mark_stopped(&self) {
        if self.advance(SessionState::Stopped) {
            log::info!("session {}: stopped", self.id);
        }
    }

    /// Block until the session is `Stopped` or `timeout` passes.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let state = self.lock_state();
        let (state, _) = self
            .state_changed
            .wait_timeout_while(state, timeout, |s| *s != SessionState::Stopped)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state == SessionState::Stopped
    }

    /// Latest violation confidences; all zeros until the first violation.
    pub fn confidence(&self) -> ConfidenceSnapshot {
        *self
            .confidence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn record_violation(&self, snapshot: ConfidenceSnapshot) {
        *self
            .confidence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot;
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame(&self) {
        self.frames_streamed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_streamed(&self) -> u64 {
        self.frames_streamed.load(Ordering::Relaxed)
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    pub(crate) fn attach_worker(&self, handle: JoinHandle<()>) {
        *self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
    }

    fn producer_finished(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// A viewer went away: stop producing and drop whatever is buffered.
    pub(crate) fn detach_viewer(&self) {
        self.request_stop();
        let discarded = self.queue.drain();
        if discarded > 0 {
            log::debug!("session {}: discarded {} buffered frames", self.id, discarded);
        }
        if self.producer_finished() {
            self.mark_stopped();
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            video_id: self.id.clone(),
            source: self.source.clone(),
            state: self.state(),
            frames_streamed: self.frames_streamed(),
            violations: self.violations(),
            queued_frames: self.queue.len(),
            dropped_frames: self.queue.dropped(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            confidence: self.confidence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_only_moves_forward() {
        let session = Session::new("ride", "stub://ride", 4);
        assert!(session.request_stop());
        assert!(!session.request_stop());
        session.mark_stopped();
        assert!(!session.request_stop());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn wait_returns_once_stopped() {
        let session = Arc::new(Session::new("ride", "stub://ride", 4));
        assert!(!session.wait_until_stopped(Duration::from_millis(10)));
        let remote = Arc::clone(&session);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.mark_stopped();
        });
        assert!(session.wait_until_stopped(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn detaching_without_producer_stops_and_drains() {
        let session = Session::new("ride", "stub://ride", 4);
        session.queue().push(vec![1]);
        session.queue().push(vec![2]);
        session.detach_viewer();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.queue().is_empty());
    }

    #[test]
    fn confidence_defaults_to_zero() {
        let session = Session::new("ride", "stub://ride", 4);
        assert_eq!(session.confidence(), ConfidenceSnapshot::default());
        let snap = ConfidenceSnapshot::from_categories(0.9, 0.9, 0.9);
        session.record_violation(snap);
        assert_eq!(session.confidence(), snap);
        assert_eq!(session.violations(), 1);
    }
}
