//! Session bookkeeping keyed by video id.
//!
//! The session map lock is only held for lookups and inserts. Starting a
//! session opens its source under a per-id start gate, so a slow open for one
//! id never blocks readers or starts of another.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{producer, PipelineRuntime, Session, SessionState, SessionSummary};
use crate::violation::ConfidenceSnapshot;

pub enum StartOutcome {
    /// A new producer was started.
    Started(Arc<Session>),
    /// A session for this id was already live; no second producer.
    Reused(Arc<Session>),
}

impl StartOutcome {
    pub fn session(&self) -> &Arc<Session> {
        match self {
            StartOutcome::Started(session) | StartOutcome::Reused(session) => session,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Requested,
    NotFound,
}

/// All sessions known to the daemon, keyed by video id.
///
/// Stopped sessions stay listed (their confidence snapshot remains readable)
/// until removed or replaced by a new start.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    start_gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    runtime: Arc<PipelineRuntime>,
}

impl SessionRegistry {
    pub fn new(runtime: PipelineRuntime) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            start_gates: Mutex::new(HashMap::new()),
            runtime: Arc::new(runtime),
        }
    }

    pub fn runtime(&self) -> &PipelineRuntime {
        &self.runtime
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_gate(&self, video_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self
            .start_gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(gates.entry(video_id.to_string()).or_default())
    }

    /// Drop the start gate for `video_id` unless a start currently holds it.
    fn release_gate(&self, video_id: &str) {
        let mut gates = self
            .start_gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if gates.get(video_id).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(video_id);
        }
    }

    /// Start processing `source` under `video_id`, or reuse the live session.
    ///
    /// A session that has fully stopped is replaced by a fresh one.
    pub fn start(&self, video_id: &str, source: &str) -> Result<StartOutcome> {
        validate_video_id(video_id)?;
        if let Some(existing) = self.live(video_id) {
            log::info!("session {}: already active, reusing", video_id);
            return Ok(StartOutcome::Reused(existing));
        }

        // Racing starts for one id serialize on its gate; the map itself is
        // never locked while a source opens.
        let gate = self.start_gate(video_id);
        let _starting = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = self.live(video_id) {
            return Ok(StartOutcome::Reused(existing));
        }

        let session = Arc::new(Session::new(
            video_id,
            source,
            self.runtime.settings.queue_capacity,
        ));
        let handle = producer::spawn(
            Arc::clone(&session),
            source.to_string(),
            Arc::clone(&self.runtime),
        )?;
        session.attach_worker(handle);
        if self
            .write()
            .insert(video_id.to_string(), Arc::clone(&session))
            .is_some()
        {
            log::debug!("session {}: replaced stopped session", video_id);
        }
        log::info!("session {}: started from {}", video_id, source);
        Ok(StartOutcome::Started(session))
    }

    fn live(&self, video_id: &str) -> Option<Arc<Session>> {
        self.read()
            .get(video_id)
            .filter(|session| session.state() != SessionState::Stopped)
            .cloned()
    }

    pub fn get(&self, video_id: &str) -> Option<Arc<Session>> {
        self.read().get(video_id).cloned()
    }

    /// Signal the session to stop. Returns immediately.
    pub fn stop(&self, video_id: &str) -> StopOutcome {
        match self.get(video_id) {
            Some(session) => {
                session.request_stop();
                StopOutcome::Requested
            }
            None => StopOutcome::NotFound,
        }
    }

    /// Latest confidences for `video_id`; zeros for unknown ids.
    pub fn confidence(&self, video_id: &str) -> ConfidenceSnapshot {
        self.get(video_id)
            .map(|session| session.confidence())
            .unwrap_or_default()
    }

    /// Stop and forget a session.
    pub fn remove(&self, video_id: &str) -> Option<Arc<Session>> {
        let session = self.write().remove(video_id)?;
        self.release_gate(video_id);
        session.request_stop();
        session.queue().drain();
        log::info!("session {}: removed", video_id);
        Some(session)
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self.read().values().map(|s| s.summary()).collect();
        summaries.sort_by(|a, b| a.video_id.cmp(&b.video_id));
        summaries
    }

    pub fn active_count(&self) -> usize {
        self.read()
            .values()
            .filter(|session| session.state() != SessionState::Stopped)
            .count()
    }

    pub fn stop_all(&self) {
        for session in self.read().values() {
            session.request_stop();
        }
    }
}

fn validate_video_id(video_id: &str) -> Result<()> {
    if video_id.trim().is_empty() {
        return Err(anyhow!("video id must not be empty"));
    }
    if video_id.contains(['/', '\\']) || video_id.contains("..") {
        return Err(anyhow!("video id {} must not contain path components", video_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_ids_cannot_escape_the_detection_dir() {
        assert!(validate_video_id("ride.mp4").is_ok());
        assert!(validate_video_id("").is_err());
        assert!(validate_video_id("../etc").is_err());
        assert!(validate_video_id("a/b").is_err());
        assert!(validate_video_id("a\\b").is_err());
    }
}
