use std::sync::Arc;
use std::time::Duration;

use crate::session::{Session, SessionState};

/// A viewer attached to one session's frame queue.
///
/// Yields encoded frames in order until the session has stopped and its queue
/// is empty. Dropping the stream counts as the viewer disconnecting: the
/// session is asked to stop and its buffered frames are discarded.
pub struct FrameStream {
    session: Arc<Session>,
    poll_timeout: Duration,
    delivered: u64,
}

impl FrameStream {
    pub fn new(session: Arc<Session>, poll_timeout: Duration) -> Self {
        log::info!("viewer attached to session {}", session.id());
        Self {
            session,
            poll_timeout,
            delivered: 0,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl Iterator for FrameStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            if let Some(payload) = self.session.queue().pop(self.poll_timeout) {
                self.delivered += 1;
                return Some(payload);
            }
            if self.session.state() == SessionState::Stopped && self.session.queue().is_empty() {
                return None;
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.session.detach_viewer();
        log::info!(
            "viewer detached from session {} after {} frames",
            self.session.id(),
            self.delivered
        );
    }
}
