//! Bounded per-session frame buffer.
//!
//! A full queue evicts its oldest payload, so the producer never waits on a viewer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default number of encoded frames buffered per session.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Bounded FIFO of encoded frame payloads with a drop-oldest overflow policy.
///
/// The producer never blocks: pushing into a full queue evicts the oldest
/// payload first. Consumers poll with a timeout so they can also watch for
/// cancellation.
pub struct StreamQueue {
    entries: Mutex<VecDeque<Vec<u8>>>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl StreamQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a payload, evicting the oldest entry when full.
    ///
    /// Returns the evicted payload, if any.
    pub fn push(&self, payload: Vec<u8>) -> Option<Vec<u8>> {
        let evicted = {
            let mut entries = self.lock();
            let evicted = if entries.len() >= self.capacity {
                entries.pop_front()
            } else {
                None
            };
            entries.push_back(payload);
            evicted
        };
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.available.notify_one();
        evicted
    }

    /// Take the oldest payload, waiting at most `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut entries = self.lock();
        loop {
            if let Some(payload) = entries.pop_front() {
                return Some(payload);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if remaining.is_zero() {
                return None;
            }
            entries = match self.available.wait_timeout(entries, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Empty the queue without blocking. Returns how many payloads were discarded.
    pub fn drain(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Payloads evicted by the drop-oldest policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for StreamQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
