//! Fire-and-forget violation delivery through a fixed worker pool.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::{ViolationReport, ViolationSink};

#[derive(Default)]
struct NotifierStats {
    queued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the notifier counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NotifierSnapshot {
    pub queued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Fire-and-forget delivery of violation reports.
///
/// A fixed set of workers drains a bounded channel. `notify` never blocks: when
/// the channel is full the report is dropped and counted. Delivery failures are
/// logged and counted, never retried.
pub struct ViolationNotifier {
    sender: Mutex<Option<SyncSender<ViolationReport>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<NotifierStats>,
    sink_name: &'static str,
}

impl ViolationNotifier {
    pub fn spawn(sink: Arc<dyn ViolationSink>, workers: usize, queue_depth: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(NotifierStats::default());
        let sink_name = sink.name();

        let mut handles = Vec::with_capacity(workers.max(1));
        for n in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let sink = Arc::clone(&sink);
            let stats = Arc::clone(&stats);
            let handle = std::thread::Builder::new()
                .name(format!("notify-{}", n))
                .spawn(move || worker_loop(receiver, sink, stats))
                .context("spawn notifier worker")?;
            handles.push(handle);
        }
        log::info!(
            "violation notifier started: sink={} workers={}",
            sink_name,
            handles.len()
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            stats,
            sink_name,
        })
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink_name
    }

    /// Queue a report for delivery. Returns false if it was dropped.
    pub fn notify(&self, report: ViolationReport) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(sender) = sender.as_ref() else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("notifier is shut down; dropping {}", report.id);
            return false;
        };
        match sender.try_send(report) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(report)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("notifier queue full; dropping {}", report.id);
                false
            }
            Err(TrySendError::Disconnected(report)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("notifier workers gone; dropping {}", report.id);
                false
            }
        }
    }

    pub fn stats(&self) -> NotifierSnapshot {
        NotifierSnapshot {
            queued: self.stats.queued.load(Ordering::Relaxed),
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
        }
    }

    /// Close the channel and wait for workers to finish what is already queued.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                log::error!("notifier worker panicked");
            }
        }
    }
}

impl Drop for ViolationNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    receiver: Arc<Mutex<Receiver<ViolationReport>>>,
    sink: Arc<dyn ViolationSink>,
    stats: Arc<NotifierStats>,
) {
    loop {
        let next = {
            let receiver = receiver
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            receiver.recv()
        };
        let Ok(report) = next else {
            break;
        };
        match sink.deliver(&report) {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                log::debug!("delivered {} via {}", report.id, sink.name());
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("delivery of {} failed: {:#}", report.id, err);
            }
        }
    }
}
