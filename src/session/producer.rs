//! Per-session producer thread: decode, detect, annotate, encode, enqueue.

use anyhow::{anyhow, bail, Context, Result};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::{FrameGovernor, PipelineRuntime, Session};
use crate::frame::Frame;
use crate::ingest::{FileSource, FrameSource};
use crate::transport::ViolationReport;
use crate::violation::{evaluate, ViolationCandidate};

enum ProducerExit {
    Exhausted,
    Cancelled,
}

/// Start the producer thread for `session` and wait until its source is open.
///
/// The source is opened on the producer thread itself; an open failure is
/// returned here and the thread exits without producing anything.
pub(super) fn spawn(
    session: Arc<Session>,
    source_path: String,
    runtime: Arc<PipelineRuntime>,
) -> Result<JoinHandle<()>> {
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
    let worker_session = Arc::clone(&session);
    let handle = std::thread::Builder::new()
        .name(format!("produce-{}", session.id()))
        .spawn(move || {
            let source = match FileSource::open(&source_path) {
                Ok(source) => {
                    ready_tx.send(Ok(())).ok();
                    source
                }
                Err(err) => {
                    worker_session.mark_stopped();
                    ready_tx.send(Err(err)).ok();
                    return;
                }
            };
            run(&worker_session, Box::new(source), &runtime);
        })
        .context("spawn producer thread")?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(err)) => {
            handle.join().ok();
            Err(err)
        }
        Err(_) => {
            handle.join().ok();
            session.mark_stopped();
            Err(anyhow!("producer for {} exited before opening its source", session.id()))
        }
    }
}

/// Runs on every producer exit path, including panics.
struct ProducerCleanup<'a> {
    session: &'a Session,
    source: Option<Box<dyn FrameSource>>,
    keep_tail: bool,
}

impl Drop for ProducerCleanup<'_> {
    fn drop(&mut self) {
        drop(self.source.take());
        // A naturally finished video leaves its last frames for viewers; any
        // other exit discards them.
        if !self.keep_tail || !self.session.is_running() {
            self.session.queue().drain();
        }
        self.session.mark_stopped();
    }
}

fn run(session: &Session, source: Box<dyn FrameSource>, runtime: &PipelineRuntime) {
    let mut cleanup = ProducerCleanup {
        session,
        source: Some(source),
        keep_tail: false,
    };
    log::info!(
        "session {}: producing from {}",
        session.id(),
        session.source()
    );

    let result = match cleanup.source.as_deref_mut() {
        Some(source) => produce(session, source, runtime),
        None => Ok(ProducerExit::Cancelled),
    };
    match result {
        Ok(ProducerExit::Exhausted) => {
            cleanup.keep_tail = true;
            log::info!(
                "session {}: video finished after {} frames",
                session.id(),
                session.frames_streamed()
            );
        }
        Ok(ProducerExit::Cancelled) => {
            log::info!(
                "session {}: producer cancelled after {} frames",
                session.id(),
                session.frames_streamed()
            );
        }
        Err(err) => {
            log::error!("session {}: producer failed: {:#}", session.id(), err);
        }
    }
}

fn produce(
    session: &Session,
    source: &mut dyn FrameSource,
    runtime: &PipelineRuntime,
) -> Result<ProducerExit> {
    let settings = &runtime.settings;
    let mut governor = FrameGovernor::new(settings.target_fps);
    let mut consecutive_failures = 0u32;
    let mut processed = 0u64;

    while session.is_running() {
        let Some(frame) = source
            .next_frame()
            .with_context(|| format!("decode failed for {}", source.describe()))?
        else {
            return Ok(ProducerExit::Exhausted);
        };
        let frame = frame.resized(settings.frame_width, settings.frame_height);

        let detections = match runtime.detector.detect(&frame) {
            Ok(detections) => {
                consecutive_failures = 0;
                detections
            }
            Err(err) => {
                consecutive_failures += 1;
                log::warn!(
                    "session {}: detection failed on frame {} ({}/{}): {:#}",
                    session.id(),
                    frame.index,
                    consecutive_failures,
                    settings.max_consecutive_failures,
                    err
                );
                if consecutive_failures >= settings.max_consecutive_failures {
                    bail!(
                        "detector {} failed {} frames in a row",
                        runtime.detector.name(),
                        consecutive_failures
                    );
                }
                governor.pace();
                continue;
            }
        };

        let mut display = frame.clone();
        if !detections.is_empty() {
            runtime.annotator.draw_detections(&mut display, &detections);
            let candidate = evaluate(&detections);
            if candidate.is_violation() {
                report_violation(session, runtime, &frame, &candidate);
            }
        }
        runtime
            .annotator
            .draw_status(&mut display, governor.current_fps());

        match display.encode_jpeg(settings.jpeg_quality) {
            Ok(payload) => {
                session.queue().push(payload);
                session.record_frame();
            }
            Err(err) => log::warn!(
                "session {}: skipping frame {}: {:#}",
                session.id(),
                frame.index,
                err
            ),
        }

        processed += 1;
        governor.pace();
        if settings.cache_release_every > 0 && processed % settings.cache_release_every == 0 {
            runtime.detector.release_caches();
        }
    }
    Ok(ProducerExit::Cancelled)
}

fn report_violation(
    session: &Session,
    runtime: &PipelineRuntime,
    frame: &Frame,
    candidate: &ViolationCandidate,
) {
    let (Some(vehicle), Some(plate)) = (candidate.vehicle, candidate.plate) else {
        return;
    };
    session.record_violation(candidate.confidence);
    log::info!(
        "session {}: violation on frame {} (confidence {:.2})",
        session.id(),
        frame.index,
        candidate.confidence.mean
    );

    let crops = match runtime
        .crops
        .save_violation(session.id(), frame, &vehicle, &plate)
    {
        Ok(crops) => crops,
        Err(err) => {
            log::warn!(
                "session {}: could not save crops for frame {}: {:#}",
                session.id(),
                frame.index,
                err
            );
            return;
        }
    };
    runtime.notifier.notify(ViolationReport::new(
        session.id(),
        frame.index,
        &crops,
        candidate.confidence,
    ));
}
