//! Stage loops and the per-frame detection task.
//!
//! Termination relies on every item being visible somewhere the downstream
//! predicates look, in flow order: the ingest slot is released only after its
//! last push, dispatch takes an `ActiveWorker` before popping, and a task
//! pushes its outputs before its guard drops. The output predicate reads those
//! locations in the same order, so it cannot see everything empty while an
//! item is moving between two of them.
//!
//! Downstream loops also stay up while `ingesting` is set. A restart can find
//! the ingest slot still held by a loop that is about to release and reclaim
//! it; the flag keeps dispatch and output alive across that gap.

use anyhow::anyhow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::state::{ActiveWorker, StageSlot};
use super::Shared;
use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StageKind {
    Ingest,
    Dispatch,
    Output,
}

impl StageKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            StageKind::Ingest => "ingest",
            StageKind::Dispatch => "dispatch",
            StageKind::Output => "output",
        }
    }

    pub(crate) fn slot(self, shared: &Shared) -> &StageSlot {
        match self {
            StageKind::Ingest => &shared.ingest_slot,
            StageKind::Dispatch => &shared.dispatch_slot,
            StageKind::Output => &shared.output_slot,
        }
    }

    fn keep_going(self, shared: &Shared) -> bool {
        match self {
            StageKind::Ingest => shared.state.is_ingesting(),
            StageKind::Dispatch => {
                shared.state.is_ingesting()
                    || shared.ingest_slot.is_running()
                    || !shared.ingest.is_empty()
            }
            StageKind::Output => {
                shared.state.is_ingesting()
                    || shared.ingest_slot.is_running()
                    || !shared.ingest.is_empty()
                    || shared.state.active_workers() > 0
                    || !shared.results.is_empty()
                    || !shared.intermediate.is_empty()
            }
        }
    }

    fn step(self, shared: &Arc<Shared>) {
        match self {
            StageKind::Ingest => ingest_step(shared),
            StageKind::Dispatch => dispatch_step(shared),
            StageKind::Output => output_step(shared),
        }
    }
}

/// Body of a stage thread. The caller has already claimed the stage's slot.
pub(crate) fn run_stage(shared: &Arc<Shared>, kind: StageKind) {
    log::info!("{} stage started", kind.name());
    let slot = kind.slot(shared);
    loop {
        while kind.keep_going(shared) {
            kind.step(shared);
        }
        slot.release();
        // A restart may have found the slot still held; pick its work up here.
        if !kind.keep_going(shared) || !slot.try_claim() {
            break;
        }
    }
    if kind == StageKind::Output {
        log::info!(
            "pipeline drained: {} frames processed, avg {:.1} ms/frame",
            shared.state.processed_count(),
            shared.state.average_latency_ms()
        );
    } else {
        log::info!("{} stage exited", kind.name());
    }
}

fn ingest_step(shared: &Shared) {
    if shared.ingest.has_room() {
        let next = match shared.source.lock() {
            Ok(mut source) => source.next_frame(),
            Err(_) => Err(anyhow!("frame source lock poisoned")),
        };
        match next {
            Ok(Some(frame)) => {
                log::trace!("frame {} ingested", frame.seq);
                shared.ingest.push(frame);
            }
            Ok(None) => {
                if shared.state.end_ingesting() {
                    log::info!("frame source {} exhausted", shared.source_name);
                }
            }
            Err(e) => {
                log::error!("frame source {} failed: {:#}", shared.source_name, e);
                shared.state.end_ingesting();
            }
        }
    }
    if shared.state.is_ingesting() {
        std::thread::sleep(ingest_pacing(
            shared.state.average_latency_ms(),
            shared.scheduler.max_workers(),
        ));
    }
}

/// Delay between fetches: the average detection latency spread over the task lane.
pub(crate) fn ingest_pacing(average_latency_ms: f64, workers: usize) -> Duration {
    let ms = average_latency_ms / workers.max(1) as f64;
    if ms.is_finite() && ms > 0.0 {
        Duration::from_nanos((ms * 1_000_000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

fn dispatch_step(shared: &Arc<Shared>) {
    let active = shared.state.enter_worker();
    let Some(frame) = shared.ingest.try_pop() else {
        drop(active);
        std::thread::sleep(shared.settings.poll_interval);
        return;
    };
    log::debug!("spawning worker for frame {}", frame.seq);
    let task_shared = Arc::clone(shared);
    let seq = frame.seq;
    if let Err(e) = shared
        .scheduler
        .submit(move || detect_frame(&task_shared, frame, active))
    {
        log::error!("dropping frame {}: {:#}", seq, e);
    }
}

fn detect_frame(shared: &Shared, mut frame: Frame, active: ActiveWorker) {
    let started = Instant::now();
    assert!(
        !frame.is_empty(),
        "frame {} reached detection without pixels",
        frame.seq
    );

    if let Err(e) = shared.engine.process_frame(&mut frame) {
        log::warn!(
            "detector {} failed on frame {}: {:#}",
            shared.engine.name(),
            frame.seq,
            e
        );
    }
    let found = frame.targets().len();
    log::trace!("frame {}: {} targets", frame.seq, found);

    shared.results.push_all(frame.targets().iter().cloned());
    if shared.settings.intermediate && found > 0 {
        shared.intermediate.push(frame);
    }
    shared
        .state
        .rate()
        .record(started.elapsed().as_secs_f64() * 1000.0);
    drop(active);
}

fn output_step(shared: &Shared) {
    let mut idle = true;
    if let Some(target) = shared.results.try_pop() {
        idle = false;
        if let Err(e) = shared.sink.append(&target) {
            log::warn!(
                "dropping detection from frame {}: {:#}",
                target.frame_seq,
                e
            );
        }
    }
    if let Some(frame) = shared.intermediate.try_pop() {
        idle = false;
        match shared
            .persister
            .save(&frame, &shared.settings.output_dir)
        {
            Ok(path) => log::debug!("frame {} saved to {}", frame.seq, path.display()),
            Err(e) => log::warn!("failed to save frame {}: {:#}", frame.seq, e),
        }
    }
    if idle {
        std::thread::sleep(shared.settings.poll_interval);
    }
}
