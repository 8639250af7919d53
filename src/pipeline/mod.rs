//! Concurrent frame pipeline.
//!
//! ```text
//! FrameSource -> [ingest] -> ingest queue -> [dispatch] -> task lane -> detect
//!     detect -> results queue ------\
//!     detect -> intermediate queue --+-> [output] -> ResultsSink / FramePersister
//! ```
//!
//! Stages in brackets are long-lived loops on the scheduler's stage lane.
//! Detection runs as one task per frame on the bounded task lane. Queues are
//! polled; the ingest stage paces itself by the measured detection latency.
//!
//! `start_ingestion` schedules all three stage loops, each only when its slot is
//! free, so a run can be stopped and restarted without doubling any consumer.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod queue;
mod rate;
mod scheduler;
mod stages;
mod state;

pub use queue::{BoundedQueue, INGEST_QUEUE_CAPACITY};
pub use rate::{RateEstimator, DEFAULT_INITIAL_LATENCY_MS};
pub use scheduler::{hardware_concurrency, Scheduler};
pub use state::{ActiveWorker, PipelineState, StageSlot, StateSnapshot};

use crate::detect::{DetectionEngine, Target};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::sink::{FramePersister, ResultsSink};
use stages::StageKind;

/// Poll interval of the dispatch and output stages.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Runtime knobs of the pipeline.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Where annotated frames are written.
    pub output_dir: PathBuf,
    /// Persist frames that have at least one detection.
    pub intermediate: bool,
    /// Advisory capacity of the ingest queue.
    pub ingest_capacity: usize,
    pub poll_interval: Duration,
    /// Latency assumed before the first frame is measured.
    pub initial_latency_ms: f64,
    /// Ceiling of the detection task lane.
    pub workers: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./"),
            intermediate: false,
            ingest_capacity: INGEST_QUEUE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            initial_latency_ms: DEFAULT_INITIAL_LATENCY_MS,
            workers: hardware_concurrency(),
        }
    }
}

/// Queue depths and stage activity alongside the shared counters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineStatus {
    pub state: StateSnapshot,
    pub ingest_queued: usize,
    pub results_queued: usize,
    pub intermediate_queued: usize,
    pub stages_running: usize,
    pub task_workers: usize,
}

pub(crate) struct Shared {
    settings: PipelineSettings,
    state: Arc<PipelineState>,
    ingest: BoundedQueue<Frame>,
    results: BoundedQueue<Target>,
    intermediate: BoundedQueue<Frame>,
    source: Mutex<Box<dyn FrameSource>>,
    source_name: String,
    engine: Arc<dyn DetectionEngine>,
    sink: Arc<dyn ResultsSink>,
    persister: Arc<dyn FramePersister>,
    scheduler: Scheduler,
    ingest_slot: StageSlot,
    dispatch_slot: StageSlot,
    output_slot: StageSlot,
}

/// Handle to a running pipeline. Cheap to clone; all clones drive the same pipeline.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        source: Box<dyn FrameSource>,
        engine: Arc<dyn DetectionEngine>,
        sink: Arc<dyn ResultsSink>,
        persister: Arc<dyn FramePersister>,
    ) -> Self {
        let source_name = source.name();
        let shared = Shared {
            state: Arc::new(PipelineState::new(settings.initial_latency_ms)),
            ingest: BoundedQueue::new(settings.ingest_capacity),
            results: BoundedQueue::unbounded(),
            intermediate: BoundedQueue::unbounded(),
            source: Mutex::new(source),
            source_name,
            engine,
            sink,
            persister,
            scheduler: Scheduler::new(settings.workers),
            ingest_slot: StageSlot::new(),
            dispatch_slot: StageSlot::new(),
            output_slot: StageSlot::new(),
            settings,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.shared.settings
    }

    pub fn state(&self) -> &PipelineState {
        &self.shared.state
    }

    /// Begin fetching frames and schedule any stage loop that is not already running.
    ///
    /// Returns `Ok(false)` without touching anything when ingestion is already on.
    pub fn start_ingestion(&self) -> Result<bool> {
        if !self.shared.state.begin_ingesting() {
            return Ok(false);
        }
        log::info!(
            "fetching frames from {} with detector {}",
            self.shared.source_name,
            self.shared.engine.name()
        );
        for kind in [StageKind::Ingest, StageKind::Dispatch, StageKind::Output] {
            if let Err(e) = self.schedule(kind) {
                self.shared.state.end_ingesting();
                return Err(e);
            }
        }
        Ok(true)
    }

    /// Ask the ingest stage to stop after its current fetch.
    ///
    /// Returns false, changing nothing, when ingestion was not running.
    pub fn stop_ingestion(&self) -> bool {
        let stopped = self.shared.state.end_ingesting();
        if stopped {
            log::info!("frame fetching stopped");
        }
        stopped
    }

    pub fn status(&self) -> PipelineStatus {
        let shared = &self.shared;
        let stages_running = [&shared.ingest_slot, &shared.dispatch_slot, &shared.output_slot]
            .iter()
            .filter(|slot| slot.is_running())
            .count();
        PipelineStatus {
            state: shared.state.snapshot(),
            ingest_queued: shared.ingest.len(),
            results_queued: shared.results.len(),
            intermediate_queued: shared.intermediate.len(),
            stages_running,
            task_workers: shared.scheduler.worker_count(),
        }
    }

    /// True once nothing is ingesting, queued, in flight, or looping.
    pub fn is_idle(&self) -> bool {
        let status = self.status();
        !status.state.ingesting
            && status.stages_running == 0
            && status.state.active_workers == 0
            && status.ingest_queued == 0
            && status.results_queued == 0
            && status.intermediate_queued == 0
    }

    /// Block until every stage loop has exited.
    pub fn wait_for_stages(&self) {
        self.shared.scheduler.join_stages();
    }

    /// Wait for the stage loops to drain, then stop the task lane.
    pub fn shutdown(&self) {
        self.wait_for_stages();
        self.shared.scheduler.shutdown();
        log::info!(
            "pipeline shut down after {} frames (avg {:.1} ms/frame)",
            self.shared.state.processed_count(),
            self.shared.state.average_latency_ms()
        );
    }

    fn schedule(&self, kind: StageKind) -> Result<()> {
        let slot = kind.slot(&self.shared);
        if !slot.try_claim() {
            log::debug!("{} stage already running", kind.name());
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let spawned = self
            .shared
            .scheduler
            .spawn_stage(kind.name(), move || stages::run_stage(&shared, kind));
        if spawned.is_err() {
            slot.release();
        }
        spawned.with_context(|| format!("failed to schedule {} stage", kind.name()))
    }
}
