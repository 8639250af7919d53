use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::rate::RateEstimator;

/// Process-wide lifecycle flags and counters shared by every stage and task.
#[derive(Debug)]
pub struct PipelineState {
    ingesting: AtomicBool,
    active_workers: AtomicUsize,
    rate: RateEstimator,
}

impl PipelineState {
    pub fn new(initial_latency_ms: f64) -> Self {
        Self {
            ingesting: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            rate: RateEstimator::with_initial(initial_latency_ms),
        }
    }

    pub fn is_ingesting(&self) -> bool {
        self.ingesting.load(Ordering::SeqCst)
    }

    /// Flip `ingesting` from false to true. Returns false if it was already set.
    pub fn begin_ingesting(&self) -> bool {
        self.ingesting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Clear `ingesting`. Returns false if it was already clear.
    pub fn end_ingesting(&self) -> bool {
        self.ingesting.swap(false, Ordering::SeqCst)
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Count one frame as in flight until the returned guard drops.
    pub fn enter_worker(self: &Arc<Self>) -> ActiveWorker {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        ActiveWorker {
            state: Arc::clone(self),
        }
    }

    pub fn rate(&self) -> &RateEstimator {
        &self.rate
    }

    pub fn average_latency_ms(&self) -> f64 {
        self.rate.current()
    }

    pub fn processed_count(&self) -> u64 {
        self.rate.count()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            ingesting: self.is_ingesting(),
            active_workers: self.active_workers(),
            average_latency_ms: self.average_latency_ms(),
            processed_count: self.processed_count(),
        }
    }
}

/// Point-in-time copy of `PipelineState`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateSnapshot {
    pub ingesting: bool,
    pub active_workers: usize,
    pub average_latency_ms: f64,
    pub processed_count: u64,
}

/// Scoped in-flight marker. Decrements `active_workers` on drop, including
/// while unwinding out of a panicking detector.
#[derive(Debug)]
pub struct ActiveWorker {
    state: Arc<PipelineState>,
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        self.state.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Ownership flag for a long-lived stage loop. At most one loop per slot runs.
#[derive(Debug, Default)]
pub struct StageSlot {
    running: AtomicBool,
}

impl StageSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. Returns false if a loop already owns it.
    pub fn try_claim(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
