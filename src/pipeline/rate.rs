use std::sync::Mutex;

/// Average assumed before any frame has been measured.
pub const DEFAULT_INITIAL_LATENCY_MS: f64 = 1000.0;

/// Cumulative moving average of per-frame processing latency.
///
/// Average and sample count live under one lock so concurrent `record` calls
/// always fold every sample in exactly once.
#[derive(Debug)]
pub struct RateEstimator {
    inner: Mutex<Average>,
}

#[derive(Debug, Clone, Copy)]
struct Average {
    mean_ms: f64,
    count: u64,
}

impl RateEstimator {
    pub fn new() -> Self {
        Self::with_initial(DEFAULT_INITIAL_LATENCY_MS)
    }

    /// Estimator reporting `initial_ms` until the first sample arrives.
    pub fn with_initial(initial_ms: f64) -> Self {
        Self::resume(initial_ms, 0)
    }

    /// Estimator continuing from an existing average over `count` samples.
    pub fn resume(mean_ms: f64, count: u64) -> Self {
        Self {
            inner: Mutex::new(Average { mean_ms, count }),
        }
    }

    /// Fold one latency sample into the average.
    pub fn record(&self, latency_ms: f64) {
        let mut avg = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let count = avg.count as f64;
        avg.mean_ms = (latency_ms + avg.mean_ms * count) / (count + 1.0);
        avg.count += 1;
    }

    /// Latest average, in milliseconds.
    pub fn current(&self) -> f64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).mean_ms
    }

    /// Samples recorded so far.
    pub fn count(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).count
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new()
    }
}
