//! Latency timers for the executor.
//!
//! The executor measures two spans: the main query call and the wait for a
//! pooled connection. Timers are injected so tests can observe them; the
//! default timers feed `metrics` histograms and leave recorder installation
//! to the application.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Histogram for main query execution time.
pub const QUERY_DURATION_SECONDS: &str = "tidb_query_duration_seconds";

/// Histogram for connection acquisition wait time.
pub const WAIT_CONNECTION_DURATION_SECONDS: &str = "tidb_wait_connection_duration_seconds";

/// A latency instrument.
pub trait LatencyTimer: Send + Sync {
    /// Records one completed span.
    fn observe(&self, elapsed: Duration);
}

/// A running measurement; [`Stopwatch::stop`] records it.
#[must_use = "a stopwatch records nothing unless stopped"]
pub struct Stopwatch<'a> {
    timer: &'a dyn LatencyTimer,
    started: Instant,
}

impl<'a> Stopwatch<'a> {
    /// Starts measuring against the given timer.
    pub fn start(timer: &'a dyn LatencyTimer) -> Self {
        Self {
            timer,
            started: Instant::now(),
        }
    }

    /// Records the elapsed time and returns it.
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.timer.observe(elapsed);
        elapsed
    }
}

/// Records into a `metrics` histogram, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct HistogramTimer {
    name: &'static str,
}

impl HistogramTimer {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl LatencyTimer for HistogramTimer {
    fn observe(&self, elapsed: Duration) {
        ::metrics::histogram!(self.name).record(elapsed.as_secs_f64());
    }
}

/// The two timers an executor reports to.
#[derive(Clone)]
pub struct ExecutorMetrics {
    pub query: Arc<dyn LatencyTimer>,
    pub wait_connection: Arc<dyn LatencyTimer>,
}

impl ExecutorMetrics {
    pub fn new(query: Arc<dyn LatencyTimer>, wait_connection: Arc<dyn LatencyTimer>) -> Self {
        Self {
            query,
            wait_connection,
        }
    }
}

impl Default for ExecutorMetrics {
    fn default() -> Self {
        Self::new(
            Arc::new(HistogramTimer::new(QUERY_DURATION_SECONDS)),
            Arc::new(HistogramTimer::new(WAIT_CONNECTION_DURATION_SECONDS)),
        )
    }
}

impl std::fmt::Debug for ExecutorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorMetrics").finish_non_exhaustive()
    }
}

/// Timer that keeps every observation, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingTimer {
    observed: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingTimer {
    pub(crate) fn count(&self) -> usize {
        self.observed.lock().unwrap().len()
    }

    pub(crate) fn observations(&self) -> Vec<Duration> {
        self.observed.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl LatencyTimer for RecordingTimer {
    fn observe(&self, elapsed: Duration) {
        self.observed.lock().unwrap().push(elapsed);
    }
}
