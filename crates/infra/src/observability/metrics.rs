//! Counters for background workers
//!
//! Independent counters use `Relaxed`/`AcqRel` ordering; the snapshot is not
//! a consistent cut across counters, which is fine for logging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::{MetricsError, MetricsResult};

#[derive(Debug, Default)]
pub struct WorkerMetrics {
    ticks: AtomicU64,
    processed: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    busy_ms: AtomicU64,
    max_tick_ms: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerMetricsSnapshot {
    pub ticks: u64,
    pub processed: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub busy_ms: u64,
    pub max_tick_ms: u64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) -> MetricsResult<()> {
        increment(&self.ticks, 1, "ticks")
    }

    /// Entries handled during a tick, whatever their outcome
    pub fn record_processed(&self, count: u64) -> MetricsResult<()> {
        increment(&self.processed, count, "processed")
    }

    pub fn record_failure(&self) -> MetricsResult<()> {
        increment(&self.failures, 1, "failures")
    }

    pub fn record_timeout(&self) -> MetricsResult<()> {
        increment(&self.timeouts, 1, "timeouts")
    }

    pub fn record_tick_duration(&self, duration: Duration) -> MetricsResult<()> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.max_tick_ms.fetch_max(ms, Ordering::AcqRel);
        increment(&self.busy_ms, ms, "busy_ms")
    }

    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            ticks: self.ticks.load(Ordering::Acquire),
            processed: self.processed.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
            timeouts: self.timeouts.load(Ordering::Acquire),
            busy_ms: self.busy_ms.load(Ordering::Acquire),
            max_tick_ms: self.max_tick_ms.load(Ordering::Acquire),
        }
    }

    /// Mean wall time per tick
    ///
    /// # Errors
    ///
    /// `EmptyData` before the first tick.
    pub fn average_tick_duration(&self) -> MetricsResult<Duration> {
        let snapshot = self.snapshot();
        if snapshot.ticks == 0 {
            return Err(MetricsError::EmptyData { metric: "average_tick_duration" });
        }
        Ok(Duration::from_millis(snapshot.busy_ms / snapshot.ticks))
    }

    /// Emit the counters as one structured log line.
    pub fn log_summary(&self, worker: &'static str) {
        let s = self.snapshot();
        info!(
            worker,
            ticks = s.ticks,
            processed = s.processed,
            failures = s.failures,
            timeouts = s.timeouts,
            busy_ms = s.busy_ms,
            max_tick_ms = s.max_tick_ms,
            "worker metrics"
        );
    }
}

fn increment(counter: &AtomicU64, by: u64, metric: &'static str) -> MetricsResult<()> {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| current.checked_add(by))
        .map(|_| ())
        .map_err(|_| MetricsError::Saturated { metric })
}
