//! Observability for the sync service: tracing setup and worker counters
//!
//! Record methods on [`metrics::WorkerMetrics`] return [`MetricsResult`] so a
//! failed recording can be logged and dropped without interrupting the worker
//! that produced it:
//!
//! ```rust
//! use billsync_infra::observability::metrics::WorkerMetrics;
//!
//! let metrics = WorkerMetrics::new();
//! if let Err(e) = metrics.record_tick() {
//!     tracing::warn!("Failed to record metric: {}", e);
//! }
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};

/// Metrics error type
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set - cannot calculate aggregate metric
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Metric name that failed (e.g., "average_duration")
        metric: &'static str,
    },

    /// A counter reached its maximum and stopped counting
    #[error("Counter '{metric}' saturated")]
    Saturated {
        /// Counter name
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
