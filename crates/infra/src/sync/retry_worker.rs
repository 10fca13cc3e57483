//! Retry worker for failed billing entries.
//!
//! Polls the sync engine for entries whose retry time has come and pushes them
//! through another attempt. Join handles are tracked, cancellation is explicit,
//! and each pass is wrapped in a timeout. A pass that overruns is abandoned;
//! entries it did not reach stay due and are picked up on the next tick.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use billsync_infra::observability::WorkerMetrics;
//! use billsync_infra::sync::{RetryWorker, RetryWorkerConfig};
//!
//! # async fn example(engine: Arc<billsync_core::SyncEngine>) -> billsync_domain::Result<()> {
//! let metrics = Arc::new(WorkerMetrics::new());
//! let mut worker = RetryWorker::new(
//!     engine,
//!     RetryWorkerConfig { poll_interval: Duration::from_secs(30), ..Default::default() },
//!     metrics.clone(),
//! );
//!
//! worker.start().await?;
//! // ... application runs ...
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use billsync_core::SyncEngine;
use billsync_domain::{BillSyncError, Result, SyncRunSummary};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::{MetricsResult, WorkerMetrics};

/// Configuration for the retry worker.
#[derive(Debug, Clone)]
pub struct RetryWorkerConfig {
    /// Interval between polls for due entries
    pub poll_interval: Duration,
    /// Upper bound on one pass over the due entries
    pub processing_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for RetryWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            processing_timeout: Duration::from_secs(300),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Retry worker with explicit lifecycle management.
pub struct RetryWorker {
    engine: Arc<SyncEngine>,
    config: RetryWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    metrics: Arc<WorkerMetrics>,
}

impl RetryWorker {
    pub fn new(engine: Arc<SyncEngine>, config: RetryWorkerConfig, metrics: Arc<WorkerMetrics>) -> Self {
        Self { engine, config, cancellation: CancellationToken::new(), task_handle: None, metrics }
    }

    /// Start the worker, spawning the background polling task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(BillSyncError::Internal("retry worker already running".to_string()));
        }

        info!(poll_interval_secs = self.config.poll_interval.as_secs(), "starting retry worker");
        self.cancellation = CancellationToken::new();

        let engine = Arc::clone(&self.engine);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();
        let metrics = Arc::clone(&self.metrics);

        self.task_handle = Some(tokio::spawn(async move {
            Self::process_loop(engine, config, cancel, metrics).await;
        }));
        Ok(())
    }

    /// Stop the worker and wait for the polling task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(BillSyncError::Internal("retry worker not running".to_string()));
        }

        info!("stopping retry worker");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "retry worker task panicked");
                    return Err(BillSyncError::Internal("retry worker task panicked".to_string()));
                }
                Err(_) => {
                    warn!("retry worker did not complete within timeout");
                    return Err(BillSyncError::Internal("retry worker shutdown timeout".to_string()));
                }
            }
        }

        self.metrics.log_summary("retry_worker");
        info!("retry worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn process_loop(
        engine: Arc<SyncEngine>,
        config: RetryWorkerConfig,
        cancel: CancellationToken,
        metrics: Arc<WorkerMetrics>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("retry worker loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.poll_interval) => {
                    log_metric(metrics.record_tick(), "retry_worker.tick");
                    let started = Instant::now();

                    match tokio::time::timeout(config.processing_timeout, engine.process_due_retries()).await {
                        Ok(Ok(summary)) => record_summary(&metrics, &summary),
                        Ok(Err(e)) => {
                            error!(error = %e, "retry pass failed");
                            log_metric(metrics.record_failure(), "retry_worker.pass.error");
                        }
                        Err(_) => {
                            warn!(timeout_secs = config.processing_timeout.as_secs(), "retry pass timed out");
                            log_metric(metrics.record_timeout(), "retry_worker.pass.timeout");
                        }
                    }
                    log_metric(metrics.record_tick_duration(started.elapsed()), "retry_worker.pass.duration");
                }
            }
        }
    }
}

fn record_summary(metrics: &WorkerMetrics, summary: &SyncRunSummary) {
    if summary.total_processed == 0 && summary.deferred_count == 0 {
        debug!("no retries due");
        return;
    }
    debug!(skipped = summary.skipped_count, "retry pass completed");
    log_metric(metrics.record_processed(u64::from(summary.total_processed)), "retry_worker.processed");
    if summary.error_count > 0 {
        log_metric(metrics.record_failure(), "retry_worker.pass.failure_count");
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "failed to record worker metric");
    }
}

impl Drop for RetryWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("RetryWorker dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use billsync_common::SystemClock;
    use billsync_core::AuthManager;

    use super::*;
    use crate::store::{
        InMemoryBillingEntryRepository, InMemoryConflictRepository, InMemoryCredentialRepository,
    };

    fn engine() -> Arc<SyncEngine> {
        let auth = Arc::new(AuthManager::new(
            Arc::new(InMemoryCredentialRepository::new()),
            Arc::new(SystemClock),
            Duration::from_secs(60),
        ));
        Arc::new(SyncEngine::new(
            Arc::new(InMemoryBillingEntryRepository::new()),
            Arc::new(InMemoryConflictRepository::new()),
            auth,
        ))
    }

    fn fast_config() -> RetryWorkerConfig {
        RetryWorkerConfig { poll_interval: Duration::from_millis(10), ..Default::default() }
    }

    #[tokio::test]
    async fn ticks_until_stopped() {
        let metrics = Arc::new(WorkerMetrics::new());
        let mut worker = RetryWorker::new(engine(), fast_config(), metrics.clone());

        worker.start().await.unwrap();
        assert!(worker.is_running());
        tokio::time::sleep(Duration::from_millis(60)).await;
        worker.stop().await.unwrap();
        assert!(!worker.is_running());

        let snapshot = metrics.snapshot();
        assert!(snapshot.ticks >= 1);
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.failures, 0);
    }

    #[tokio::test]
    async fn double_start_and_idle_stop_are_errors() {
        let mut worker = RetryWorker::new(engine(), fast_config(), Arc::new(WorkerMetrics::new()));
        assert!(worker.stop().await.is_err());

        worker.start().await.unwrap();
        assert!(worker.start().await.is_err());
        worker.stop().await.unwrap();
    }

    #[test]
    fn summary_with_errors_counts_a_failure() {
        let metrics = WorkerMetrics::new();
        let summary = SyncRunSummary { synced_count: 2, error_count: 1, total_processed: 3, ..Default::default() };
        record_summary(&metrics, &summary);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.failures, 1);
    }
}
