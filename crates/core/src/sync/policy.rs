//! Retry classification
//!
//! The one place a [`PlatformError`] becomes a retry decision.

use std::time::Duration;

use billsync_common::BackoffPolicy;
use billsync_domain::{BillSyncError, PlatformError, Result, SyncConfig};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDecision {
    pub retryable: bool,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, backoff: BackoffPolicy::default() }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self { max_attempts: max_attempts.max(1), backoff }
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let backoff =
            BackoffPolicy::new(config.base_delay(), config.backoff_multiplier, config.max_delay())
                .map_err(|err| BillSyncError::Config(err.to_string()))?;
        Ok(Self::new(config.max_attempts, backoff))
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classify a failure after `attempts` network attempts.
    ///
    /// Transient kinds retry until the attempt budget is spent. The wait is
    /// the backoff delay or the vendor's retry-after, whichever is longer.
    pub fn decide(&self, error: &PlatformError, attempts: u32, now: DateTime<Utc>) -> FailureDecision {
        let retryable = error.is_transient() && attempts < self.max_attempts;
        if !retryable {
            return FailureDecision { retryable, next_retry_at: None };
        }

        let delay = self.delay(error, attempts);
        let next_retry_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(now);
        FailureDecision { retryable, next_retry_at: Some(next_retry_at) }
    }

    fn delay(&self, error: &PlatformError, attempts: u32) -> Duration {
        let backoff = self.backoff.delay_for(attempts.saturating_sub(1));
        error.retry_after().map_or(backoff, |hint| hint.max(backoff))
    }
}
