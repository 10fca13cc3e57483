// Exponential backoff with optional jitter
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(30);

/// Default growth factor between consecutive attempts
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default maximum delay cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(3600);

/// Maximum exponent applied to the multiplier to prevent overflow
pub const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Rejected backoff configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid backoff policy: {0}")]
pub struct BackoffError(String);

/// Exponential backoff: `base_delay * multiplier^attempt`, capped at
/// `max_delay`, with optional proportional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with validation
    pub fn new(
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError(format!("multiplier must be >= 1.0, got {multiplier}")));
        }

        if base_delay > max_delay {
            return Err(BackoffError(format!(
                "base_delay ({base_delay:?}) cannot be greater than max_delay ({max_delay:?})"
            )));
        }

        Ok(Self { base_delay, multiplier, max_delay, jitter_factor: 0.0 })
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    #[must_use]
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before the retry that follows `attempt` (zero based), jitter
    /// applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.apply_jitter(self.exponential_delay(attempt))
    }

    /// Delay for `attempt` without jitter.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(MAX_BACKOFF_EXPONENT)).unwrap_or(i32::MAX);
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let delay = (base * self.multiplier.powi(exponent)).min(max);
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Apply jitter to prevent thundering herd
    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 || delay.is_zero() {
            return delay;
        }

        let delay_secs = delay.as_secs_f64();
        let jitter_range = delay_secs * self.jitter_factor;

        // Add random jitter: -jitter_range/2 to +jitter_range/2
        let jitter = rand::thread_rng().gen_range(-jitter_range / 2.0..=jitter_range / 2.0);
        Duration::from_secs_f64((delay_secs + jitter).clamp(0.0, self.max_delay.as_secs_f64()))
    }

    /// Configured base delay
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Configured cap
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}
