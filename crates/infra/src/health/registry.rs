//! Per-platform health state
//!
//! The registry is the shared read side of the health monitor. The sync engine
//! consults it through [`HealthGate`] before dispatching; the monitor writes
//! probe outcomes into it. Consecutive failures close the gate for an
//! exponentially growing window.

use std::sync::Arc;
use std::time::Duration;

use billsync_common::{BackoffPolicy, Clock};
use billsync_core::HealthGate;
use billsync_domain::config::HealthConfig;
use billsync_domain::Platform;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::warn;

/// Health of one platform as of its latest probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformHealth {
    pub platform: Platform,
    pub healthy: bool,
    /// Round-trip time of the latest successful probe
    pub latency_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
    /// Calls are deferred until this instant
    pub gated_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PlatformHealth {
    fn unknown(platform: Platform) -> Self {
        Self {
            platform,
            healthy: true,
            latency_ms: None,
            consecutive_failures: 0,
            last_checked: None,
            gated_until: None,
            last_error: None,
        }
    }
}

pub struct HealthRegistry {
    states: DashMap<Platform, PlatformHealth>,
    backoff: BackoffPolicy,
    clock: Arc<dyn Clock>,
}

impl HealthRegistry {
    pub fn new(config: &HealthConfig, clock: Arc<dyn Clock>) -> Self {
        let base = Duration::from_secs(config.backoff_base_secs);
        let max = Duration::from_secs(config.backoff_max_secs);
        let backoff = BackoffPolicy::new(base, 2.0, max).unwrap_or_else(|err| {
            warn!(error = %err, "invalid health backoff; using defaults");
            BackoffPolicy::default()
        });
        Self { states: DashMap::new(), backoff, clock }
    }

    /// Record a successful probe. Returns the previous health flag.
    pub fn record_success(&self, platform: Platform, latency: Duration) -> bool {
        let now = self.clock.utc_now();
        let mut state = self.states.entry(platform).or_insert_with(|| PlatformHealth::unknown(platform));
        let was_healthy = state.healthy;
        state.healthy = true;
        state.latency_ms = Some(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
        state.consecutive_failures = 0;
        state.last_checked = Some(now);
        state.gated_until = None;
        state.last_error = None;
        was_healthy
    }

    /// Record a failed probe and close the gate for the backoff window.
    /// Returns the previous health flag.
    pub fn record_failure(&self, platform: Platform, error: impl Into<String>) -> bool {
        let now = self.clock.utc_now();
        let mut state = self.states.entry(platform).or_insert_with(|| PlatformHealth::unknown(platform));
        let was_healthy = state.healthy;
        state.healthy = false;
        state.latency_ms = None;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_checked = Some(now);

        let window = self.backoff.exponential_delay(state.consecutive_failures - 1);
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1));
        state.gated_until = Some(now + window);
        state.last_error = Some(error.into());
        was_healthy
    }

    pub fn snapshot(&self, platform: Platform) -> Option<PlatformHealth> {
        self.states.get(&platform).map(|state| state.clone())
    }

    /// Every platform probed so far, in platform order
    pub fn all(&self) -> Vec<PlatformHealth> {
        let mut all: Vec<_> = self.states.iter().map(|state| state.value().clone()).collect();
        all.sort_by_key(|state| state.platform);
        all
    }
}

impl HealthGate for HealthRegistry {
    /// Unknown platforms are available; a failing one is available again
    /// once its backoff window has passed, so the next call doubles as a probe.
    fn is_available(&self, platform: Platform) -> bool {
        let Some(state) = self.states.get(&platform) else {
            return true;
        };
        state.gated_until.map_or(true, |until| self.clock.utc_now() >= until)
    }
}
