//! Background platform health monitoring with explicit lifecycle
//!
//! The monitor owns one task that probes every configured platform on a fixed
//! interval:
//! - Explicit lifecycle (start/stop with join handle)
//! - Cancellation support
//! - Timeout on every probe
//! - Listener callbacks on health transitions only
//!
//! Probe outcomes land in the shared [`HealthRegistry`], which the sync engine
//! reads as its [`HealthGate`](billsync_core::HealthGate).
//!
//! # Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use billsync_common::SystemClock;
//! use billsync_domain::{HealthConfig, Result};
//! use billsync_infra::health::{HealthMonitor, HealthRegistry, LoggingListener};
//!
//! # async fn example(auth: Arc<billsync_core::AuthManager>) -> Result<()> {
//! let config = HealthConfig::default();
//! let registry = Arc::new(HealthRegistry::new(&config, Arc::new(SystemClock)));
//! let mut monitor = HealthMonitor::new(
//!     HashMap::new(),
//!     auth,
//!     registry,
//!     Arc::new(LoggingListener),
//!     &config,
//! );
//!
//! monitor.start().await?;
//! // ... do work ...
//! monitor.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use billsync_core::{AuthManager, PlatformAdapter};
use billsync_domain::{BillSyncError, HealthConfig, Platform, PlatformError, Result};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::HealthRegistry;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A platform crossed between healthy and unhealthy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthEvent {
    pub platform: Platform,
    pub healthy: bool,
    pub error: Option<String>,
}

/// Receives health transitions. Not called for repeated identical results.
#[async_trait]
pub trait HealthStatusListener: Send + Sync {
    async fn on_health_changed(&self, event: HealthEvent);
}

/// Listener that only logs transitions
pub struct LoggingListener;

#[async_trait]
impl HealthStatusListener for LoggingListener {
    async fn on_health_changed(&self, event: HealthEvent) {
        if event.healthy {
            info!(platform = %event.platform, "platform recovered");
        } else {
            warn!(
                platform = %event.platform,
                error = event.error.as_deref().unwrap_or("unknown"),
                "platform unhealthy"
            );
        }
    }
}

/// Probes every platform in the background and feeds the registry.
pub struct HealthMonitor {
    adapters: Arc<HashMap<Platform, Arc<dyn PlatformAdapter>>>,
    auth: Arc<AuthManager>,
    registry: Arc<HealthRegistry>,
    listener: Arc<dyn HealthStatusListener>,
    interval: Duration,
    probe_timeout: Duration,
    task_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
        auth: Arc<AuthManager>,
        registry: Arc<HealthRegistry>,
        listener: Arc<dyn HealthStatusListener>,
        config: &HealthConfig,
    ) -> Self {
        Self {
            adapters: Arc::new(adapters),
            auth,
            registry,
            listener,
            interval: config.interval(),
            probe_timeout: config.probe_timeout(),
            task_handle: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<HealthRegistry> {
        &self.registry
    }

    /// Spawn the probe loop. The first round runs immediately.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the monitor is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(BillSyncError::Internal("health monitor already running".to_string()));
        }

        self.cancellation = CancellationToken::new();
        let prober = Prober {
            adapters: Arc::clone(&self.adapters),
            auth: Arc::clone(&self.auth),
            registry: Arc::clone(&self.registry),
            listener: Arc::clone(&self.listener),
            probe_timeout: self.probe_timeout,
        };
        let cancel = self.cancellation.clone();
        let interval = self.interval;

        info!(
            interval_secs = interval.as_secs(),
            platforms = self.adapters.len(),
            "starting health monitor"
        );
        self.task_handle = Some(tokio::spawn(health_worker(prober, interval, cancel)));
        Ok(())
    }

    /// Cancel the loop and wait up to five seconds for it to finish.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            tokio::time::timeout(JOIN_TIMEOUT, handle)
                .await
                .map_err(|_| BillSyncError::Internal("health monitor shutdown timeout".to_string()))?
                .map_err(|e| BillSyncError::Internal(format!("health monitor join failed: {e}")))?;
        }

        info!("health monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some() && !self.cancellation.is_cancelled()
    }

    /// Probe every platform once, outside the background loop.
    pub async fn check_now(&self) {
        let prober = Prober {
            adapters: Arc::clone(&self.adapters),
            auth: Arc::clone(&self.auth),
            registry: Arc::clone(&self.registry),
            listener: Arc::clone(&self.listener),
            probe_timeout: self.probe_timeout,
        };
        prober.check_all().await;
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("health monitor dropped while running; cancelling");
            self.cancellation.cancel();
        }
    }
}

struct Prober {
    adapters: Arc<HashMap<Platform, Arc<dyn PlatformAdapter>>>,
    auth: Arc<AuthManager>,
    registry: Arc<HealthRegistry>,
    listener: Arc<dyn HealthStatusListener>,
    probe_timeout: Duration,
}

impl Prober {
    async fn check_all(&self) {
        let mut platforms: Vec<_> = self.adapters.keys().copied().collect();
        platforms.sort();
        for platform in platforms {
            if let Some(adapter) = self.adapters.get(&platform) {
                self.check(adapter.as_ref()).await;
            }
        }
    }

    async fn check(&self, adapter: &dyn PlatformAdapter) {
        let platform = adapter.platform();
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.probe_timeout, self.probe(adapter)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::timeout(format!(
                "probe exceeded {}s",
                self.probe_timeout.as_secs()
            ))),
        };

        let (was_healthy, event) = match outcome {
            Ok(()) => {
                let latency = started.elapsed();
                debug!(platform = %platform, latency_ms = latency.as_millis() as u64, "probe ok");
                let was = self.registry.record_success(platform, latency);
                (was, HealthEvent { platform, healthy: true, error: None })
            }
            Err(err) => {
                debug!(platform = %platform, error = %err, "probe failed");
                let message = err.to_string();
                let was = self.registry.record_failure(platform, message.clone());
                (was, HealthEvent { platform, healthy: false, error: Some(message) })
            }
        };

        if was_healthy != event.healthy {
            info!(platform = %platform, healthy = event.healthy, "platform health changed");
            self.listener.on_health_changed(event).await;
        }
    }

    async fn probe(&self, adapter: &dyn PlatformAdapter) -> std::result::Result<(), PlatformError> {
        let token = self.auth.access_token(adapter).await?;
        adapter.probe(&token).await.into_result()
    }
}

async fn health_worker(prober: Prober, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("health monitor worker shutting down");
                break;
            }
            _ = prober.check_all() => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("health monitor worker shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
