//! Service wiring with an explicit init/shutdown lifecycle
//!
//! [`SyncRuntime`] builds every adapter from configuration, registers
//! credentials with the authentication manager, constructs the sync engine and
//! starts the two background workers. Nothing is global: callers hold the
//! runtime and must call [`SyncRuntime::shutdown`] to stop the workers.

use std::sync::Arc;

use billsync_common::{Clock, SystemClock};
use billsync_core::{
    AuthManager, BillingEntryRepository, ConflictRepository, CredentialRepository, SyncEngine,
    SyncEngineConfig,
};
use billsync_domain::{Config, PlatformConfig, PlatformCredential, Result};
use tracing::{info, warn};

use crate::health::{HealthMonitor, HealthRegistry, HealthStatusListener, LoggingListener};
use crate::integrations::build_adapters;
use crate::observability::WorkerMetrics;
use crate::store::{
    InMemoryBillingEntryRepository, InMemoryConflictRepository, InMemoryCredentialRepository,
};
use crate::sync::{RetryWorker, RetryWorkerConfig};

/// Storage, clock and listener the runtime is built on
pub struct RuntimeDeps {
    pub entries: Arc<dyn BillingEntryRepository>,
    pub conflicts: Arc<dyn ConflictRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
    pub clock: Arc<dyn Clock>,
    pub listener: Arc<dyn HealthStatusListener>,
}

impl Default for RuntimeDeps {
    /// In-memory stores, the system clock and a logging listener
    fn default() -> Self {
        Self {
            entries: Arc::new(InMemoryBillingEntryRepository::new()),
            conflicts: Arc::new(InMemoryConflictRepository::new()),
            credentials: Arc::new(InMemoryCredentialRepository::new()),
            clock: Arc::new(SystemClock),
            listener: Arc::new(LoggingListener),
        }
    }
}

pub struct SyncRuntime {
    engine: Arc<SyncEngine>,
    registry: Arc<HealthRegistry>,
    health: HealthMonitor,
    retry: RetryWorker,
    metrics: Arc<WorkerMetrics>,
}

impl SyncRuntime {
    /// Build and start a runtime on in-memory stores.
    pub async fn init(config: Config) -> Result<Self> {
        Self::init_with(config, RuntimeDeps::default()).await
    }

    /// Build and start a runtime on the given dependencies.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration or unbuildable adapter; storage
    /// errors from credential registration.
    pub async fn init_with(config: Config, deps: RuntimeDeps) -> Result<Self> {
        config.validate()?;

        let adapters = build_adapters(&config.platforms, &deps.clock)?;
        let auth = Arc::new(AuthManager::new(
            Arc::clone(&deps.credentials),
            Arc::clone(&deps.clock),
            config.auth.refresh_margin(),
        ));
        for platform_config in &config.platforms {
            let credential = initial_credential(platform_config, deps.credentials.as_ref(), &deps.clock).await?;
            auth.register(credential).await?;
        }

        let registry = Arc::new(HealthRegistry::new(&config.health, Arc::clone(&deps.clock)));
        let engine = adapters.values().fold(
            SyncEngine::new(deps.entries, deps.conflicts, Arc::clone(&auth))
                .with_config(SyncEngineConfig::from_config(&config.sync)?)
                .with_clock(Arc::clone(&deps.clock))
                .with_health_gate(registry.clone()),
            |engine, adapter| engine.with_adapter(Arc::clone(adapter)),
        );
        let engine = Arc::new(engine);

        let mut health =
            HealthMonitor::new(adapters, auth, Arc::clone(&registry), deps.listener, &config.health);
        let metrics = Arc::new(WorkerMetrics::new());
        let mut retry = RetryWorker::new(
            Arc::clone(&engine),
            RetryWorkerConfig { poll_interval: config.sync.retry_poll_interval(), ..Default::default() },
            Arc::clone(&metrics),
        );

        health.start().await?;
        if let Err(e) = retry.start().await {
            if let Err(stop_err) = health.stop().await {
                warn!(error = %stop_err, "health monitor did not stop cleanly");
            }
            return Err(e);
        }

        info!(platforms = ?engine.platforms(), "sync runtime started");
        Ok(Self { engine, registry, health, retry, metrics })
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Stop both workers. Both are stopped even if the first one fails; the
    /// first error is returned.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down sync runtime");
        let retry = self.retry.stop().await;
        let health = self.health.stop().await;
        retry.and(health)
    }
}

/// A previously stored credential wins over configuration, since refresh
/// tokens rotate. A stored credential for a different scheme is ignored.
async fn initial_credential(
    config: &PlatformConfig,
    store: &dyn CredentialRepository,
    clock: &Arc<dyn Clock>,
) -> Result<PlatformCredential> {
    match store.get(config.platform).await? {
        Some(stored) if stored.material.scheme() == config.credential.scheme() => {
            info!(platform = %config.platform, "using stored credential");
            Ok(stored)
        }
        Some(_) => {
            warn!(platform = %config.platform, "stored credential scheme differs from config; replacing");
            Ok(PlatformCredential::new(config.platform, config.credential.clone(), clock.utc_now()))
        }
        None => Ok(PlatformCredential::new(config.platform, config.credential.clone(), clock.utc_now())),
    }
}

#[cfg(test)]
mod tests {
    use billsync_domain::{BillSyncError, CredentialMaterial, Platform};

    use super::*;

    fn rocket_matter(base_url: &str) -> Config {
        let mut platform = PlatformConfig::new(
            Platform::RocketMatter,
            CredentialMaterial::ApiKey { key: "rm_live_0123456789abcdef".into() },
        );
        platform.base_url = Some(base_url.into());
        Config { platforms: vec![platform], ..Config::default() }
    }

    #[tokio::test]
    async fn invalid_config_fails_before_starting() {
        let err = SyncRuntime::init(Config::default()).await.err().unwrap();
        assert!(matches!(err, BillSyncError::Config(_)));
    }

    #[tokio::test]
    async fn stored_credential_is_preferred() {
        let store = InMemoryCredentialRepository::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let stored = PlatformCredential::new(
            Platform::RocketMatter,
            CredentialMaterial::ApiKey { key: "rm_live_rotated_key_00000".into() },
            clock.utc_now(),
        );
        store.save(&stored).await.unwrap();

        let config = rocket_matter("http://127.0.0.1:9");
        let chosen = initial_credential(&config.platforms[0], &store, &clock).await.unwrap();
        assert_eq!(chosen.material, stored.material);
    }

    #[tokio::test]
    async fn starts_and_shuts_down() {
        let runtime = SyncRuntime::init(rocket_matter("http://127.0.0.1:9")).await.unwrap();
        assert_eq!(runtime.engine().platforms(), vec![Platform::RocketMatter]);
        runtime.shutdown().await.unwrap();
    }
}
