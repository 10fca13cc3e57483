//! Runtime configuration
//!
//! Every section has defaults so a file or environment only needs to name the
//! platforms and their credentials.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BillSyncError, Result};
use crate::types::{AuthScheme, ConflictPolicy, CredentialMaterial, Platform};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub auth: AuthConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
    pub platforms: Vec<PlatformConfig>,
}

/// Sync engine and retry tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Attempts before a transiently failing entry stops retrying
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub backoff_multiplier: f64,
    pub max_delay_secs: u64,
    /// Simultaneous vendor calls per platform
    pub per_platform_concurrency: usize,
    /// Upper bound on any single vendor call
    pub call_timeout_secs: u64,
    /// How often the retry worker looks for due entries
    pub retry_poll_interval_secs: u64,
    /// Platform used for candidates that do not name one
    pub default_platform: Option<Platform>,
    pub conflict_policy: ConflictPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 30,
            backoff_multiplier: 2.0,
            max_delay_secs: 3600,
            per_platform_concurrency: 2,
            call_timeout_secs: 30,
            retry_poll_interval_secs: 30,
            default_platform: None,
            conflict_policy: ConflictPolicy::Manual,
        }
    }
}

impl SyncConfig {
    pub const fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    pub const fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub const fn retry_poll_interval(&self) -> Duration {
        Duration::from_secs(self.retry_poll_interval_secs)
    }
}

/// Authentication manager tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Refresh tokens this long before they expire
    pub refresh_margin_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { refresh_margin_secs: 300 }
    }
}

impl AuthConfig {
    pub const fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}

/// Health monitor tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_secs: u64,
    pub probe_timeout_secs: u64,
    /// Gate window after the first failed probe; doubles per failure
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { interval_secs: 300, probe_timeout_secs: 5, backoff_base_secs: 30, backoff_max_secs: 1800 }
    }
}

impl HealthConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

/// One configured platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub platform: Platform,
    /// Tenant subdomain for subdomain-scoped hosts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    /// Overrides the vendor host, e.g. for a sandbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub credential: CredentialMaterial,
}

const fn default_timeout_secs() -> u64 {
    30
}

impl PlatformConfig {
    pub const fn new(platform: Platform, credential: CredentialMaterial) -> Self {
        Self { platform, subdomain: None, base_url: None, timeout_secs: default_timeout_secs(), credential }
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn platform(&self, platform: Platform) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|p| p.platform == platform)
    }

    /// Reject configurations that would fail later in confusing ways.
    pub fn validate(&self) -> Result<()> {
        if self.platforms.is_empty() {
            return Err(BillSyncError::Config("at least one platform must be configured".into()));
        }

        let mut seen = HashSet::new();
        for entry in &self.platforms {
            if !seen.insert(entry.platform) {
                return Err(BillSyncError::Config(format!(
                    "platform {} is configured more than once",
                    entry.platform
                )));
            }
            if entry.credential.scheme() != entry.platform.auth_scheme() {
                let expected = match entry.platform.auth_scheme() {
                    AuthScheme::ApiKey => "api_key",
                    AuthScheme::OAuth => "oauth",
                };
                return Err(BillSyncError::Config(format!(
                    "platform {} expects `{expected}` credentials",
                    entry.platform
                )));
            }
            if entry.platform == Platform::RocketMatter
                && entry.subdomain.is_none()
                && entry.base_url.is_none()
            {
                return Err(BillSyncError::Config(
                    "rocket_matter requires a subdomain or base_url".into(),
                ));
            }
            if entry.timeout_secs == 0 {
                return Err(BillSyncError::Config(format!(
                    "platform {} timeout must be positive",
                    entry.platform
                )));
            }
        }

        if let Some(default) = self.sync.default_platform {
            if self.platform(default).is_none() {
                return Err(BillSyncError::Config(format!(
                    "default platform {default} is not configured"
                )));
            }
        }

        let sync = &self.sync;
        if sync.max_attempts == 0 {
            return Err(BillSyncError::Config("sync.max_attempts must be at least 1".into()));
        }
        if !sync.backoff_multiplier.is_finite() || sync.backoff_multiplier < 1.0 {
            return Err(BillSyncError::Config("sync.backoff_multiplier must be >= 1.0".into()));
        }
        if sync.base_delay_secs > sync.max_delay_secs {
            return Err(BillSyncError::Config(
                "sync.base_delay_secs cannot exceed sync.max_delay_secs".into(),
            ));
        }
        if sync.per_platform_concurrency == 0 || sync.call_timeout_secs == 0 {
            return Err(BillSyncError::Config(
                "sync.per_platform_concurrency and sync.call_timeout_secs must be positive".into(),
            ));
        }
        if self.health.interval_secs == 0 {
            return Err(BillSyncError::Config("health.interval_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clio() -> PlatformConfig {
        PlatformConfig::new(
            Platform::Clio,
            CredentialMaterial::OAuth {
                client_id: "id".into(),
                client_secret: "secret".into(),
                access_token: None,
                refresh_token: "rt".into(),
            },
        )
    }

    fn rocket_matter() -> PlatformConfig {
        let mut config = PlatformConfig::new(
            Platform::RocketMatter,
            CredentialMaterial::ApiKey { key: "rm_live_0123456789abcdef".into() },
        );
        config.subdomain = Some("smithlaw".into());
        config
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.health.interval(), Duration::from_secs(300));
        assert_eq!(config.auth.refresh_margin(), Duration::from_secs(300));
        assert_eq!(config.sync.conflict_policy, ConflictPolicy::Manual);
    }

    #[test]
    fn valid_config_passes() {
        let config = Config { platforms: vec![clio(), rocket_matter()], ..Config::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_platform_list() {
        assert!(matches!(Config::default().validate(), Err(BillSyncError::Config(_))));
    }

    #[test]
    fn rejects_duplicate_platforms() {
        let config = Config { platforms: vec![clio(), clio()], ..Config::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_mismatched_credential_kind() {
        let mut wrong = clio();
        wrong.credential = CredentialMaterial::ApiKey { key: "k".into() };
        let config = Config { platforms: vec![wrong], ..Config::default() };
        assert!(config.validate().unwrap_err().to_string().contains("oauth"));
    }

    #[test]
    fn rocket_matter_needs_a_host() {
        let mut rm = rocket_matter();
        rm.subdomain = None;
        let config = Config { platforms: vec![rm], ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_platform_must_be_configured() {
        let mut config = Config { platforms: vec![clio()], ..Config::default() };
        config.sync.default_platform = Some(Platform::PracticePanther);
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "sync": { "max_attempts": 3 },
            "platforms": [
                { "platform": "rocket_matter", "subdomain": "acme",
                  "credential": { "kind": "api_key", "key": "rm_live_0123456789abcdef" } }
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.sync.base_delay_secs, 30);
        assert_eq!(config.platforms[0].timeout_secs, 30);
        assert!(config.validate().is_ok());
    }
}
