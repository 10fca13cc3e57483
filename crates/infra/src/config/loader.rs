//! Configuration loader
//!
//! Loads service configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads `.env` into the process environment (existing variables win)
//! 2. If `BILLSYNC_PLATFORMS` is set, builds the configuration from the
//!    environment
//! 3. Otherwise loads `BILLSYNC_CONFIG` or the first probed config file
//! 4. Tuning variables override either source, then the result is validated
//!
//! ## Environment Variables
//! - `BILLSYNC_PLATFORMS`: comma-separated platforms (`clio,practice_panther`)
//! - `BILLSYNC_<P>_CLIENT_ID`, `_CLIENT_SECRET`, `_REFRESH_TOKEN`,
//!   `_ACCESS_TOKEN` (optional): OAuth platforms
//! - `BILLSYNC_<P>_API_KEY`: API-key platforms
//! - `BILLSYNC_<P>_SUBDOMAIN`, `_BASE_URL`, `_TIMEOUT_SECS`: optional
//!
//! where `<P>` is `CLIO`, `PRACTICEPANTHER` or `ROCKETMATTER`.
//!
//! Tuning: `BILLSYNC_MAX_ATTEMPTS`, `BILLSYNC_BASE_DELAY_SECS`,
//! `BILLSYNC_MAX_DELAY_SECS`, `BILLSYNC_BACKOFF_MULTIPLIER`,
//! `BILLSYNC_PLATFORM_CONCURRENCY`, `BILLSYNC_CALL_TIMEOUT_SECS`,
//! `BILLSYNC_RETRY_POLL_SECS`, `BILLSYNC_DEFAULT_PLATFORM`,
//! `BILLSYNC_CONFLICT_POLICY`, `BILLSYNC_REFRESH_MARGIN_SECS`,
//! `BILLSYNC_HEALTH_INTERVAL_SECS`, `BILLSYNC_HEALTH_PROBE_TIMEOUT_SECS`,
//! `BILLSYNC_LOG_FORMAT`, `BILLSYNC_LOG_FILTER`.
//!
//! ## File Locations
//! Without `BILLSYNC_CONFIG` the loader probes, in order, `billsync.{toml,json}`
//! and `config/billsync.{toml,json}` in the working directory, then the same
//! names next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use billsync_domain::{
    BillSyncError, Config, ConflictPolicy, CredentialMaterial, LogFormat, Platform,
    PlatformConfig, Result,
};
use thiserror::Error;

use crate::errors::InfraError;

const PLATFORMS_VAR: &str = "BILLSYNC_PLATFORMS";
const CONFIG_PATH_VAR: &str = "BILLSYNC_CONFIG";

#[derive(Debug, Error, PartialEq, Eq)]
enum EnvError {
    #[error("missing required environment variable {0}")]
    Missing(String),

    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid { var: String, value: String, reason: String },
}

impl From<EnvError> for BillSyncError {
    fn from(err: EnvError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Load, override and validate configuration.
///
/// # Errors
/// Returns `BillSyncError::Config` if no source yields a configuration or the
/// result fails [`Config::validate`].
pub fn load() -> Result<Config> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }
    load_with(&|key| std::env::var(key).ok())
}

/// [`load`] against an arbitrary variable source, without reading `.env`.
pub fn load_with(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Config> {
    let mut config = if lookup(PLATFORMS_VAR).is_some() {
        let config = load_from_lookup(lookup)?;
        tracing::info!(platforms = config.platforms.len(), "configuration loaded from environment");
        config
    } else {
        tracing::debug!("{PLATFORMS_VAR} unset, trying config file");
        load_from_file(lookup(CONFIG_PATH_VAR).map(PathBuf::from))?
    };

    apply_overrides(&mut config, lookup)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from the process environment.
///
/// # Errors
/// Returns `BillSyncError::Config` if a named platform lacks its credentials
/// or a variable does not parse.
pub fn load_from_env() -> Result<Config> {
    load_from_lookup(&|key| std::env::var(key).ok())
}

fn load_from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Config> {
    let names = required(lookup, PLATFORMS_VAR)?;
    let mut config = Config::default();

    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let platform = parse_value::<Platform>(PLATFORMS_VAR, name)?;
        config.platforms.push(platform_from_lookup(platform, lookup)?);
    }
    Ok(config)
}

fn platform_from_lookup(
    platform: Platform,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<PlatformConfig> {
    let var = |suffix: &str| format!("BILLSYNC_{}_{suffix}", platform.env_prefix());

    let credential = match platform {
        Platform::Clio | Platform::PracticePanther => CredentialMaterial::OAuth {
            client_id: required(lookup, &var("CLIENT_ID"))?,
            client_secret: required(lookup, &var("CLIENT_SECRET"))?,
            access_token: optional(lookup, &var("ACCESS_TOKEN")),
            refresh_token: required(lookup, &var("REFRESH_TOKEN"))?,
        },
        Platform::RocketMatter => CredentialMaterial::ApiKey { key: required(lookup, &var("API_KEY"))? },
    };

    let mut entry = PlatformConfig::new(platform, credential);
    entry.subdomain = optional(lookup, &var("SUBDOMAIN"));
    entry.base_url = optional(lookup, &var("BASE_URL"));
    if let Some(secs) = parsed::<u64>(lookup, &var("TIMEOUT_SECS"))? {
        entry.timeout_secs = secs;
    }
    Ok(entry)
}

/// Apply tuning variables on top of a loaded configuration.
fn apply_overrides(config: &mut Config, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
    let sync = &mut config.sync;
    set(&mut sync.max_attempts, parsed(lookup, "BILLSYNC_MAX_ATTEMPTS")?);
    set(&mut sync.base_delay_secs, parsed(lookup, "BILLSYNC_BASE_DELAY_SECS")?);
    set(&mut sync.max_delay_secs, parsed(lookup, "BILLSYNC_MAX_DELAY_SECS")?);
    set(&mut sync.backoff_multiplier, parsed(lookup, "BILLSYNC_BACKOFF_MULTIPLIER")?);
    set(&mut sync.per_platform_concurrency, parsed(lookup, "BILLSYNC_PLATFORM_CONCURRENCY")?);
    set(&mut sync.call_timeout_secs, parsed(lookup, "BILLSYNC_CALL_TIMEOUT_SECS")?);
    set(&mut sync.retry_poll_interval_secs, parsed(lookup, "BILLSYNC_RETRY_POLL_SECS")?);
    if let Some(platform) = parsed::<Platform>(lookup, "BILLSYNC_DEFAULT_PLATFORM")? {
        sync.default_platform = Some(platform);
    }
    if let Some(raw) = optional(lookup, "BILLSYNC_CONFLICT_POLICY") {
        sync.conflict_policy = parse_conflict_policy(&raw)?;
    }

    set(&mut config.auth.refresh_margin_secs, parsed(lookup, "BILLSYNC_REFRESH_MARGIN_SECS")?);
    set(&mut config.health.interval_secs, parsed(lookup, "BILLSYNC_HEALTH_INTERVAL_SECS")?);
    set(&mut config.health.probe_timeout_secs, parsed(lookup, "BILLSYNC_HEALTH_PROBE_TIMEOUT_SECS")?);

    if let Some(raw) = optional(lookup, "BILLSYNC_LOG_FORMAT") {
        config.logging.format = parse_log_format(&raw)?;
    }
    if let Some(filter) = optional(lookup, "BILLSYNC_LOG_FILTER") {
        config.logging.filter = Some(filter);
    }
    Ok(())
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format follows the
/// extension (`.json` or `.toml`). The result is not validated.
///
/// # Errors
/// Returns `BillSyncError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(BillSyncError::Config(format!("config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            BillSyncError::Config(format!(
                "no configuration: set {PLATFORMS_VAR} or provide a billsync.toml/billsync.json"
            ))
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path).map_err(InfraError::from)?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| InfraError::from(e).into()),
        "json" => serde_json::from_str(contents).map_err(|e| InfraError::from(e).into()),
        _ => Err(BillSyncError::Config(format!("unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut bases = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        bases.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        bases.push(exe_dir);
    }

    bases
        .iter()
        .flat_map(|base| {
            ["billsync.toml", "billsync.json", "config/billsync.toml", "config/billsync.json"]
                .into_iter()
                .map(move |name| base.join(name))
        })
        .find(|path| path.exists())
}

fn parse_conflict_policy(raw: &str) -> Result<ConflictPolicy> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "manual" => Ok(ConflictPolicy::Manual),
        "last_writer_wins" | "lww" => Ok(ConflictPolicy::LastWriterWins),
        _ => Err(invalid("BILLSYNC_CONFLICT_POLICY", raw, "expected manual or last_writer_wins").into()),
    }
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "compact" | "text" => Ok(LogFormat::Compact),
        "json" => Ok(LogFormat::Json),
        _ => Err(invalid("BILLSYNC_LOG_FORMAT", raw, "expected compact or json").into()),
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> std::result::Result<String, EnvError> {
    optional(lookup, key).ok_or_else(|| EnvError::Missing(key.to_string()))
}

/// Unset and blank values both read as absent.
fn optional(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> std::result::Result<Option<T>, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional(lookup, key).map(|raw| parse_value(key, &raw)).transpose()
}

fn parse_value<T>(key: &str, raw: &str) -> std::result::Result<T, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| invalid(key, raw, e.to_string()))
}

fn invalid(var: &str, value: &str, reason: impl Into<String>) -> EnvError {
    EnvError::Invalid { var: var.to_string(), value: value.to_string(), reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::Builder;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    fn all_platforms() -> Vec<(&'static str, &'static str)> {
        vec![
            ("BILLSYNC_PLATFORMS", "clio, practice_panther,rocket_matter"),
            ("BILLSYNC_CLIO_CLIENT_ID", "clio-id"),
            ("BILLSYNC_CLIO_CLIENT_SECRET", "clio-secret"),
            ("BILLSYNC_CLIO_REFRESH_TOKEN", "clio-rt"),
            ("BILLSYNC_PRACTICEPANTHER_CLIENT_ID", "pp-id"),
            ("BILLSYNC_PRACTICEPANTHER_CLIENT_SECRET", "pp-secret"),
            ("BILLSYNC_PRACTICEPANTHER_REFRESH_TOKEN", "pp-rt"),
            ("BILLSYNC_PRACTICEPANTHER_ACCESS_TOKEN", "pp-at"),
            ("BILLSYNC_ROCKETMATTER_API_KEY", "rm_live_0123456789abcdef"),
            ("BILLSYNC_ROCKETMATTER_SUBDOMAIN", "smithlaw"),
            ("BILLSYNC_ROCKETMATTER_TIMEOUT_SECS", "45"),
        ]
    }

    #[test]
    fn builds_every_platform_from_environment() {
        let config = load_with(&env(&all_platforms())).unwrap();

        assert_eq!(config.platforms.len(), 3);
        let pp = config.platform(Platform::PracticePanther).unwrap();
        match &pp.credential {
            CredentialMaterial::OAuth { access_token, refresh_token, .. } => {
                assert_eq!(access_token.as_deref(), Some("pp-at"));
                assert_eq!(refresh_token, "pp-rt");
            }
            other => panic!("unexpected credential: {other:?}"),
        }
        let rm = config.platform(Platform::RocketMatter).unwrap();
        assert_eq!(rm.subdomain.as_deref(), Some("smithlaw"));
        assert_eq!(rm.timeout_secs, 45);
        assert_eq!(config.platform(Platform::Clio).unwrap().timeout_secs, 30);
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let err = load_with(&env(&[
            ("BILLSYNC_PLATFORMS", "clio"),
            ("BILLSYNC_CLIO_CLIENT_ID", "id"),
            ("BILLSYNC_CLIO_REFRESH_TOKEN", "rt"),
        ]))
        .unwrap_err();

        match err {
            BillSyncError::Config(msg) => assert!(msg.contains("BILLSYNC_CLIO_CLIENT_SECRET"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = load_with(&env(&[("BILLSYNC_PLATFORMS", "mycase")])).unwrap_err();
        assert!(matches!(err, BillSyncError::Config(msg) if msg.contains("mycase")));
    }

    #[test]
    fn tuning_overrides_apply() {
        let mut vars = all_platforms();
        vars.extend([
            ("BILLSYNC_MAX_ATTEMPTS", "8"),
            ("BILLSYNC_BACKOFF_MULTIPLIER", "1.5"),
            ("BILLSYNC_DEFAULT_PLATFORM", "clio"),
            ("BILLSYNC_CONFLICT_POLICY", "last-writer-wins"),
            ("BILLSYNC_HEALTH_INTERVAL_SECS", "60"),
            ("BILLSYNC_LOG_FORMAT", "JSON"),
            ("BILLSYNC_LOG_FILTER", "billsync_core=debug"),
        ]);
        let config = load_with(&env(&vars)).unwrap();

        assert_eq!(config.sync.max_attempts, 8);
        assert_eq!(config.sync.backoff_multiplier, 1.5);
        assert_eq!(config.sync.default_platform, Some(Platform::Clio));
        assert_eq!(config.sync.conflict_policy, ConflictPolicy::LastWriterWins);
        assert_eq!(config.health.interval_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter.as_deref(), Some("billsync_core=debug"));
    }

    #[test]
    fn unparsable_tuning_value_is_a_config_error() {
        let mut vars = all_platforms();
        vars.push(("BILLSYNC_MAX_ATTEMPTS", "lots"));
        let err = load_with(&env(&vars)).unwrap_err();
        assert!(matches!(err, BillSyncError::Config(msg) if msg.contains("BILLSYNC_MAX_ATTEMPTS")));
    }

    #[test]
    fn overrides_are_validated() {
        let mut vars = all_platforms();
        vars.push(("BILLSYNC_MAX_ATTEMPTS", "0"));
        assert!(matches!(load_with(&env(&vars)), Err(BillSyncError::Config(_))));
    }

    #[test]
    fn falls_back_to_toml_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[sync]
max_attempts = 3

[[platforms]]
platform = "rocket_matter"
subdomain = "smithlaw"

[platforms.credential]
kind = "api_key"
key = "rm_live_0123456789abcdef"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let config = load_with(&env(&[("BILLSYNC_CONFIG", path.as_str())])).unwrap();
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.platforms[0].platform, Platform::RocketMatter);
    }

    #[test]
    fn reads_json_file() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "health": {{ "interval_secs": 120 }},
                "platforms": [{{
                    "platform": "clio",
                    "credential": {{
                        "kind": "oauth",
                        "client_id": "id",
                        "client_secret": "secret",
                        "refresh_token": "rt"
                    }}
                }}]
            }}"#
        )
        .unwrap();

        let config = load_from_file(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.health.interval_secs, 120);
        assert_eq!(config.platforms[0].platform, Platform::Clio);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_from_file(Some(PathBuf::from("/nonexistent/billsync.toml"))).unwrap_err();
        assert!(matches!(err, BillSyncError::Config(_)));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let file = Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(load_from_file(Some(file.path().to_path_buf())).is_err());
    }
}
