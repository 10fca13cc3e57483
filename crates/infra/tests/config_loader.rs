//! Configuration loading from files on disk, with environment overrides

use std::collections::HashMap;
use std::io::Write;

use billsync_domain::{AuthScheme, BillSyncError, ConflictPolicy, LogFormat, Platform};
use billsync_infra::config;
use tempfile::Builder;

const TOML_CONFIG: &str = r#"
[sync]
max_attempts = 4
base_delay_secs = 10
conflict_policy = "last_writer_wins"
default_platform = "clio"

[logging]
format = "json"

[[platforms]]
platform = "clio"
timeout_secs = 20

[platforms.credential]
kind = "oauth"
client_id = "cid"
client_secret = "secret"
refresh_token = "rt"

[[platforms]]
platform = "rocket_matter"
subdomain = "smithlaw"

[platforms.credential]
kind = "api_key"
key = "rm_live_0123456789abcdef"
"#;

fn write_config(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().prefix("billsync").suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn toml_file_loads_every_section() {
    let file = write_config(TOML_CONFIG, ".toml");
    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(config.sync.max_attempts, 4);
    assert_eq!(config.sync.base_delay_secs, 10);
    assert_eq!(config.sync.conflict_policy, ConflictPolicy::LastWriterWins);
    assert_eq!(config.sync.default_platform, Some(Platform::Clio));
    assert_eq!(config.logging.format, LogFormat::Json);

    assert_eq!(config.platforms.len(), 2);
    let clio = &config.platforms[0];
    assert_eq!(clio.platform, Platform::Clio);
    assert_eq!(clio.timeout_secs, 20);
    assert_eq!(clio.credential.scheme(), AuthScheme::OAuth);

    let rocket = &config.platforms[1];
    assert_eq!(rocket.subdomain.as_deref(), Some("smithlaw"));
    assert_eq!(rocket.credential.scheme(), AuthScheme::ApiKey);
    config.validate().unwrap();
}

#[test]
fn environment_overrides_apply_to_file_config() {
    let file = write_config(TOML_CONFIG, ".toml");
    let vars: HashMap<&str, String> = [
        ("BILLSYNC_CONFIG", file.path().display().to_string()),
        ("BILLSYNC_MAX_ATTEMPTS", "7".to_string()),
        ("BILLSYNC_CONFLICT_POLICY", "manual".to_string()),
        ("BILLSYNC_LOG_FILTER", "billsync_core=debug".to_string()),
    ]
    .into_iter()
    .collect();

    let config = config::load_with(&|key| vars.get(key).cloned()).unwrap();
    assert_eq!(config.sync.max_attempts, 7);
    assert_eq!(config.sync.base_delay_secs, 10);
    assert_eq!(config.sync.conflict_policy, ConflictPolicy::Manual);
    assert_eq!(config.logging.filter.as_deref(), Some("billsync_core=debug"));
}

#[test]
fn json_file_is_accepted() {
    let json = r#"{
        "platforms": [{
            "platform": "practice_panther",
            "credential": {
                "kind": "oauth",
                "client_id": "cid",
                "client_secret": "secret",
                "refresh_token": "rt"
            }
        }]
    }"#;
    let file = write_config(json, ".json");
    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(config.platforms[0].platform, Platform::PracticePanther);
    assert_eq!(config.sync, Default::default());
}

#[test]
fn malformed_file_is_a_config_error() {
    let file = write_config("[sync\nmax_attempts = ", ".toml");
    let err = config::load_from_file(Some(file.path().to_path_buf())).unwrap_err();
    assert!(matches!(err, BillSyncError::Config(_)));
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = config::load_from_file(Some(dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, BillSyncError::Config(message) if message.contains("not found")));
}
