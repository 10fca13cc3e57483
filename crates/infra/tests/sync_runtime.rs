//! End-to-end sync through a running runtime against a mock Rocket Matter host

use billsync_core::ManualEntry;
use billsync_domain::config::PlatformConfig;
use billsync_domain::{
    BillingStatus, Config, CredentialMaterial, Platform, PlatformErrorKind, TimeEntry,
};
use billsync_infra::{RuntimeDeps, SyncRuntime};
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "rm_live_0123456789abcdef";

async fn rocket_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer) -> Config {
    let mut platform =
        PlatformConfig::new(Platform::RocketMatter, CredentialMaterial::ApiKey { key: API_KEY.into() });
    platform.base_url = Some(server.uri());
    Config { platforms: vec![platform], ..Config::default() }
}

fn manual() -> ManualEntry {
    let mut entry = TimeEntry::new(
        "client-7",
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        dec!(1.1),
        "Prepare deposition outline",
    );
    entry.task_code = Some("L120".into());
    ManualEntry::new(entry)
}

#[tokio::test]
async fn approved_entry_syncs_and_records_external_id() {
    let server = rocket_server().await;
    Mock::given(method("POST"))
        .and(path("/time_entries"))
        .and(header("x-api-key", API_KEY))
        .and(body_partial_json(json!({
            "client_id": "client-7",
            "date": "03/14/2025",
            "narrative": "Prepare deposition outline",
            "task_code": "L120"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "te-42",
            "client_id": "client-7",
            "date": "03/14/2025",
            "hours": 1.1,
            "narrative": "Prepare deposition outline"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let runtime = SyncRuntime::init_with(config(&server), RuntimeDeps::default()).await.unwrap();
    let engine = runtime.engine();

    let created = engine.create_entry(manual()).await.unwrap();
    assert_eq!(created.status, BillingStatus::Pending);
    assert_eq!(created.platform, Platform::RocketMatter);

    engine.approve(&created.id).await.unwrap();
    let summary = engine.sync_all(Platform::RocketMatter).await.unwrap();
    assert_eq!(summary.synced_count, 1);
    assert_eq!(summary.error_count, 0);

    let synced = engine.get_entry(&created.id).await.unwrap();
    assert_eq!(synced.status, BillingStatus::Synced);
    assert_eq!(synced.external_id.as_deref(), Some("te-42"));
    assert!(synced.synced_at.is_some());
    assert_eq!(synced.sync.attempts, 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn vendor_rejection_fails_permanently() {
    let server = rocket_server().await;
    Mock::given(method("POST"))
        .and(path("/time_entries"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "errors": [{ "field": "client_id", "message": "Client is archived" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let runtime = SyncRuntime::init_with(config(&server), RuntimeDeps::default()).await.unwrap();
    let engine = runtime.engine();

    let created = engine.create_entry(manual()).await.unwrap();
    engine.approve(&created.id).await.unwrap();
    let summary = engine.sync_all(Platform::RocketMatter).await.unwrap();
    assert_eq!(summary.error_count, 1);

    let failed = engine.get_entry(&created.id).await.unwrap();
    assert_eq!(failed.status, BillingStatus::Failed);
    assert!(!failed.sync.retryable);
    assert!(failed.sync.next_retry_at.is_none());
    let last_error = failed.sync.last_error.expect("failure recorded");
    assert_eq!(last_error.kind, PlatformErrorKind::Validation);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn server_error_schedules_a_retry() {
    let server = rocket_server().await;
    Mock::given(method("POST"))
        .and(path("/time_entries"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let runtime = SyncRuntime::init_with(config(&server), RuntimeDeps::default()).await.unwrap();
    let engine = runtime.engine();

    let created = engine.create_entry(manual()).await.unwrap();
    engine.approve(&created.id).await.unwrap();
    engine.sync_all(Platform::RocketMatter).await.unwrap();

    let failed = engine.get_entry(&created.id).await.unwrap();
    assert_eq!(failed.status, BillingStatus::Failed);
    assert!(failed.sync.retryable);
    assert!(failed.sync.next_retry_at.is_some());

    let status = engine.retry_status(&created.id).await.unwrap();
    assert_eq!(status.attempts, 1);

    runtime.shutdown().await.unwrap();
}
