//! Shared test helpers for `billsync-core` integration tests.
//!
//! These helpers provide in-memory repositories and a scriptable platform
//! adapter so engine tests can focus on behaviour instead of boilerplate.

#![allow(dead_code)]

pub mod adapter;
pub mod repositories;

use std::sync::Arc;
use std::time::Duration;

use billsync_common::{BackoffPolicy, Clock, MockClock};
use billsync_core::{AuthManager, RetryPolicy, SyncEngine, SyncEngineConfig};
use billsync_domain::{
    BillingCandidate, Client, ConflictPolicy, CredentialMaterial, Matter, MatterStatus,
    PlatformCredential, User,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

pub use adapter::ScriptedAdapter;
pub use repositories::{InMemoryConflicts, InMemoryCredentials, InMemoryEntries};

pub struct Harness {
    pub engine: SyncEngine,
    pub adapter: Arc<ScriptedAdapter>,
    pub clock: MockClock,
    pub entries: Arc<InMemoryEntries>,
    pub conflicts: Arc<InMemoryConflicts>,
}

pub fn test_config(policy: ConflictPolicy) -> SyncEngineConfig {
    let backoff = BackoffPolicy::new(Duration::from_secs(1), 2.0, Duration::from_secs(60))
        .expect("valid backoff");
    SyncEngineConfig {
        retry: RetryPolicy::new(3, backoff),
        per_platform_concurrency: 2,
        call_timeout: Duration::from_secs(5),
        default_platform: None,
        conflict_policy: policy,
    }
}

pub async fn harness() -> Harness {
    harness_with(ConflictPolicy::Manual).await
}

pub async fn harness_with(policy: ConflictPolicy) -> Harness {
    let clock = MockClock::starting_at(Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap());
    let adapter = Arc::new(ScriptedAdapter::new());
    let entries = Arc::new(InMemoryEntries::default());
    let conflicts = Arc::new(InMemoryConflicts::default());

    let auth = Arc::new(AuthManager::new(
        Arc::new(InMemoryCredentials::default()),
        Arc::new(clock.clone()),
        Duration::from_secs(300),
    ));
    auth.register(PlatformCredential::new(
        adapter.platform_id(),
        CredentialMaterial::OAuth {
            client_id: "app".into(),
            client_secret: "secret".into(),
            access_token: None,
            refresh_token: "refresh".into(),
        },
        clock.utc_now(),
    ))
    .await
    .expect("register credential");

    let engine = SyncEngine::new(entries.clone(), conflicts.clone(), auth)
        .with_config(test_config(policy))
        .with_adapter(adapter.clone())
        .with_clock(Arc::new(clock.clone()));

    Harness { engine, adapter, clock, entries, conflicts }
}

pub fn client() -> Client {
    Client::new("client-42", "Acme Holdings")
}

pub fn matter() -> Matter {
    Matter {
        id: Some("matter-7".into()),
        client_id: "client-42".into(),
        name: "Acme v. Initech".into(),
        status: MatterStatus::Active,
        open_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        close_date: None,
        practice_area: Some("Litigation".into()),
        responsible_attorney: None,
        metadata: Default::default(),
    }
}

pub fn user() -> User {
    User {
        id: "user-1".into(),
        name: "Dana Reyes".into(),
        email: "dana@example.com".into(),
        role: "attorney".into(),
        active: true,
        default_rate: Some(Decimal::new(350, 0)),
        metadata: Default::default(),
    }
}

pub fn candidate(hours: Decimal) -> BillingCandidate {
    BillingCandidate {
        origin_id: "msg-001".into(),
        subject: "Re: discovery schedule".into(),
        participants: vec!["opposing@example.com".into()],
        timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 8, 30, 0).unwrap(),
        suggested_hours: hours,
        suggested_description: "Review and respond to discovery schedule email".into(),
        suggested_client: Some(client()),
        suggested_matter: Some(matter()),
        user: Some(user()),
        platform: None,
    }
}
