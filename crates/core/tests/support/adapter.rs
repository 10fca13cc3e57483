//! Scriptable platform adapter
//!
//! Keeps a remote store in memory, fails writes from a scripted queue, and
//! can hold a create call open until the test releases it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use billsync_core::PlatformAdapter;
use billsync_domain::constants::BILLING_ENTRY_STAMP_KEY;
use billsync_domain::{
    AccessToken, ApiResponse, AuthGrant, Client, CredentialMaterial, Matter, PageRequest,
    Platform, PlatformError, TimeEntry, TimeEntryFilter, User,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

pub fn remote_created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()
}

pub struct ScriptedAdapter {
    remote: Mutex<HashMap<String, TimeEntry>>,
    create_failures: Mutex<VecDeque<PlatformError>>,
    list_failures: Mutex<VecDeque<PlatformError>>,
    lost_response: Mutex<Option<PlatformError>>,
    hold_creates: AtomicBool,
    pub create_entered: Notify,
    pub create_release: Notify,
    pub create_calls: AtomicU32,
    pub update_calls: AtomicU32,
    pub get_calls: AtomicU32,
    pub list_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    next_id: AtomicU32,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            remote: Mutex::new(HashMap::new()),
            create_failures: Mutex::new(VecDeque::new()),
            list_failures: Mutex::new(VecDeque::new()),
            lost_response: Mutex::new(None),
            hold_creates: AtomicBool::new(false),
            create_entered: Notify::new(),
            create_release: Notify::new(),
            create_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
            get_calls: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            next_id: AtomicU32::new(1000),
        }
    }

    pub fn platform_id(&self) -> Platform {
        Platform::Clio
    }

    /// Fail the next create calls, in order
    pub fn fail_creates(&self, errors: impl IntoIterator<Item = PlatformError>) {
        self.create_failures.lock().unwrap().extend(errors);
    }

    /// Fail the next list calls, in order
    pub fn fail_lists(&self, errors: impl IntoIterator<Item = PlatformError>) {
        self.list_failures.lock().unwrap().extend(errors);
    }

    /// Store the next created entry but answer as if the response was lost
    pub fn lose_next_response(&self) {
        self.commit_then_fail(PlatformError::timeout("response lost"));
    }

    /// Store the next created entry but answer with `err`
    pub fn commit_then_fail(&self, err: PlatformError) {
        *self.lost_response.lock().unwrap() = Some(err);
    }

    /// Park create calls until `create_release` is notified
    pub fn hold_creates(&self, hold: bool) {
        self.hold_creates.store(hold, Ordering::SeqCst);
    }

    pub fn remote_entry(&self, id: &str) -> Option<TimeEntry> {
        self.remote.lock().unwrap().get(id).cloned()
    }

    pub fn remote_count(&self) -> usize {
        self.remote.lock().unwrap().len()
    }

    /// Change the vendor copy as a user of the vendor UI would
    pub fn edit_remote(&self, id: &str, at: DateTime<Utc>, edit: impl FnOnce(&mut TimeEntry)) {
        let mut remote = self.remote.lock().unwrap();
        let entry = remote.get_mut(id).expect("remote entry exists");
        edit(entry);
        entry.last_modified = Some(at);
    }

    pub fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform_id()
    }

    async fn authenticate(&self, _credential: &CredentialMaterial) -> ApiResponse<AuthGrant> {
        ApiResponse::ok(AuthGrant {
            token: "token-0".into(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            refresh_token: None,
        })
    }

    async fn refresh_authentication(
        &self,
        _credential: &CredentialMaterial,
    ) -> ApiResponse<AuthGrant> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        ApiResponse::ok(AuthGrant {
            token: format!("token-{n}"),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            refresh_token: Some(format!("refresh-{n}")),
        })
    }

    async fn probe(&self, _token: &AccessToken) -> ApiResponse<()> {
        ApiResponse::ok(())
    }

    async fn list_time_entries(
        &self,
        _token: &AccessToken,
        filter: &TimeEntryFilter,
    ) -> ApiResponse<Vec<TimeEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_failures.lock().unwrap().pop_front() {
            return ApiResponse::failure(err);
        }
        let remote = self.remote.lock().unwrap();
        let rows = remote
            .values()
            .filter(|e| filter.date_from.map_or(true, |from| e.date >= from))
            .filter(|e| filter.date_to.map_or(true, |to| e.date <= to))
            .filter(|e| filter.client_id.as_ref().map_or(true, |c| &e.client_id == c))
            .cloned()
            .collect();
        ApiResponse::ok(rows)
    }

    async fn get_time_entry(&self, _token: &AccessToken, id: &str) -> ApiResponse<TimeEntry> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        match self.remote_entry(id) {
            Some(entry) => ApiResponse::ok(entry),
            None => ApiResponse::failure(PlatformError::not_found(format!("time entry {id}"))),
        }
    }

    async fn create_time_entry(
        &self,
        _token: &AccessToken,
        entry: &TimeEntry,
    ) -> ApiResponse<TimeEntry> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_creates.load(Ordering::SeqCst) {
            self.create_entered.notify_one();
            self.create_release.notified().await;
        }
        if let Some(err) = self.create_failures.lock().unwrap().pop_front() {
            return ApiResponse::failure(err);
        }

        let id = format!("ext-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut stored = entry.clone();
        stored.id = Some(id.clone());
        stored.last_modified = Some(remote_created_at());
        assert!(stored.metadata.contains_key(BILLING_ENTRY_STAMP_KEY));
        self.remote.lock().unwrap().insert(id, stored.clone());

        if let Some(err) = self.lost_response.lock().unwrap().take() {
            return ApiResponse::failure(err);
        }
        ApiResponse::ok(stored)
    }

    async fn update_time_entry(
        &self,
        _token: &AccessToken,
        id: &str,
        entry: &TimeEntry,
    ) -> ApiResponse<TimeEntry> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut remote = self.remote.lock().unwrap();
        let Some(existing) = remote.get_mut(id) else {
            return ApiResponse::failure(PlatformError::not_found(format!("time entry {id}")));
        };
        let metadata = existing.metadata.clone();
        *existing = TimeEntry {
            id: Some(id.to_string()),
            metadata,
            last_modified: Some(remote_created_at() + chrono::Duration::hours(5)),
            ..entry.clone()
        };
        ApiResponse::ok(existing.clone())
    }

    async fn delete_time_entry(&self, _token: &AccessToken, id: &str) -> ApiResponse<()> {
        self.remote.lock().unwrap().remove(id);
        ApiResponse::ok(())
    }

    async fn list_clients(&self, _token: &AccessToken, _page: PageRequest) -> ApiResponse<Vec<Client>> {
        ApiResponse::ok(vec![super::client()])
    }

    async fn get_client(&self, _token: &AccessToken, _id: &str) -> ApiResponse<Client> {
        ApiResponse::ok(super::client())
    }

    async fn create_client(&self, _token: &AccessToken, client: &Client) -> ApiResponse<Client> {
        ApiResponse::ok(client.clone())
    }

    async fn list_matters(
        &self,
        _token: &AccessToken,
        _client_id: Option<&str>,
        _page: PageRequest,
    ) -> ApiResponse<Vec<Matter>> {
        ApiResponse::ok(vec![super::matter()])
    }

    async fn get_matter(&self, _token: &AccessToken, _id: &str) -> ApiResponse<Matter> {
        ApiResponse::ok(super::matter())
    }

    async fn create_matter(&self, _token: &AccessToken, matter: &Matter) -> ApiResponse<Matter> {
        ApiResponse::ok(matter.clone())
    }

    async fn list_users(&self, _token: &AccessToken, _page: PageRequest) -> ApiResponse<Vec<User>> {
        ApiResponse::ok(vec![super::user()])
    }
}
