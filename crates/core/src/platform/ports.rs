//! Port interface for practice-management platforms

use async_trait::async_trait;
use billsync_domain::{
    AccessToken, ApiResponse, AuthGrant, BulkItemError, BulkSyncSummary, Client,
    CredentialMaterial, Matter, PageRequest, Platform, PlatformErrorKind, TimeEntry,
    TimeEntryFilter, User, Validate, ValidationError,
};

/// One vendor integration.
///
/// Adapters translate between canonical entities and the vendor wire format.
/// Expected vendor failures come back as an unsuccessful [`ApiResponse`]
/// carrying a typed error. Adapters never retry writes or change billing entry
/// state. Callers hand in an [`AccessToken`] for every call.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform this adapter speaks to
    fn platform(&self) -> Platform;

    /// Vendor-specific rules layered over canonical validation
    fn validate_time_entry(&self, entry: &TimeEntry) -> Result<(), ValidationError> {
        entry.validate()
    }

    /// Exchange credential material for an access grant
    async fn authenticate(&self, credential: &CredentialMaterial) -> ApiResponse<AuthGrant>;

    /// Renew an expiring grant. Key-based platforms re-validate the key.
    async fn refresh_authentication(
        &self,
        credential: &CredentialMaterial,
    ) -> ApiResponse<AuthGrant> {
        self.authenticate(credential).await
    }

    /// Cheap authenticated call used by the health monitor
    async fn probe(&self, token: &AccessToken) -> ApiResponse<()>;

    /// List time entries matching the filter
    async fn list_time_entries(
        &self,
        token: &AccessToken,
        filter: &TimeEntryFilter,
    ) -> ApiResponse<Vec<TimeEntry>>;

    /// Get a time entry by vendor id
    async fn get_time_entry(&self, token: &AccessToken, id: &str) -> ApiResponse<TimeEntry>;

    /// Create a time entry, returning the vendor copy with its id
    async fn create_time_entry(
        &self,
        token: &AccessToken,
        entry: &TimeEntry,
    ) -> ApiResponse<TimeEntry>;

    /// Replace a time entry
    async fn update_time_entry(
        &self,
        token: &AccessToken,
        id: &str,
        entry: &TimeEntry,
    ) -> ApiResponse<TimeEntry>;

    /// Delete a time entry
    async fn delete_time_entry(&self, token: &AccessToken, id: &str) -> ApiResponse<()>;

    async fn list_clients(&self, token: &AccessToken, page: PageRequest)
        -> ApiResponse<Vec<Client>>;

    async fn get_client(&self, token: &AccessToken, id: &str) -> ApiResponse<Client>;

    async fn create_client(&self, token: &AccessToken, client: &Client) -> ApiResponse<Client>;

    /// List matters, optionally for one client
    async fn list_matters(
        &self,
        token: &AccessToken,
        client_id: Option<&str>,
        page: PageRequest,
    ) -> ApiResponse<Vec<Matter>>;

    async fn get_matter(&self, token: &AccessToken, id: &str) -> ApiResponse<Matter>;

    async fn create_matter(&self, token: &AccessToken, matter: &Matter) -> ApiResponse<Matter>;

    async fn list_users(&self, token: &AccessToken, page: PageRequest) -> ApiResponse<Vec<User>>;

    /// Create entries one at a time. A rate-limit response stops the run and
    /// the remaining entries are reported with the same error.
    async fn bulk_create_time_entries(
        &self,
        token: &AccessToken,
        entries: &[TimeEntry],
    ) -> ApiResponse<BulkSyncSummary> {
        let mut summary = BulkSyncSummary::default();
        for (index, entry) in entries.iter().enumerate() {
            match self.create_time_entry(token, entry).await.into_result() {
                Ok(_) => summary.created += 1,
                Err(error) => {
                    let stop = error.kind == PlatformErrorKind::RateLimit;
                    summary.errors.push(BulkItemError { index, entry_id: entry.id.clone(), error });
                    if stop {
                        record_skipped(&mut summary, entries, index + 1);
                        break;
                    }
                }
            }
        }
        ApiResponse::ok(summary)
    }

    /// Create entries without a vendor id and update the rest
    async fn sync_time_entries(
        &self,
        token: &AccessToken,
        entries: &[TimeEntry],
    ) -> ApiResponse<BulkSyncSummary> {
        let mut summary = BulkSyncSummary::default();
        for (index, entry) in entries.iter().enumerate() {
            let result = match entry.id.as_deref() {
                Some(id) => self.update_time_entry(token, id, entry).await.into_result().map(|_| false),
                None => self.create_time_entry(token, entry).await.into_result().map(|_| true),
            };
            match result {
                Ok(true) => summary.created += 1,
                Ok(false) => summary.updated += 1,
                Err(error) => {
                    let stop = error.kind == PlatformErrorKind::RateLimit;
                    summary.errors.push(BulkItemError { index, entry_id: entry.id.clone(), error });
                    if stop {
                        record_skipped(&mut summary, entries, index + 1);
                        break;
                    }
                }
            }
        }
        ApiResponse::ok(summary)
    }
}

fn record_skipped(summary: &mut BulkSyncSummary, entries: &[TimeEntry], from: usize) {
    let Some(cause) = summary.errors.last().map(|e| e.error.clone()) else {
        return;
    };
    for (index, entry) in entries.iter().enumerate().skip(from) {
        summary.errors.push(BulkItemError { index, entry_id: entry.id.clone(), error: cause.clone() });
    }
}
