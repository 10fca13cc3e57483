//! Port interfaces for sync operations

use async_trait::async_trait;
use billsync_domain::{BillingEntry, BillingStatus, Platform, Result, SyncConflict};

/// Durable store for billing entries
#[async_trait]
pub trait BillingEntryRepository: Send + Sync {
    /// Store a new entry; fails if the id exists
    async fn insert(&self, entry: &BillingEntry) -> Result<()>;

    /// Replace an existing entry; fails with `NotFound` if absent
    async fn update(&self, entry: &BillingEntry) -> Result<()>;

    /// Get an entry by id
    async fn get(&self, id: &str) -> Result<Option<BillingEntry>>;

    /// Entries in a status, oldest first, optionally for one platform
    async fn list_by_status(
        &self,
        platform: Option<Platform>,
        status: BillingStatus,
    ) -> Result<Vec<BillingEntry>>;

    /// Entries owned by a user, oldest first
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<BillingEntry>>;
}

/// Durable store for detected conflicts
#[async_trait]
pub trait ConflictRepository: Send + Sync {
    /// Insert or replace a conflict
    async fn save(&self, conflict: &SyncConflict) -> Result<()>;

    /// Get a conflict by id
    async fn get(&self, id: &str) -> Result<Option<SyncConflict>>;

    /// Conflicts owned by a user, oldest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncConflict>>;

    /// Conflicts recorded against one billing entry
    async fn list_for_entry(&self, entry_id: &str) -> Result<Vec<SyncConflict>>;
}

/// Availability gate consulted before every vendor call
pub trait HealthGate: Send + Sync {
    fn is_available(&self, platform: Platform) -> bool;
}

/// Gate that never defers, for setups without a health monitor
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

impl HealthGate for AlwaysAvailable {
    fn is_available(&self, _platform: Platform) -> bool {
        true
    }
}
