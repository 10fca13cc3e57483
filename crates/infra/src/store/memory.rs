//! In-memory repositories
//!
//! Process-local implementations of the core storage ports. Records are
//! cloned in and out, so callers never share mutable state with the store.

use std::collections::HashMap;

use async_trait::async_trait;
use billsync_core::{BillingEntryRepository, ConflictRepository, CredentialRepository};
use billsync_domain::{
    BillSyncError, BillingEntry, BillingStatus, Platform, PlatformCredential, Result, SyncConflict,
};
use parking_lot::RwLock;

#[derive(Default)]
pub struct InMemoryBillingEntryRepository {
    rows: RwLock<HashMap<String, BillingEntry>>,
}

impl InMemoryBillingEntryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn oldest_first(&self, keep: impl Fn(&BillingEntry) -> bool) -> Vec<BillingEntry> {
        let mut rows: Vec<_> = self.rows.read().values().filter(|e| keep(e)).cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }
}

#[async_trait]
impl BillingEntryRepository for InMemoryBillingEntryRepository {
    async fn insert(&self, entry: &BillingEntry) -> Result<()> {
        let mut rows = self.rows.write();
        if rows.contains_key(&entry.id) {
            return Err(BillSyncError::Storage(format!("billing entry {} already exists", entry.id)));
        }
        rows.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &BillingEntry) -> Result<()> {
        match self.rows.write().get_mut(&entry.id) {
            Some(row) => {
                *row = entry.clone();
                Ok(())
            }
            None => Err(BillSyncError::NotFound(format!("billing entry {}", entry.id))),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<BillingEntry>> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn list_by_status(
        &self,
        platform: Option<Platform>,
        status: BillingStatus,
    ) -> Result<Vec<BillingEntry>> {
        Ok(self.oldest_first(|e| e.status == status && platform.map_or(true, |p| e.platform == p)))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<BillingEntry>> {
        Ok(self.oldest_first(|e| e.owner_id() == Some(user_id)))
    }
}

#[derive(Default)]
pub struct InMemoryConflictRepository {
    rows: RwLock<HashMap<String, SyncConflict>>,
}

impl InMemoryConflictRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn oldest_first(&self, keep: impl Fn(&SyncConflict) -> bool) -> Vec<SyncConflict> {
        let mut rows: Vec<_> = self.rows.read().values().filter(|c| keep(c)).cloned().collect();
        rows.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }
}

#[async_trait]
impl ConflictRepository for InMemoryConflictRepository {
    async fn save(&self, conflict: &SyncConflict) -> Result<()> {
        self.rows.write().insert(conflict.id.clone(), conflict.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SyncConflict>> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncConflict>> {
        Ok(self.oldest_first(|c| c.user_id.as_deref() == Some(user_id)))
    }

    async fn list_for_entry(&self, entry_id: &str) -> Result<Vec<SyncConflict>> {
        Ok(self.oldest_first(|c| c.entry_id == entry_id))
    }
}

#[derive(Default)]
pub struct InMemoryCredentialRepository {
    rows: RwLock<HashMap<Platform, PlatformCredential>>,
}

impl InMemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn get(&self, platform: Platform) -> Result<Option<PlatformCredential>> {
        Ok(self.rows.read().get(&platform).cloned())
    }

    async fn save(&self, credential: &PlatformCredential) -> Result<()> {
        self.rows.write().insert(credential.platform, credential.clone());
        Ok(())
    }

    async fn delete(&self, platform: Platform) -> Result<()> {
        self.rows.write().remove(&platform);
        Ok(())
    }
}
