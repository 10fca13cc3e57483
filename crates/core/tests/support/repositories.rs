//! In-memory repository implementations for testing
//!
//! Provide deterministic storage for all core repository ports, enabling
//! engine tests without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use billsync_core::{BillingEntryRepository, ConflictRepository, CredentialRepository};
use billsync_domain::{
    BillSyncError, BillingEntry, BillingStatus, Platform, PlatformCredential,
    Result as DomainResult, SyncConflict,
};

#[derive(Default)]
pub struct InMemoryEntries {
    rows: Mutex<HashMap<String, BillingEntry>>,
}

impl InMemoryEntries {
    pub fn snapshot(&self, id: &str) -> Option<BillingEntry> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    fn sorted(&self, keep: impl Fn(&BillingEntry) -> bool) -> Vec<BillingEntry> {
        let mut rows: Vec<_> =
            self.rows.lock().unwrap().values().filter(|e| keep(e)).cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }
}

#[async_trait]
impl BillingEntryRepository for InMemoryEntries {
    async fn insert(&self, entry: &BillingEntry) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&entry.id) {
            return Err(BillSyncError::Storage(format!("duplicate entry {}", entry.id)));
        }
        rows.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &BillingEntry) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&entry.id) {
            Some(row) => {
                *row = entry.clone();
                Ok(())
            }
            None => Err(BillSyncError::NotFound(entry.id.clone())),
        }
    }

    async fn get(&self, id: &str) -> DomainResult<Option<BillingEntry>> {
        Ok(self.snapshot(id))
    }

    async fn list_by_status(
        &self,
        platform: Option<Platform>,
        status: BillingStatus,
    ) -> DomainResult<Vec<BillingEntry>> {
        Ok(self.sorted(|e| e.status == status && platform.map_or(true, |p| e.platform == p)))
    }

    async fn list_by_user(&self, user_id: &str) -> DomainResult<Vec<BillingEntry>> {
        Ok(self.sorted(|e| e.owner_id() == Some(user_id)))
    }
}

#[derive(Default)]
pub struct InMemoryConflicts {
    rows: Mutex<HashMap<String, SyncConflict>>,
}

impl InMemoryConflicts {
    pub fn all(&self) -> Vec<SyncConflict> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl ConflictRepository for InMemoryConflicts {
    async fn save(&self, conflict: &SyncConflict) -> DomainResult<()> {
        self.rows.lock().unwrap().insert(conflict.id.clone(), conflict.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<SyncConflict>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> DomainResult<Vec<SyncConflict>> {
        Ok(self.all().into_iter().filter(|c| c.user_id.as_deref() == Some(user_id)).collect())
    }

    async fn list_for_entry(&self, entry_id: &str) -> DomainResult<Vec<SyncConflict>> {
        Ok(self.all().into_iter().filter(|c| c.entry_id == entry_id).collect())
    }
}

#[derive(Default)]
pub struct InMemoryCredentials {
    rows: Mutex<HashMap<Platform, PlatformCredential>>,
}

#[async_trait]
impl CredentialRepository for InMemoryCredentials {
    async fn get(&self, platform: Platform) -> DomainResult<Option<PlatformCredential>> {
        Ok(self.rows.lock().unwrap().get(&platform).cloned())
    }

    async fn save(&self, credential: &PlatformCredential) -> DomainResult<()> {
        self.rows.lock().unwrap().insert(credential.platform, credential.clone());
        Ok(())
    }

    async fn delete(&self, platform: Platform) -> DomainResult<()> {
        self.rows.lock().unwrap().remove(&platform);
        Ok(())
    }
}
