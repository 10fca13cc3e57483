//! Billing entries and their synchronization state
//!
//! A [`BillingEntry`] is the unit the sync engine tracks. Only the engine
//! moves it between [`BillingStatus`] values; adapters report outcomes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{BillSyncError, PlatformErrorKind, Result};
use crate::impl_domain_status_conversions;
use crate::types::entities::{Client, Matter, TimeEntry, User};
use crate::types::platform::Platform;

/// Synchronization status of a billing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    Pending,
    Approved,
    Synced,
    Failed,
    Rejected,
}

impl_domain_status_conversions!(BillingStatus {
    Pending => "pending",
    Approved => "approved",
    Synced => "synced",
    Failed => "failed",
    Rejected => "rejected",
});

impl BillingStatus {
    /// Allowed transitions. `Pending` can never reach `Synced` directly.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected)
                | (Self::Approved, Self::Synced | Self::Failed | Self::Rejected)
                | (Self::Failed, Self::Approved | Self::Rejected)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Synced | Self::Rejected)
    }
}

/// Reference to the upstream record that produced a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRef {
    pub origin_id: String,
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Structured estimate produced by the upstream classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCandidate {
    pub origin_id: String,
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub suggested_hours: Decimal,
    #[serde(default)]
    pub suggested_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_client: Option<Client>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_matter: Option<Matter>,
    /// Professional who performed the work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Overrides the engine's default platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl BillingCandidate {
    pub fn origin(&self) -> OriginRef {
        OriginRef {
            origin_id: self.origin_id.clone(),
            subject: self.subject.clone(),
            participants: self.participants.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Last failure recorded for an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: PlatformErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub occurred_at: DateTime<Utc>,
}

/// Retry bookkeeping and remote fingerprints kept alongside an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Network attempts since the last approval
    pub attempts: u32,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<SyncFailure>,
    /// Vendor modification time observed when the entry was last synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_updated_at: Option<DateTime<Utc>>,
    /// Content hash of the remote copy observed when the entry was last synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_hash: Option<String>,
    /// A create went out and its outcome is unknown; the vendor may hold a copy
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_uncertain: bool,
}

/// The unit of synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingEntry {
    pub id: String,
    pub platform: Platform,
    pub time_entry: TimeEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<Client>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matter: Option<Matter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OriginRef>,
    pub status: BillingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub sync: SyncMetadata,
}

impl BillingEntry {
    /// New `pending` entry with a time-ordered id.
    pub fn new(platform: Platform, time_entry: TimeEntry, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            platform,
            time_entry,
            client: None,
            matter: None,
            user: None,
            origin: None,
            status: BillingStatus::Pending,
            created_at: now,
            updated_at: now,
            approved_at: None,
            synced_at: None,
            external_id: None,
            sync: SyncMetadata::default(),
        }
    }

    /// Apply a status transition, stamping the matching timestamp.
    pub fn transition(&mut self, next: BillingStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BillSyncError::InvalidState(format!(
                "billing entry {} cannot move from {} to {next}",
                self.id, self.status
            )));
        }
        match next {
            BillingStatus::Approved => self.approved_at = Some(at),
            BillingStatus::Synced => self.synced_at = Some(at),
            _ => {}
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// User the entry belongs to, from the time entry or the resolved user
    pub fn owner_id(&self) -> Option<&str> {
        self.time_entry.user_id.as_deref().or_else(|| self.user.as_ref().map(|u| u.id.as_str()))
    }

    /// Failed, still retryable, and past its scheduled retry time
    pub fn is_retry_due(&self, now: DateTime<Utc>) -> bool {
        self.status == BillingStatus::Failed
            && self.sync.retryable
            && self.sync.next_retry_at.map_or(true, |at| at <= now)
    }
}

/// What a caller sees for a failed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStatus {
    pub entry_id: String,
    pub status: BillingStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub remaining_attempts: u32,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<SyncFailure>,
}

/// Result of one synchronization request for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced { external_id: String },
    Failed { kind: PlatformErrorKind, retryable: bool, message: String },
    /// Platform currently gated by the health monitor; no attempt consumed
    Deferred { reason: String },
    /// Another attempt for this entry is running
    AlreadyInFlight,
    /// The entry was rejected before the call was issued
    Cancelled,
}

/// Totals for one `sync_all` or retry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunSummary {
    pub synced_count: u32,
    pub error_count: u32,
    pub deferred_count: u32,
    pub skipped_count: u32,
    pub total_processed: u32,
}

impl SyncRunSummary {
    pub fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Synced { .. } => {
                self.synced_count += 1;
                self.total_processed += 1;
            }
            SyncOutcome::Failed { .. } => {
                self.error_count += 1;
                self.total_processed += 1;
            }
            SyncOutcome::Deferred { .. } => self.deferred_count += 1,
            SyncOutcome::AlreadyInFlight | SyncOutcome::Cancelled => self.skipped_count += 1,
        }
    }
}

/// Per-user counts by synchronization state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub user_id: String,
    pub pending: u32,
    pub approved: u32,
    pub synced: u32,
    pub failed_retryable: u32,
    pub failed_permanent: u32,
    pub rejected: u32,
    pub open_conflicts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}
