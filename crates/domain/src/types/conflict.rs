//! Divergence between the local and the vendor copy of a synced entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;
use crate::types::entities::TimeEntry;
use crate::types::platform::Platform;

/// Why a conflict was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Vendor last-modified time is newer than the one recorded at sync
    RemoteModified,
    /// Vendor lacks a modification time and the content hash changed
    ContentHashMismatch,
    /// Vendor answered a write with 409
    RemoteRejectedWrite,
}

impl_domain_status_conversions!(ConflictReason {
    RemoteModified => "remote_modified",
    ContentHashMismatch => "content_hash_mismatch",
    RemoteRejectedWrite => "remote_rejected_write",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionOutcome {
    AutoMerged,
    RemoteWins,
    LocalWins,
    PendingManual,
}

impl_domain_status_conversions!(ResolutionOutcome {
    AutoMerged => "auto-merged",
    RemoteWins => "remote-wins",
    LocalWins => "local-wins",
    PendingManual => "pending-manual",
});

impl ResolutionOutcome {
    /// The outcome seen from the other side of the comparison
    pub const fn complement(self) -> Self {
        match self {
            Self::RemoteWins => Self::LocalWins,
            Self::LocalWins => Self::RemoteWins,
            other => other,
        }
    }

    pub const fn is_resolved(self) -> bool {
        !matches!(self, Self::PendingManual)
    }
}

/// How substantive differences are settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Escalate every substantive difference to a human
    #[default]
    Manual,
    /// Newer modification time wins; ties and unknown times escalate
    LastWriterWins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: String,
    pub entry_id: String,
    pub platform: Platform,
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub local: TimeEntry,
    pub remote: TimeEntry,
    pub reason: ConflictReason,
    pub outcome: ResolutionOutcome,
    /// Canonical fields that differ, substantive or not
    #[serde(default)]
    pub differing_fields: Vec<String>,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SyncConflict {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entry_id: impl Into<String>,
        platform: Platform,
        external_id: impl Into<String>,
        user_id: Option<String>,
        local: TimeEntry,
        remote: TimeEntry,
        reason: ConflictReason,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            entry_id: entry_id.into(),
            platform,
            external_id: external_id.into(),
            user_id,
            local,
            remote,
            reason,
            outcome: ResolutionOutcome::PendingManual,
            differing_fields: Vec::new(),
            detected_at,
            resolved_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.outcome == ResolutionOutcome::PendingManual
    }

    pub fn resolve(&mut self, outcome: ResolutionOutcome, at: DateTime<Utc>) {
        self.outcome = outcome;
        self.resolved_at = outcome.is_resolved().then_some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complement_swaps_winners_only() {
        assert_eq!(ResolutionOutcome::LocalWins.complement(), ResolutionOutcome::RemoteWins);
        assert_eq!(ResolutionOutcome::RemoteWins.complement(), ResolutionOutcome::LocalWins);
        assert_eq!(ResolutionOutcome::AutoMerged.complement(), ResolutionOutcome::AutoMerged);
        assert_eq!(
            ResolutionOutcome::PendingManual.complement(),
            ResolutionOutcome::PendingManual
        );
    }

    #[test]
    fn outcome_wire_names_are_kebab_case() {
        let json = serde_json::to_string(&ResolutionOutcome::PendingManual).unwrap();
        assert_eq!(json, "\"pending-manual\"");
        assert_eq!("local-wins".parse::<ResolutionOutcome>(), Ok(ResolutionOutcome::LocalWins));
    }
}
