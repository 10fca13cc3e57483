//! Conflict detection and resolution between local and vendor copies
//!
//! Substantive fields are the canonical fields that change what gets billed.
//! Metadata and the vendor modification time are not substantive, so
//! differences confined to them merge automatically.

use billsync_domain::{
    BillingEntry, ConflictPolicy, ConflictReason, ResolutionOutcome, TimeEntry,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Fields compared when deciding whether two copies genuinely disagree
pub const SUBSTANTIVE_FIELDS: [&str; 11] = [
    "client_id",
    "matter_id",
    "date",
    "hours",
    "description",
    "rate",
    "billable",
    "activity_code",
    "task_code",
    "user_id",
    "status",
];

/// One side of a comparison
#[derive(Debug, Clone, Copy)]
pub struct ConflictSide<'a> {
    pub entry: &'a TimeEntry,
    /// When this copy was last changed, if known
    pub modified_at: Option<DateTime<Utc>>,
}

impl<'a> ConflictSide<'a> {
    pub const fn new(entry: &'a TimeEntry, modified_at: Option<DateTime<Utc>>) -> Self {
        Self { entry, modified_at }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub outcome: ResolutionOutcome,
    /// Every differing field, substantive first, then `metadata`
    pub differing_fields: Vec<String>,
    /// Local copy with vendor metadata folded in, for `AutoMerged`
    pub merged: Option<TimeEntry>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    pub const fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Decide whether the vendor copy of a synced entry has diverged.
    ///
    /// With a vendor modification time and a recorded baseline, only a newer
    /// remote time with changed content counts. Without one, the content hash
    /// recorded at sync is compared instead.
    pub fn detect(&self, entry: &BillingEntry, remote: &TimeEntry) -> Option<ConflictReason> {
        let baseline = entry.sync.remote_updated_at.or(entry.synced_at);
        if let (Some(remote_modified), Some(baseline)) = (remote.last_modified, baseline) {
            let changed = remote_modified > baseline
                && (!substantive_differences(&entry.time_entry, remote).is_empty()
                    || metadata_differs(&entry.time_entry, remote));
            return changed.then_some(ConflictReason::RemoteModified);
        }

        let remote_hash = content_hash(remote);
        let changed = match &entry.sync.remote_hash {
            Some(recorded) => *recorded != remote_hash,
            None => content_hash(&entry.time_entry) != remote_hash,
        };
        changed.then_some(ConflictReason::ContentHashMismatch)
    }

    /// Settle a detected divergence.
    ///
    /// Swapping `local` and `remote` yields the complementary outcome.
    pub fn resolve(&self, local: ConflictSide<'_>, remote: ConflictSide<'_>) -> Resolution {
        let substantive = substantive_differences(local.entry, remote.entry);
        let mut differing_fields: Vec<String> =
            substantive.iter().map(|field| (*field).to_string()).collect();
        if metadata_differs(local.entry, remote.entry) {
            differing_fields.push("metadata".to_string());
        }

        if substantive.is_empty() {
            return Resolution {
                outcome: ResolutionOutcome::AutoMerged,
                differing_fields,
                merged: Some(merge_metadata(local.entry, remote.entry)),
            };
        }

        let outcome = match self.policy {
            ConflictPolicy::Manual => ResolutionOutcome::PendingManual,
            ConflictPolicy::LastWriterWins => match (local.modified_at, remote.modified_at) {
                (Some(l), Some(r)) if l > r => ResolutionOutcome::LocalWins,
                (Some(l), Some(r)) if r > l => ResolutionOutcome::RemoteWins,
                _ => ResolutionOutcome::PendingManual,
            },
        };
        Resolution { outcome, differing_fields, merged: None }
    }
}

/// Substantive fields on which `a` and `b` differ, in [`SUBSTANTIVE_FIELDS`] order
pub fn substantive_differences(a: &TimeEntry, b: &TimeEntry) -> Vec<&'static str> {
    let checks = [
        a.client_id != b.client_id,
        a.matter_id != b.matter_id,
        a.date != b.date,
        a.hours != b.hours,
        normalize_text(&a.description) != normalize_text(&b.description),
        a.rate != b.rate,
        a.billable != b.billable,
        a.activity_code != b.activity_code,
        a.task_code != b.task_code,
        a.user_id != b.user_id,
        a.status != b.status,
    ];
    SUBSTANTIVE_FIELDS
        .iter()
        .zip(checks)
        .filter_map(|(field, differs)| differs.then_some(*field))
        .collect()
}

fn metadata_differs(a: &TimeEntry, b: &TimeEntry) -> bool {
    a.metadata != b.metadata
}

/// Local copy with remote metadata layered over local metadata
fn merge_metadata(local: &TimeEntry, remote: &TimeEntry) -> TimeEntry {
    let mut merged = local.clone();
    for (key, value) in &remote.metadata {
        merged.metadata.insert(key.clone(), value.clone());
    }
    if merged.id.is_none() {
        merged.id = remote.id.clone();
    }
    merged.last_modified = match (local.last_modified, remote.last_modified) {
        (Some(l), Some(r)) => Some(l.max(r)),
        (l, r) => l.or(r),
    };
    merged
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    client_id: &'a str,
    matter_id: Option<&'a str>,
    date: String,
    hours: String,
    description: String,
    rate: Option<String>,
    billable: bool,
    activity_code: Option<&'a str>,
    task_code: Option<&'a str>,
    user_id: Option<&'a str>,
    status: String,
}

fn decimal_key(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Stable hash over the substantive fields of a time entry
pub fn content_hash(entry: &TimeEntry) -> String {
    let fingerprint = Fingerprint {
        client_id: &entry.client_id,
        matter_id: entry.matter_id.as_deref(),
        date: entry.date.to_string(),
        hours: decimal_key(entry.hours),
        description: normalize_text(&entry.description),
        rate: entry.rate.map(decimal_key),
        billable: entry.billable,
        activity_code: entry.activity_code.as_deref(),
        task_code: entry.task_code.as_deref(),
        user_id: entry.user_id.as_deref(),
        status: entry.status.to_string(),
    };
    // Serializing a struct of strings, bools and options cannot fail.
    let bytes = serde_json::to_vec(&fingerprint).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use billsync_domain::{BillingStatus, Platform, TimeEntryStatus};
    use chrono::{Duration, NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap()
    }

    fn local() -> TimeEntry {
        let mut entry = TimeEntry::new(
            "client-7",
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            dec!(1.5),
            "Draft motion to compel",
        );
        entry.id = Some("ext-1".into());
        entry.matter_id = Some("matter-3".into());
        entry.status = TimeEntryStatus::Approved;
        entry
    }

    fn synced(time_entry: TimeEntry, remote_updated_at: Option<DateTime<Utc>>) -> BillingEntry {
        let mut entry = BillingEntry::new(Platform::Clio, time_entry.clone(), t(8));
        entry.status = BillingStatus::Synced;
        entry.synced_at = Some(t(9));
        entry.external_id = Some("ext-1".into());
        entry.sync.remote_updated_at = remote_updated_at;
        entry.sync.remote_hash = Some(content_hash(&time_entry));
        entry
    }

    #[test]
    fn hash_ignores_formatting_and_metadata() {
        let a = local();
        let mut b = local();
        b.description = "  Draft   motion to\tcompel ".into();
        b.hours = dec!(1.50);
        b.metadata.insert("vendor_flag".into(), json!(true));
        assert_eq!(content_hash(&a), content_hash(&b));

        b.hours = dec!(1.6);
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn older_remote_timestamp_is_not_a_conflict() {
        let resolver = ConflictResolver::default();
        let entry = synced(local(), Some(t(9)));
        let mut remote = local();
        remote.hours = dec!(2.0);
        remote.last_modified = Some(t(9));
        assert_eq!(resolver.detect(&entry, &remote), None);

        remote.last_modified = Some(t(10));
        assert_eq!(resolver.detect(&entry, &remote), Some(ConflictReason::RemoteModified));
    }

    #[test]
    fn hash_strategy_applies_without_timestamps() {
        let resolver = ConflictResolver::default();
        let entry = synced(local(), None);
        let mut remote = local();
        // Vendors echo unmodeled fields back; they never count as changes.
        remote.metadata.insert("billsync_entry_id".into(), json!("local-1"));
        assert_eq!(resolver.detect(&entry, &remote), None);

        remote.description = "Draft motion to compel discovery".into();
        assert_eq!(resolver.detect(&entry, &remote), Some(ConflictReason::ContentHashMismatch));
    }

    #[test]
    fn metadata_only_difference_auto_merges() {
        let resolver = ConflictResolver::default();
        let ours = local();
        let mut theirs = local();
        theirs.metadata.insert("invoice_batch".into(), json!("B-12"));

        let resolution =
            resolver.resolve(ConflictSide::new(&ours, Some(t(9))), ConflictSide::new(&theirs, Some(t(10))));
        assert_eq!(resolution.outcome, ResolutionOutcome::AutoMerged);
        assert_eq!(resolution.differing_fields, vec!["metadata".to_string()]);
        let merged = resolution.merged.unwrap();
        assert_eq!(merged.metadata.get("invoice_batch"), Some(&json!("B-12")));
        assert_eq!(merged.hours, ours.hours);
    }

    #[test]
    fn manual_policy_escalates_substantive_changes() {
        let resolver = ConflictResolver::new(ConflictPolicy::Manual);
        let ours = local();
        let mut theirs = local();
        theirs.hours = dec!(2.0);

        let resolution =
            resolver.resolve(ConflictSide::new(&ours, Some(t(11))), ConflictSide::new(&theirs, Some(t(10))));
        assert_eq!(resolution.outcome, ResolutionOutcome::PendingManual);
        assert_eq!(resolution.differing_fields, vec!["hours".to_string()]);
    }

    #[test]
    fn last_writer_wins_is_symmetric() {
        let resolver = ConflictResolver::new(ConflictPolicy::LastWriterWins);
        let ours = local();
        let mut theirs = local();
        theirs.task_code = Some("L120".into());

        let cases = [
            (Some(t(11)), Some(t(10))),
            (Some(t(10)), Some(t(11))),
            (Some(t(10)), Some(t(10))),
            (None, Some(t(10))),
        ];
        for (local_at, remote_at) in cases {
            let forward = resolver
                .resolve(ConflictSide::new(&ours, local_at), ConflictSide::new(&theirs, remote_at))
                .outcome;
            let swapped = resolver
                .resolve(ConflictSide::new(&theirs, remote_at), ConflictSide::new(&ours, local_at))
                .outcome;
            assert_eq!(forward, swapped.complement(), "{local_at:?} vs {remote_at:?}");
        }

        let newer_local = resolver.resolve(
            ConflictSide::new(&ours, Some(t(12))),
            ConflictSide::new(&theirs, Some(t(12) - Duration::minutes(1))),
        );
        assert_eq!(newer_local.outcome, ResolutionOutcome::LocalWins);
    }
}
