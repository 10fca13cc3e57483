//! Billing entry lifecycle and synchronization
//!
//! The engine is the only component that moves a [`BillingEntry`] between
//! statuses. Every vendor call goes through one path: health gate, platform
//! permit, credential check, bounded call, then classification of the result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use billsync_common::{Clock, SystemClock};
use billsync_domain::constants::{
    BILLING_ENTRY_STAMP_KEY, MAX_ERROR_MESSAGE_LEN, MAX_PAGE_LIMIT,
};
use billsync_domain::{
    round_up_to_increment, AccessToken, ApiResponse, BillSyncError, BillingCandidate,
    BillingEntry, BillingStatus, Client, ConflictPolicy, Matter, PageRequest, Platform,
    PlatformError, PlatformErrorKind, ResolutionOutcome, Result, RetryStatus, SyncConfig,
    SyncConflict, SyncFailure, SyncOutcome, SyncRunSummary, SyncStats, TimeEntry,
    TimeEntryFilter, TimeEntryStatus, User, Validate,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::auth::AuthManager;
use crate::conflict::{content_hash, ConflictResolver, ConflictSide};
use crate::platform::PlatformAdapter;
use crate::sync::in_flight::InFlightRegistry;
use crate::sync::policy::RetryPolicy;
use crate::sync::ports::{AlwaysAvailable, BillingEntryRepository, ConflictRepository, HealthGate};

/// Engine tuning derived from [`SyncConfig`]
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    pub retry: RetryPolicy,
    pub per_platform_concurrency: usize,
    pub call_timeout: Duration,
    pub default_platform: Option<Platform>,
    pub conflict_policy: ConflictPolicy,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            per_platform_concurrency: 2,
            call_timeout: Duration::from_secs(30),
            default_platform: None,
            conflict_policy: ConflictPolicy::Manual,
        }
    }
}

impl SyncEngineConfig {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            retry: RetryPolicy::from_config(config)?,
            per_platform_concurrency: config.per_platform_concurrency.max(1),
            call_timeout: config.call_timeout(),
            default_platform: config.default_platform,
            conflict_policy: config.conflict_policy,
        })
    }
}

/// A billing entry entered by hand rather than derived from a candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ManualEntry {
    pub platform: Option<Platform>,
    pub time_entry: TimeEntry,
    pub client: Option<Client>,
    pub matter: Option<Matter>,
    pub user: Option<User>,
}

impl ManualEntry {
    pub fn new(time_entry: TimeEntry) -> Self {
        Self { platform: None, time_entry, client: None, matter: None, user: None }
    }
}

pub struct SyncEngine {
    entries: Arc<dyn BillingEntryRepository>,
    conflicts: Arc<dyn ConflictRepository>,
    auth: Arc<AuthManager>,
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    permits: HashMap<Platform, Arc<Semaphore>>,
    health: Arc<dyn HealthGate>,
    clock: Arc<dyn Clock>,
    resolver: ConflictResolver,
    in_flight: InFlightRegistry,
    config: SyncEngineConfig,
}

impl SyncEngine {
    pub fn new(
        entries: Arc<dyn BillingEntryRepository>,
        conflicts: Arc<dyn ConflictRepository>,
        auth: Arc<AuthManager>,
    ) -> Self {
        let config = SyncEngineConfig::default();
        Self {
            entries,
            conflicts,
            auth,
            adapters: HashMap::new(),
            permits: HashMap::new(),
            health: Arc::new(AlwaysAvailable),
            clock: Arc::new(SystemClock),
            resolver: ConflictResolver::new(config.conflict_policy),
            in_flight: InFlightRegistry::new(),
            config,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        let platform = adapter.platform();
        self.permits
            .insert(platform, Arc::new(Semaphore::new(self.config.per_platform_concurrency)));
        self.adapters.insert(platform, adapter);
        self
    }

    pub fn with_health_gate(mut self, health: Arc<dyn HealthGate>) -> Self {
        self.health = health;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SyncEngineConfig) -> Self {
        self.resolver = ConflictResolver::new(config.conflict_policy);
        for permits in self.permits.values_mut() {
            *permits = Arc::new(Semaphore::new(config.per_platform_concurrency));
        }
        self.config = config;
        self
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<_> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }

    pub fn adapter(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>> {
        self.adapters
            .get(&platform)
            .cloned()
            .ok_or_else(|| BillSyncError::Config(format!("no adapter registered for {platform}")))
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    // ---------------------------------------------------------------------
    // Entry lifecycle
    // ---------------------------------------------------------------------

    /// Create a `pending` entry from a classifier candidate.
    ///
    /// Hours are rounded up to the billing increment. Validation happens at
    /// approval, so an implausible estimate still lands for review.
    pub async fn create_from_candidate(&self, candidate: &BillingCandidate) -> Result<BillingEntry> {
        let platform = self.target_platform(candidate.platform)?;

        let description = match candidate.suggested_description.trim() {
            "" => candidate.subject.trim().to_string(),
            text => text.to_string(),
        };
        let client_id = candidate
            .suggested_client
            .as_ref()
            .and_then(|c| c.id.clone())
            .or_else(|| candidate.suggested_matter.as_ref().map(|m| m.client_id.clone()))
            .unwrap_or_default();

        let mut time_entry = TimeEntry::new(
            client_id,
            candidate.timestamp.date_naive(),
            round_up_to_increment(candidate.suggested_hours),
            description,
        );
        time_entry.matter_id = candidate.suggested_matter.as_ref().and_then(|m| m.id.clone());
        time_entry.user_id = candidate.user.as_ref().map(|u| u.id.clone());
        time_entry.rate = candidate
            .user
            .as_ref()
            .and_then(|u| u.default_rate)
            .or_else(|| candidate.suggested_client.as_ref().and_then(|c| c.default_rate));
        time_entry.status = TimeEntryStatus::Pending;

        let mut entry = BillingEntry::new(platform, time_entry, self.clock.utc_now());
        entry.client = candidate.suggested_client.clone();
        entry.matter = candidate.suggested_matter.clone();
        entry.user = candidate.user.clone();
        entry.origin = Some(candidate.origin());

        self.entries.insert(&entry).await?;
        info!(
            entry_id = %entry.id,
            platform = %platform,
            origin_id = %candidate.origin_id,
            hours = %entry.time_entry.hours,
            "billing entry created from candidate"
        );
        Ok(entry)
    }

    /// Create a `pending` entry from a hand-entered time entry.
    pub async fn create_entry(&self, manual: ManualEntry) -> Result<BillingEntry> {
        let platform = self.target_platform(manual.platform)?;
        let mut time_entry = manual.time_entry;
        time_entry.id = None;
        time_entry.hours = round_up_to_increment(time_entry.hours);
        time_entry.status = TimeEntryStatus::Pending;

        let mut entry = BillingEntry::new(platform, time_entry, self.clock.utc_now());
        entry.client = manual.client;
        entry.matter = manual.matter;
        entry.user = manual.user;

        self.entries.insert(&entry).await?;
        info!(entry_id = %entry.id, platform = %platform, "billing entry created");
        Ok(entry)
    }

    /// Replace the time entry of a `pending` entry.
    pub async fn amend(&self, entry_id: &str, time_entry: TimeEntry) -> Result<BillingEntry> {
        let _guard = self.claim(entry_id)?;
        let mut entry = self.load(entry_id).await?;
        if entry.status != BillingStatus::Pending {
            return Err(BillSyncError::InvalidState(format!(
                "only pending entries can be amended; {entry_id} is {}",
                entry.status
            )));
        }
        entry.time_entry = TimeEntry {
            id: None,
            hours: round_up_to_increment(time_entry.hours),
            status: entry.time_entry.status,
            ..time_entry
        };
        entry.updated_at = self.clock.utc_now();
        self.entries.update(&entry).await?;
        Ok(entry)
    }

    /// Approve a `pending` entry. Validation failures leave it `pending`.
    pub async fn approve(&self, entry_id: &str) -> Result<BillingEntry> {
        let _guard = self.claim(entry_id)?;
        let mut entry = self.load(entry_id).await?;
        if entry.status != BillingStatus::Pending {
            return Err(BillSyncError::InvalidState(format!(
                "only pending entries can be approved; {entry_id} is {}",
                entry.status
            )));
        }

        if let Err(err) = self.validate_entry(&entry) {
            warn!(entry_id, error = %err, "approval refused");
            return Err(err);
        }

        entry.transition(BillingStatus::Approved, self.clock.utc_now())?;
        entry.time_entry.advance_status(TimeEntryStatus::Approved)?;
        self.entries.update(&entry).await?;
        info!(entry_id, platform = %entry.platform, "billing entry approved");
        Ok(entry)
    }

    /// Reject an entry. Refused while an attempt for it is in flight; a
    /// scheduled retry observes the rejection and is cancelled.
    pub async fn reject(&self, entry_id: &str) -> Result<BillingEntry> {
        let _guard = self.claim(entry_id)?;
        let mut entry = self.load(entry_id).await?;
        entry.transition(BillingStatus::Rejected, self.clock.utc_now())?;
        entry.time_entry.roll_back_status(TimeEntryStatus::Draft)?;
        entry.sync.retryable = false;
        entry.sync.next_retry_at = None;
        self.entries.update(&entry).await?;
        info!(entry_id, "billing entry rejected");
        Ok(entry)
    }

    /// Put a `failed` entry back to `approved`, optionally with corrections.
    ///
    /// This is a new approval: the attempt counter starts over.
    pub async fn resubmit(
        &self,
        entry_id: &str,
        corrected: Option<TimeEntry>,
    ) -> Result<BillingEntry> {
        let _guard = self.claim(entry_id)?;
        let mut entry = self.load(entry_id).await?;
        if entry.status != BillingStatus::Failed {
            return Err(BillSyncError::InvalidState(format!(
                "only failed entries can be resubmitted; {entry_id} is {}",
                entry.status
            )));
        }
        if let Some(corrected) = corrected {
            entry.time_entry = TimeEntry {
                id: None,
                hours: round_up_to_increment(corrected.hours),
                status: entry.time_entry.status,
                ..corrected
            };
        }
        self.validate_entry(&entry)?;

        entry.transition(BillingStatus::Approved, self.clock.utc_now())?;
        entry.sync.attempts = 0;
        entry.sync.retryable = false;
        entry.sync.next_retry_at = None;
        entry.sync.last_error = None;
        self.entries.update(&entry).await?;
        info!(entry_id, "billing entry resubmitted");
        Ok(entry)
    }

    // ---------------------------------------------------------------------
    // Synchronization
    // ---------------------------------------------------------------------

    /// Push one `approved` entry now.
    pub async fn sync_entry(&self, entry_id: &str) -> Result<SyncOutcome> {
        let Some(_guard) = self.in_flight.try_acquire(entry_id) else {
            return Ok(SyncOutcome::AlreadyInFlight);
        };
        let entry = self.load(entry_id).await?;
        if entry.status != BillingStatus::Approved {
            return Err(BillSyncError::InvalidState(format!(
                "only approved entries can be synced; {entry_id} is {}",
                entry.status
            )));
        }
        self.attempt(entry).await
    }

    /// Retry a failed entry immediately, ignoring its schedule.
    ///
    /// Concurrent calls for the same entry issue one vendor call; the others
    /// return [`SyncOutcome::AlreadyInFlight`].
    pub async fn retry(&self, entry_id: &str) -> Result<SyncOutcome> {
        let Some(_guard) = self.in_flight.try_acquire(entry_id) else {
            debug!(entry_id, "retry skipped; attempt already in flight");
            return Ok(SyncOutcome::AlreadyInFlight);
        };
        let entry = self.load(entry_id).await?;
        match entry.status {
            BillingStatus::Failed if entry.sync.retryable => self.attempt(entry).await,
            BillingStatus::Failed => Err(BillSyncError::InvalidState(format!(
                "entry {entry_id} failed permanently; correct and resubmit it"
            ))),
            BillingStatus::Rejected => Ok(SyncOutcome::Cancelled),
            other => Err(BillSyncError::InvalidState(format!(
                "only failed entries can be retried; {entry_id} is {other}"
            ))),
        }
    }

    /// Push every `approved` entry for a platform, one at a time.
    ///
    /// A single entry's failure never stops the run.
    pub async fn sync_all(&self, platform: Platform) -> Result<SyncRunSummary> {
        self.adapter(platform)?;
        let approved = self.entries.list_by_status(Some(platform), BillingStatus::Approved).await?;
        let mut summary = SyncRunSummary::default();

        for entry in approved {
            let outcome = self.attempt_claimed(entry).await;
            summary.record(&outcome);
        }

        info!(
            platform = %platform,
            synced = summary.synced_count,
            errors = summary.error_count,
            deferred = summary.deferred_count,
            skipped = summary.skipped_count,
            "sync run complete"
        );
        Ok(summary)
    }

    /// Retry every failed entry whose scheduled time has passed.
    pub async fn process_due_retries(&self) -> Result<SyncRunSummary> {
        let now = self.clock.utc_now();
        let mut due: Vec<_> = self
            .entries
            .list_by_status(None, BillingStatus::Failed)
            .await?
            .into_iter()
            .filter(|entry| entry.is_retry_due(now) && self.adapters.contains_key(&entry.platform))
            .collect();
        due.sort_by_key(|entry| entry.sync.next_retry_at);

        let mut summary = SyncRunSummary::default();
        for entry in due {
            let outcome = self.attempt_claimed(entry).await;
            summary.record(&outcome);
        }
        if summary.total_processed > 0 || summary.deferred_count > 0 {
            info!(
                synced = summary.synced_count,
                errors = summary.error_count,
                deferred = summary.deferred_count,
                "retry sweep complete"
            );
        }
        Ok(summary)
    }

    async fn attempt_claimed(&self, entry: BillingEntry) -> SyncOutcome {
        let Some(_guard) = self.in_flight.try_acquire(&entry.id) else {
            return SyncOutcome::AlreadyInFlight;
        };
        let entry_id = entry.id.clone();
        match self.attempt(entry).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(entry_id = %entry_id, error = %err, "sync attempt aborted");
                SyncOutcome::Failed {
                    kind: PlatformErrorKind::Unexpected,
                    retryable: false,
                    message: err.to_string(),
                }
            }
        }
    }

    /// One network attempt. The caller holds the entry's in-flight claim.
    async fn attempt(&self, entry: BillingEntry) -> Result<SyncOutcome> {
        let platform = entry.platform;
        let adapter = self.adapter(platform)?;

        if !self.health.is_available(platform) {
            debug!(entry_id = %entry.id, platform = %platform, "platform gated; deferring");
            return Ok(SyncOutcome::Deferred { reason: format!("{platform} is unavailable") });
        }

        let permits = self.permits(platform)?;
        let _permit = permits
            .acquire()
            .await
            .map_err(|_| BillSyncError::Internal(format!("{platform} permit pool closed")))?;

        // Last check before the call: the entry may have been rejected since
        // it was selected.
        let mut entry = self.load(&entry.id).await?;
        let now = self.clock.utc_now();
        match entry.status {
            BillingStatus::Rejected => {
                info!(entry_id = %entry.id, "attempt cancelled; entry was rejected");
                return Ok(SyncOutcome::Cancelled);
            }
            BillingStatus::Approved => {}
            BillingStatus::Failed => {
                let approved_at = entry.approved_at;
                entry.transition(BillingStatus::Approved, now)?;
                entry.approved_at = approved_at.or(entry.approved_at);
            }
            other => {
                return Err(BillSyncError::InvalidState(format!(
                    "entry {} cannot be synced from {other}",
                    entry.id
                )))
            }
        }

        entry.sync.attempts += 1;
        entry.sync.last_attempt_at = Some(now);
        entry.sync.next_retry_at = None;
        self.entries.update(&entry).await?;

        debug!(entry_id = %entry.id, platform = %platform, attempt = entry.sync.attempts, "pushing entry");
        match self.push(&adapter, &mut entry).await {
            Ok(remote) => self.record_success(entry, remote).await,
            Err(err) => self.record_failure(entry, err).await,
        }
    }

    async fn push(
        &self,
        adapter: &Arc<dyn PlatformAdapter>,
        entry: &mut BillingEntry,
    ) -> std::result::Result<TimeEntry, PlatformError> {
        if entry.sync.create_uncertain {
            if let Some(found) = self.find_stamped(adapter, entry).await? {
                info!(entry_id = %entry.id, "found vendor copy created by an earlier attempt");
                return Ok(found);
            }
        }

        let mut outgoing = entry.time_entry.clone();
        outgoing.metadata.insert(BILLING_ENTRY_STAMP_KEY.to_string(), json!(entry.id));
        let result = self
            .call(adapter, |token| {
                let adapter = Arc::clone(adapter);
                let outgoing = outgoing.clone();
                async move { adapter.create_time_entry(&token, &outgoing).await }
            })
            .await;
        // Only a definite answer from the vendor settles whether a copy exists.
        entry.sync.create_uncertain = matches!(&result, Err(err) if outcome_unknown(err));
        result
    }

    /// Look for a vendor entry carrying this entry's stamp.
    async fn find_stamped(
        &self,
        adapter: &Arc<dyn PlatformAdapter>,
        entry: &BillingEntry,
    ) -> std::result::Result<Option<TimeEntry>, PlatformError> {
        let date = entry.time_entry.date;
        let mut filter = TimeEntryFilter::default()
            .between(date, date)
            .with_page(PageRequest::new(MAX_PAGE_LIMIT, 0));
        if !entry.time_entry.client_id.is_empty() {
            filter = filter.for_client(entry.time_entry.client_id.clone());
        }
        if let Some(matter_id) = &entry.time_entry.matter_id {
            filter = filter.for_matter(matter_id.clone());
        }

        let candidates = self
            .call(adapter, |token| {
                let adapter = Arc::clone(adapter);
                let filter = filter.clone();
                async move { adapter.list_time_entries(&token, &filter).await }
            })
            .await?;
        let stamp = json!(entry.id);
        Ok(candidates
            .into_iter()
            .find(|remote| remote.metadata.get(BILLING_ENTRY_STAMP_KEY) == Some(&stamp)))
    }

    async fn record_success(&self, mut entry: BillingEntry, remote: TimeEntry) -> Result<SyncOutcome> {
        let Some(external_id) = remote.id.clone().filter(|id| !id.trim().is_empty()) else {
            let err = PlatformError::unexpected("vendor accepted the entry without returning an id");
            return self.record_failure(entry, err).await;
        };

        let now = self.clock.utc_now();
        entry.transition(BillingStatus::Synced, now)?;
        entry.external_id = Some(external_id.clone());
        entry.time_entry.id = Some(external_id.clone());
        entry.time_entry.metadata.insert(BILLING_ENTRY_STAMP_KEY.to_string(), json!(entry.id));
        entry.sync.retryable = false;
        entry.sync.next_retry_at = None;
        entry.sync.last_error = None;
        entry.sync.remote_updated_at = remote.last_modified;
        entry.sync.remote_hash = Some(content_hash(&remote));
        entry.sync.create_uncertain = false;
        self.entries.update(&entry).await?;

        info!(
            entry_id = %entry.id,
            platform = %entry.platform,
            external_id = %external_id,
            attempts = entry.sync.attempts,
            "billing entry synced"
        );
        Ok(SyncOutcome::Synced { external_id })
    }

    async fn record_failure(&self, mut entry: BillingEntry, err: PlatformError) -> Result<SyncOutcome> {
        let now = self.clock.utc_now();
        let decision = self.config.retry.decide(&err, entry.sync.attempts, now);

        entry.transition(BillingStatus::Failed, now)?;
        entry.sync.retryable = decision.retryable;
        entry.sync.next_retry_at = decision.next_retry_at;
        entry.sync.last_error = Some(SyncFailure {
            kind: err.kind,
            message: err.message.chars().take(MAX_ERROR_MESSAGE_LEN).collect(),
            status: err.status,
            occurred_at: now,
        });
        self.entries.update(&entry).await?;

        if decision.retryable {
            warn!(
                entry_id = %entry.id,
                platform = %entry.platform,
                error = %err,
                attempts = entry.sync.attempts,
                next_retry_at = ?decision.next_retry_at,
                "sync failed; retry scheduled"
            );
        } else {
            error!(
                entry_id = %entry.id,
                platform = %entry.platform,
                error = %err,
                attempts = entry.sync.attempts,
                "sync failed permanently"
            );
        }
        Ok(SyncOutcome::Failed { kind: err.kind, retryable: decision.retryable, message: err.message })
    }

    /// Run a vendor call with a lent token and the call deadline. A 401
    /// triggers one refresh and one repeat; a second 401 invalidates the
    /// platform's credentials.
    async fn call<T, F, Fut>(
        &self,
        adapter: &Arc<dyn PlatformAdapter>,
        op: F,
    ) -> std::result::Result<T, PlatformError>
    where
        F: Fn(AccessToken) -> Fut + Send + Sync,
        Fut: Future<Output = ApiResponse<T>> + Send,
        T: Send,
    {
        let token = self.auth.access_token(adapter.as_ref()).await?;
        match self.timed(op(token.clone())).await {
            Err(err) if err.kind == PlatformErrorKind::Authentication => {
                warn!(platform = %adapter.platform(), "vendor rejected credentials; refreshing once");
                let refreshed = self.auth.handle_unauthorized(adapter.as_ref(), &token).await?;
                let retried = self.timed(op(refreshed)).await;
                if let Err(err) = &retried {
                    if err.kind == PlatformErrorKind::Authentication {
                        self.auth.invalidate(adapter.platform(), &err.message).await;
                    }
                }
                retried
            }
            other => other,
        }
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = ApiResponse<T>> + Send,
    ) -> std::result::Result<T, PlatformError> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(response) => response.into_result(),
            Err(_) => Err(PlatformError::timeout(format!(
                "no response within {}s",
                self.config.call_timeout.as_secs_f64()
            ))),
        }
    }

    // ---------------------------------------------------------------------
    // Conflicts
    // ---------------------------------------------------------------------

    /// Compare a synced entry with its vendor copy and record any divergence.
    ///
    /// Returns the conflict, resolved or pending, or `None` when the copies
    /// agree. An open conflict for the entry is returned as is.
    pub async fn reconcile_entry(&self, entry_id: &str) -> Result<Option<SyncConflict>> {
        let _guard = self.claim(entry_id)?;
        let mut entry = self.load(entry_id).await?;
        let external_id = match (&entry.status, &entry.external_id) {
            (BillingStatus::Synced, Some(id)) => id.clone(),
            _ => {
                return Err(BillSyncError::InvalidState(format!(
                    "only synced entries can be reconciled; {entry_id} is {}",
                    entry.status
                )))
            }
        };

        if let Some(open) = self
            .conflicts
            .list_for_entry(entry_id)
            .await?
            .into_iter()
            .find(SyncConflict::is_open)
        {
            return Ok(Some(open));
        }

        let adapter = self.adapter(entry.platform)?;
        if !self.health.is_available(entry.platform) {
            return Err(BillSyncError::Network(format!("{} is unavailable", entry.platform)));
        }
        let remote = self.fetch_remote(&adapter, &external_id).await?;

        let Some(reason) = self.resolver.detect(&entry, &remote) else {
            return Ok(None);
        };

        let now = self.clock.utc_now();
        let resolution = self.resolver.resolve(
            ConflictSide::new(&entry.time_entry, Some(entry.updated_at)),
            ConflictSide::new(&remote, remote.last_modified),
        );
        let mut conflict = SyncConflict::new(
            entry_id,
            entry.platform,
            external_id,
            entry.owner_id().map(str::to_string),
            entry.time_entry.clone(),
            remote.clone(),
            reason,
            now,
        );
        conflict.differing_fields = resolution.differing_fields;

        match resolution.outcome {
            ResolutionOutcome::AutoMerged => {
                if let Some(merged) = resolution.merged {
                    entry.time_entry = merged;
                }
                self.record_remote(&mut entry, &remote, now);
                self.entries.update(&entry).await?;
                conflict.resolve(ResolutionOutcome::AutoMerged, now);
                self.conflicts.save(&conflict).await?;
                info!(entry_id, conflict_id = %conflict.id, "non-substantive divergence merged");
            }
            ResolutionOutcome::PendingManual => {
                self.conflicts.save(&conflict).await?;
                warn!(
                    entry_id,
                    conflict_id = %conflict.id,
                    reason = %reason,
                    fields = ?conflict.differing_fields,
                    "conflict needs manual resolution"
                );
            }
            outcome @ (ResolutionOutcome::LocalWins | ResolutionOutcome::RemoteWins) => {
                self.conflicts.save(&conflict).await?;
                self.apply_resolution(&adapter, &mut entry, &mut conflict, outcome).await?;
            }
        }
        Ok(Some(conflict))
    }

    /// Open conflicts owned by a user
    pub async fn list_conflicts(&self, user_id: &str) -> Result<Vec<SyncConflict>> {
        let mut open: Vec<_> = self
            .conflicts
            .list_for_user(user_id)
            .await?
            .into_iter()
            .filter(SyncConflict::is_open)
            .collect();
        open.sort_by_key(|c| c.detected_at);
        Ok(open)
    }

    /// Settle an open conflict by hand.
    ///
    /// `LocalWins` issues exactly one update; `RemoteWins` exactly one read.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        outcome: ResolutionOutcome,
    ) -> Result<SyncConflict> {
        if !matches!(outcome, ResolutionOutcome::LocalWins | ResolutionOutcome::RemoteWins) {
            return Err(BillSyncError::InvalidInput(format!(
                "conflicts are resolved as local-wins or remote-wins, not {outcome}"
            )));
        }

        let mut conflict = self
            .conflicts
            .get(conflict_id)
            .await?
            .ok_or_else(|| BillSyncError::NotFound(format!("conflict {conflict_id}")))?;
        if !conflict.is_open() {
            return Err(BillSyncError::InvalidState(format!(
                "conflict {conflict_id} is already {}",
                conflict.outcome
            )));
        }

        let _guard = self.claim(&conflict.entry_id)?;
        let mut entry = self.load(&conflict.entry_id).await?;
        let adapter = self.adapter(entry.platform)?;
        self.apply_resolution(&adapter, &mut entry, &mut conflict, outcome).await?;
        Ok(conflict)
    }

    async fn apply_resolution(
        &self,
        adapter: &Arc<dyn PlatformAdapter>,
        entry: &mut BillingEntry,
        conflict: &mut SyncConflict,
        outcome: ResolutionOutcome,
    ) -> Result<()> {
        let external_id = conflict.external_id.clone();
        let remote = match outcome {
            ResolutionOutcome::LocalWins => {
                let local = entry.time_entry.clone();
                let pushed = self
                    .call(adapter, |token| {
                        let adapter = Arc::clone(adapter);
                        let local = local.clone();
                        let external_id = external_id.clone();
                        async move { adapter.update_time_entry(&token, &external_id, &local).await }
                    })
                    .await;
                match pushed {
                    Ok(remote) => remote,
                    Err(err) if err.kind == PlatformErrorKind::Conflict => {
                        conflict.reason = billsync_domain::ConflictReason::RemoteRejectedWrite;
                        self.conflicts.save(conflict).await?;
                        warn!(conflict_id = %conflict.id, error = %err, "vendor refused local copy");
                        return Err(err.into());
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            ResolutionOutcome::RemoteWins => {
                let remote = self.fetch_remote(adapter, &external_id).await?;
                entry.time_entry = TimeEntry { id: Some(external_id.clone()), ..remote.clone() };
                remote
            }
            other => {
                return Err(BillSyncError::InvalidInput(format!("cannot apply {other}")));
            }
        };

        let now = self.clock.utc_now();
        self.record_remote(entry, &remote, now);
        self.entries.update(entry).await?;
        conflict.resolve(outcome, now);
        self.conflicts.save(conflict).await?;
        info!(conflict_id = %conflict.id, entry_id = %entry.id, outcome = %outcome, "conflict resolved");
        Ok(())
    }

    async fn fetch_remote(
        &self,
        adapter: &Arc<dyn PlatformAdapter>,
        external_id: &str,
    ) -> Result<TimeEntry> {
        let remote = self
            .call(adapter, |token| {
                let adapter = Arc::clone(adapter);
                let external_id = external_id.to_string();
                async move { adapter.get_time_entry(&token, &external_id).await }
            })
            .await?;
        Ok(remote)
    }

    fn record_remote(&self, entry: &mut BillingEntry, remote: &TimeEntry, now: DateTime<Utc>) {
        entry.sync.remote_updated_at = remote.last_modified;
        entry.sync.remote_hash = Some(content_hash(remote));
        entry.updated_at = now;
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub async fn get_entry(&self, entry_id: &str) -> Result<BillingEntry> {
        self.load(entry_id).await
    }

    /// Per-user counts by synchronization state
    pub async fn get_sync_stats(&self, user_id: &str) -> Result<SyncStats> {
        let entries = self.entries.list_by_user(user_id).await?;
        let mut stats = SyncStats { user_id: user_id.to_string(), ..SyncStats::default() };

        for entry in &entries {
            match entry.status {
                BillingStatus::Pending => stats.pending += 1,
                BillingStatus::Approved => stats.approved += 1,
                BillingStatus::Synced => stats.synced += 1,
                BillingStatus::Failed if entry.sync.retryable => stats.failed_retryable += 1,
                BillingStatus::Failed => stats.failed_permanent += 1,
                BillingStatus::Rejected => stats.rejected += 1,
            }
            stats.last_synced_at = stats.last_synced_at.max(entry.synced_at);
        }

        let open = self.conflicts.list_for_user(user_id).await?;
        stats.open_conflicts =
            u32::try_from(open.iter().filter(|c| c.is_open()).count()).unwrap_or(u32::MAX);
        Ok(stats)
    }

    /// Attempts used, attempts left and the next scheduled retry
    pub async fn retry_status(&self, entry_id: &str) -> Result<RetryStatus> {
        let entry = self.load(entry_id).await?;
        let max_attempts = self.config.retry.max_attempts();
        let retryable = entry.status == BillingStatus::Failed && entry.sync.retryable;
        Ok(RetryStatus {
            entry_id: entry.id,
            status: entry.status,
            attempts: entry.sync.attempts,
            max_attempts,
            remaining_attempts: if retryable {
                max_attempts.saturating_sub(entry.sync.attempts)
            } else {
                0
            },
            retryable,
            next_retry_at: entry.sync.next_retry_at,
            last_error: entry.sync.last_error,
        })
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn target_platform(&self, requested: Option<Platform>) -> Result<Platform> {
        let platform = requested
            .or(self.config.default_platform)
            .or_else(|| match self.adapters.len() {
                1 => self.adapters.keys().next().copied(),
                _ => None,
            })
            .ok_or_else(|| {
                BillSyncError::InvalidInput("no platform given and no default configured".into())
            })?;
        self.adapter(platform)?;
        Ok(platform)
    }

    fn validate_entry(&self, entry: &BillingEntry) -> Result<()> {
        let adapter = self.adapter(entry.platform)?;
        adapter.validate_time_entry(&entry.time_entry)?;

        if let Some(client) = &entry.client {
            client.validate()?;
        }
        if let Some(matter) = &entry.matter {
            matter.validate()?;
            if matter.client_id != entry.time_entry.client_id {
                return Err(BillSyncError::Validation {
                    field: "matter_id".into(),
                    reason: format!(
                        "matter belongs to client {}, not {}",
                        matter.client_id, entry.time_entry.client_id
                    ),
                });
            }
        }
        if let Some(user) = &entry.user {
            user.validate()?;
        }
        Ok(())
    }

    fn claim(&self, entry_id: &str) -> Result<crate::sync::in_flight::InFlightGuard<'_>> {
        self.in_flight
            .try_acquire(entry_id)
            .ok_or_else(|| BillSyncError::AlreadyInFlight(entry_id.to_string()))
    }

    fn permits(&self, platform: Platform) -> Result<Arc<Semaphore>> {
        self.permits
            .get(&platform)
            .cloned()
            .ok_or_else(|| BillSyncError::Config(format!("no adapter registered for {platform}")))
    }

    async fn load(&self, entry_id: &str) -> Result<BillingEntry> {
        self.entries
            .get(entry_id)
            .await?
            .ok_or_else(|| BillSyncError::NotFound(format!("billing entry {entry_id}")))
    }
}

/// Failures after which the vendor may or may not have stored the write.
fn outcome_unknown(err: &PlatformError) -> bool {
    matches!(err.kind, PlatformErrorKind::Timeout | PlatformErrorKind::Network)
}
