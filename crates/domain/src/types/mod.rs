//! Domain types and models
//!
//! - [`entities`]: canonical practice-management records
//! - [`billing`]: billing entries and their synchronization state
//! - [`conflict`]: divergence between local and remote copies
//! - [`credential`]: platform credentials and authentication state
//! - [`envelope`]: adapter response envelope, list filters, bulk summaries

pub mod billing;
pub mod conflict;
pub mod credential;
pub mod entities;
pub mod envelope;
pub mod platform;

pub use billing::{
    BillingCandidate, BillingEntry, BillingStatus, OriginRef, RetryStatus, SyncFailure,
    SyncMetadata, SyncOutcome, SyncRunSummary, SyncStats,
};
pub use conflict::{ConflictPolicy, ConflictReason, ResolutionOutcome, SyncConflict};
pub use credential::{
    AccessToken, AuthGrant, AuthState, CredentialMaterial, PlatformCredential,
};
pub use entities::{
    Client, ClientStatus, Matter, MatterStatus, Metadata, TimeEntry, TimeEntryStatus, User,
};
pub use envelope::{
    ApiResponse, BulkItemError, BulkSyncSummary, PageRequest, Pagination, TimeEntryFilter,
};
pub use platform::{AuthScheme, Platform};
