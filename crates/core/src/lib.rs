//! # BillSync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The platform adapter contract every vendor integration implements
//! - Credential ownership and the authentication lifecycle
//! - The sync engine: billing entry lifecycle, retries and reconciliation
//! - Conflict detection and resolution
//!
//! ## Architecture Principles
//! - Only depends on `billsync-common` and `billsync-domain`
//! - No database, HTTP, or vendor code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod auth;
pub mod conflict;
pub mod platform;
pub mod sync;

// Re-export specific items to avoid ambiguity
pub use auth::{AuthManager, CredentialRepository};
pub use conflict::{content_hash, ConflictResolver, ConflictSide, Resolution};
pub use platform::PlatformAdapter;
pub use sync::{
    AlwaysAvailable, BillingEntryRepository, ConflictRepository, HealthGate, ManualEntry,
    RetryPolicy, SyncEngine, SyncEngineConfig,
};
