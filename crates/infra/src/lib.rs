//! # BillSync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - The HTTP client and error classification shared by every vendor
//! - Vendor adapters for Clio, PracticePanther and Rocket Matter
//! - The health monitor and retry worker
//! - In-memory repositories, configuration loading and logging setup
//! - [`runtime::SyncRuntime`], which wires all of the above together
//!
//! ## Architecture
//! - Implements traits defined in `billsync-core`
//! - Depends on `billsync-common`, `billsync-domain` and `billsync-core`
//! - Contains all "impure" code (network I/O, environment, background tasks)

pub mod config;
pub mod errors;
pub mod health;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod runtime;
pub mod store;
pub mod sync;

// Re-export commonly used items
pub use health::{HealthMonitor, HealthRegistry};
pub use http::HttpClient;
pub use integrations::{
    build_adapter, build_adapters, ClioAdapter, PracticePantherAdapter, RocketMatterAdapter,
};
pub use runtime::{RuntimeDeps, SyncRuntime};
pub use store::{
    InMemoryBillingEntryRepository, InMemoryConflictRepository, InMemoryCredentialRepository,
};
