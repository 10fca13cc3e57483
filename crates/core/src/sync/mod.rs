//! Billing entry synchronization

pub mod engine;
pub mod in_flight;
pub mod policy;
pub mod ports;

pub use engine::{ManualEntry, SyncEngine, SyncEngineConfig};
pub use in_flight::{InFlightGuard, InFlightRegistry};
pub use policy::{FailureDecision, RetryPolicy};
pub use ports::{AlwaysAvailable, BillingEntryRepository, ConflictRepository, HealthGate};
