//! Infrastructure error handling
//!
//! - [`conversions`]: third-party errors into [`billsync_domain::BillSyncError`]
//! - [`classify`]: HTTP failures into typed [`billsync_domain::PlatformError`]s

pub mod classify;
pub mod conversions;

pub use classify::{classify_response, classify_transport, retry_after_header};
pub use conversions::InfraError;
