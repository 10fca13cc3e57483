//! Rocket Matter integration
//!
//! Tenant-scoped hosts, `X-API-Key` authentication and `{"items", "total"}`
//! list envelopes.

mod adapter;
pub mod models;

pub use adapter::{tenant_base_url, RocketMatterAdapter};
