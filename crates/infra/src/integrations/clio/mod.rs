//! Clio Manage integration
//!
//! OAuth bearer authentication with refresh-token grants, `{"data": ...}`
//! envelopes and ISO dates.

mod adapter;
pub mod models;

pub use adapter::{ClioAdapter, DEFAULT_BASE_URL};
