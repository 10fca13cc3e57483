//! Common utility functions
//!
//! - **[`serde`]**: Serialization helpers for config durations and lenient
//!   vendor payloads

pub mod serde;

pub use self::serde::{duration_secs, lenient};
