//! Resilience primitives shared by retry scheduling and health probing.

pub mod backoff;

pub use backoff::{BackoffError, BackoffPolicy};
