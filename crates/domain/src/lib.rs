//! # BillSync Domain
//!
//! Vendor-neutral billing types shared by every BillSync crate.
//!
//! This crate contains:
//! - Canonical practice-management entities (TimeEntry, Client, Matter, User)
//! - Billing entries, conflicts and credentials tracked by the sync engine
//! - The adapter response envelope and typed platform errors
//! - Configuration structures and entity validation
//!
//! ## Architecture
//! - No dependencies on other BillSync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
pub use validation::{round_up_to_increment, Validate, ValidationError};
