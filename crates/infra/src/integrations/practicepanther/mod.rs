//! PracticePanther integration
//!
//! OAuth bearer authentication, bare JSON records and OData-style `$top` /
//! `$skip` paging.

mod adapter;
pub mod models;

pub use adapter::{PracticePantherAdapter, DEFAULT_BASE_URL};
