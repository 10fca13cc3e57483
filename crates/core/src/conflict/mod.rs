//! Divergence detection between local and vendor copies

pub mod resolver;

pub use resolver::{
    content_hash, substantive_differences, ConflictResolver, ConflictSide, Resolution,
    SUBSTANTIVE_FIELDS,
};
