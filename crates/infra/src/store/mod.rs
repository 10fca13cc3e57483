//! Repository implementations for the core storage ports

pub mod memory;

pub use memory::{
    InMemoryBillingEntryRepository, InMemoryConflictRepository, InMemoryCredentialRepository,
};
