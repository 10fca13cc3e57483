//! Credential ownership and token lifecycle

pub mod manager;
pub mod ports;

pub use manager::AuthManager;
pub use ports::CredentialRepository;
