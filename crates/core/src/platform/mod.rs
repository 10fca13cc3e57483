//! Platform adapter contract

pub mod ports;

pub use ports::PlatformAdapter;
