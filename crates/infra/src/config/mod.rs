//! Configuration loading
//!
//! The configuration types live in `billsync_domain::config`; this module
//! finds and assembles them from the environment and config files.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, load_with, probe_config_paths};
