//! Tracing subscriber setup

use billsync_domain::config::{LogFormat, LoggingConfig};
use billsync_domain::{BillSyncError, Result};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Filter precedence: `RUST_LOG`, then the configured directive, then `info`.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directive)
        .map_err(|e| BillSyncError::Config(format!("invalid log filter '{directive}': {e}")))
}

/// Install the global subscriber.
///
/// # Errors
///
/// `Config` for an unparsable filter, `Internal` if a subscriber is already
/// installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    installed.map_err(|e| BillSyncError::Internal(format!("tracing already initialised: {e}")))
}
