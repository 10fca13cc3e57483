//! Conversions from external infrastructure errors into domain errors.

use billsync_domain::BillSyncError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub BillSyncError);

impl From<InfraError> for BillSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<BillSyncError> for InfraError {
    fn from(value: BillSyncError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoBillSyncError {
    fn into_billsync(self) -> BillSyncError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → BillSyncError */
/* -------------------------------------------------------------------------- */

impl IntoBillSyncError for HttpError {
    fn into_billsync(self) -> BillSyncError {
        if self.is_builder() {
            return BillSyncError::Config(format!("invalid HTTP client setup: {self}"));
        }

        if self.is_timeout() {
            return BillSyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return BillSyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => BillSyncError::Auth(message),
                404 => BillSyncError::NotFound(message),
                409 => BillSyncError::Conflict(message),
                400..=499 => BillSyncError::InvalidInput(message),
                _ => BillSyncError::Network(message),
            };
        }

        BillSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_billsync())
    }
}

/* -------------------------------------------------------------------------- */
/* configuration parsing → BillSyncError */
/* -------------------------------------------------------------------------- */

impl IntoBillSyncError for toml::de::Error {
    fn into_billsync(self) -> BillSyncError {
        BillSyncError::Config(format!("Invalid TOML format: {}", self.message()))
    }
}

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        InfraError(value.into_billsync())
    }
}

impl IntoBillSyncError for serde_json::Error {
    fn into_billsync(self) -> BillSyncError {
        if self.is_io() {
            return BillSyncError::Storage(format!("failed to read JSON: {self}"));
        }
        BillSyncError::Config(format!(
            "Invalid JSON format at line {} column {}: {self}",
            self.line(),
            self.column()
        ))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(value.into_billsync())
    }
}

impl IntoBillSyncError for std::io::Error {
    fn into_billsync(self) -> BillSyncError {
        match self.kind() {
            std::io::ErrorKind::NotFound => BillSyncError::NotFound(self.to_string()),
            _ => BillSyncError::Storage(self.to_string()),
        }
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(value.into_billsync())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
