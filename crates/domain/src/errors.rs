//! Error types used throughout the application

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_status_conversions;
use crate::validation::ValidationError;

/// Main error type for BillSync
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum BillSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation failed for `{field}`: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Synchronization already in flight for entry {0}")]
    AlreadyInFlight(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Platform error: {0}")]
    Platform(PlatformError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for BillSync operations
pub type Result<T> = std::result::Result<T, BillSyncError>;

impl From<ValidationError> for BillSyncError {
    fn from(err: ValidationError) -> Self {
        Self::Validation { field: err.field, reason: err.reason }
    }
}

impl From<PlatformError> for BillSyncError {
    fn from(err: PlatformError) -> Self {
        match err.kind {
            PlatformErrorKind::Validation => Self::Validation {
                field: err.field.unwrap_or_else(|| "request".to_string()),
                reason: err.message,
            },
            PlatformErrorKind::Conflict => Self::Conflict(err.message),
            _ => Self::Platform(err),
        }
    }
}

/// Failure classes an adapter can report.
///
/// The sync engine is the only component that turns a kind into a retry or
/// terminal decision; adapters just report what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformErrorKind {
    /// 401/403, or credentials rejected during token exchange
    Authentication,
    /// 429; carries a retry-after hint when the vendor sends one
    RateLimit,
    /// 400/422, or rejected locally before any network call
    Validation,
    /// 409, or divergence detected by the conflict resolver
    Conflict,
    /// Connection failures and 5xx responses
    Network,
    /// The call exceeded its deadline
    Timeout,
    /// 404
    NotFound,
    /// Undecodable payloads and statuses outside the known classes
    Unexpected,
}

impl_domain_status_conversions!(PlatformErrorKind {
    Authentication => "authentication_error",
    RateLimit => "rate_limit_error",
    Validation => "validation_error",
    Conflict => "conflict_error",
    Network => "network_error",
    Timeout => "timeout_error",
    NotFound => "not_found",
    Unexpected => "unexpected_response",
});

impl PlatformErrorKind {
    /// Stable machine-readable code
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication_error",
            Self::RateLimit => "rate_limit_error",
            Self::Validation => "validation_error",
            Self::Conflict => "conflict_error",
            Self::Network => "network_error",
            Self::Timeout => "timeout_error",
            Self::NotFound => "not_found",
            Self::Unexpected => "unexpected_response",
        }
    }

    /// Whether a later attempt may succeed without caller intervention
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Timeout)
    }
}

/// Typed failure returned inside the adapter envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct PlatformError {
    pub kind: PlatformErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl PlatformError {
    pub fn new(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), status: None, retry_after_secs: None, field: None }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::Authentication, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let mut err = Self::new(PlatformErrorKind::RateLimit, message);
        err.retry_after_secs = retry_after.map(|d| d.as_secs());
        err
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut err = Self::new(PlatformErrorKind::Validation, reason);
        err.field = Some(field.into());
        err
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::Conflict, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::Timeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::NotFound, message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::Unexpected, message)
    }

    /// Classify an HTTP status the same way for every vendor.
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let kind = match status {
            401 | 403 => PlatformErrorKind::Authentication,
            404 | 410 => PlatformErrorKind::NotFound,
            409 | 412 => PlatformErrorKind::Conflict,
            429 => PlatformErrorKind::RateLimit,
            408 => PlatformErrorKind::Timeout,
            400 | 422 => PlatformErrorKind::Validation,
            500..=599 => PlatformErrorKind::Network,
            _ => PlatformErrorKind::Unexpected,
        };
        let mut err = Self::new(kind, message).with_status(status);
        if kind == PlatformErrorKind::RateLimit {
            err.retry_after_secs = retry_after.map(|d| d.as_secs());
        }
        err
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn code(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_secs.map(Duration::from_secs)
    }
}

impl From<ValidationError> for PlatformError {
    fn from(err: ValidationError) -> Self {
        Self::validation(err.field, err.reason)
    }
}
