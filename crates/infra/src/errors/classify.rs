//! HTTP failure classification
//!
//! Every vendor adapter reports failures through the same taxonomy. Status
//! codes are mapped by [`PlatformError::from_status`]; this module adds what
//! only the wire can tell: transport failures, `Retry-After` hints and the
//! vendor's own error message.

use std::time::Duration;

use billsync_domain::{PlatformError, PlatformErrorKind};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Response;
use serde_json::Value;

/// Longest vendor message kept on an error
const MAX_VENDOR_MESSAGE_LEN: usize = 300;

/// Classify a failure that produced no HTTP response.
pub fn classify_transport(err: &reqwest::Error) -> PlatformError {
    if err.is_timeout() {
        return PlatformError::timeout("request timed out");
    }

    if err.is_connect() {
        return PlatformError::network(format!("connection failed: {}", root_cause(err)));
    }

    if err.is_decode() {
        return PlatformError::unexpected(format!("undecodable response body: {err}"));
    }

    if let Some(status) = err.status() {
        return PlatformError::from_status(status.as_u16(), err.to_string(), None);
    }

    if err.is_request() || err.is_body() {
        return PlatformError::network(err.to_string());
    }

    PlatformError::unexpected(err.to_string())
}

/// Classify a non-success response, reading its body for the vendor message.
pub async fn classify_response(response: Response) -> PlatformError {
    let status = response.status();
    let retry_after = retry_after_header(response.headers(), Utc::now());
    let body = response.text().await.unwrap_or_default();
    let reason = status.canonical_reason().unwrap_or("unknown status");

    let (message, field) = match serde_json::from_str::<Value>(&body) {
        Ok(value) => (vendor_message(&value), vendor_field(&value)),
        Err(_) => (non_blank(&body).map(str::to_string), None),
    };
    let message = message
        .map(|m| format!("HTTP {} {reason}: {}", status.as_u16(), truncate(&m)))
        .unwrap_or_else(|| format!("HTTP {} {reason}", status.as_u16()));

    let mut error = PlatformError::from_status(status.as_u16(), message, retry_after);
    if error.kind == PlatformErrorKind::Validation {
        error.field = field;
    }
    error
}

/// `Retry-After` as delta-seconds or an HTTP date
pub fn retry_after_header(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn vendor_message(body: &Value) -> Option<String> {
    let candidates = [
        body.pointer("/error/message"),
        body.pointer("/error_description"),
        body.pointer("/errors/0/message"),
        body.pointer("/message"),
        body.pointer("/Message"),
        body.pointer("/error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().and_then(non_blank).map(str::to_string))
}

fn vendor_field(body: &Value) -> Option<String> {
    [body.pointer("/error/field"), body.pointer("/errors/0/field"), body.pointer("/field")]
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().and_then(non_blank).map(str::to_string))
}

fn non_blank(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_VENDOR_MESSAGE_LEN {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(MAX_VENDOR_MESSAGE_LEN - 3).collect();
    truncated.push_str("...");
    truncated
}

fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
