//! Adapter response envelope, list filters and bulk summaries
//!
//! Adapters never raise for expected vendor failures. They return an
//! [`ApiResponse`] with `success: false` and a typed [`PlatformError`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::errors::PlatformError;

/// `{success, data?, error?, pagination?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PlatformError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    pub const fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, pagination: None }
    }

    pub const fn paged(data: T, pagination: Pagination) -> Self {
        Self { success: true, data: Some(data), error: None, pagination: Some(pagination) }
    }

    pub const fn failure(error: PlatformError) -> Self {
        Self { success: false, data: None, error: Some(error), pagination: None }
    }

    pub fn from_result(result: Result<T, PlatformError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failure(error),
        }
    }

    /// Collapse the envelope. A successful response without data is only
    /// valid for `()` payloads, so it is reported as unexpected here.
    pub fn into_result(self) -> Result<T, PlatformError> {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (_, _, Some(error)) => Err(error),
            (true, None, None) => Err(PlatformError::unexpected("successful response without data")),
            (false, _, None) => Err(PlatformError::unexpected("failed response without error")),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            pagination: self.pagination,
        }
    }
}

/// Offset pagination returned with list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub has_more: bool,
}

impl Pagination {
    /// Derive pagination for a page of `returned` rows. Without a vendor
    /// total, a full page is taken to mean more rows may follow.
    pub fn for_page(page: PageRequest, returned: usize, total: Option<u64>) -> Self {
        let returned = u64::try_from(returned).unwrap_or(u64::MAX);
        let has_more = match total {
            Some(total) => u64::from(page.offset) + returned < total,
            None => returned >= u64::from(page.limit),
        };
        Self { limit: page.limit, offset: page.offset, total, has_more }
    }
}

/// Requested page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { limit: DEFAULT_PAGE_LIMIT, offset: 0 }
    }
}

impl PageRequest {
    /// Page with the limit clamped to `1..=MAX_PAGE_LIMIT`
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit: limit.clamp(1, MAX_PAGE_LIMIT), offset }
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self { limit: self.limit, offset: self.offset.saturating_add(self.limit) }
    }
}

/// The four filter dimensions every adapter supports, plus pagination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub page: PageRequest,
}

impl TimeEntryFilter {
    #[must_use]
    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    #[must_use]
    pub fn for_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    #[must_use]
    pub fn for_matter(mut self, matter_id: impl Into<String>) -> Self {
        self.matter_id = Some(matter_id.into());
        self
    }

    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }
}

/// Per-item failure inside a bulk operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    pub error: PlatformError,
}

/// `{created, updated, errors[]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSyncSummary {
    pub created: u32,
    pub updated: u32,
    #[serde(default)]
    pub errors: Vec<BulkItemError>,
}

impl BulkSyncSummary {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PlatformErrorKind;

    #[test]
    fn failure_round_trips_through_result() {
        let response: ApiResponse<String> =
            ApiResponse::failure(PlatformError::rate_limited("slow down", None));
        assert!(!response.success);
        let err = response.into_result().unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::RateLimit);
    }

    #[test]
    fn success_without_data_is_unexpected() {
        let response: ApiResponse<u32> =
            ApiResponse { success: true, data: None, error: None, pagination: None };
        assert_eq!(response.into_result().unwrap_err().kind, PlatformErrorKind::Unexpected);
    }

    #[test]
    fn envelope_serializes_without_empty_fields() {
        let json = serde_json::to_value(ApiResponse::ok(7)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 7 }));
    }

    #[test]
    fn pagination_uses_total_when_known() {
        let page = PageRequest::new(10, 20);
        assert!(Pagination::for_page(page, 10, Some(31)).has_more);
        assert!(!Pagination::for_page(page, 10, Some(30)).has_more);
    }

    #[test]
    fn pagination_guesses_from_full_pages() {
        let page = PageRequest::new(10, 0);
        assert!(Pagination::for_page(page, 10, None).has_more);
        assert!(!Pagination::for_page(page, 4, None).has_more);
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(PageRequest::new(0, 0).limit, 1);
        assert_eq!(PageRequest::new(10_000, 0).limit, crate::constants::MAX_PAGE_LIMIT);
        assert_eq!(PageRequest::new(25, 50).next().offset, 75);
    }
}
