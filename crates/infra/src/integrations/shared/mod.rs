//! Helpers shared by the vendor adapters
//!
//! Each adapter implements [`billsync_core::PlatformAdapter`] itself and
//! composes these free functions and types for the parts vendors have in
//! common.

pub mod dates;
pub mod envelope;
pub mod oauth;
pub mod passthrough;
pub mod query;
pub mod transport;

use billsync_common::lenient;
use billsync_domain::{AccessToken, ApiResponse, PageRequest, Pagination, PlatformError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use dates::DateStyle;
pub use envelope::{decode, decode_all, list_payload, single_payload, RawPage};
pub use passthrough::{absorb_extra, emit_extra, Passthrough, PASSTHROUGH_KEY};
pub use query::{FilterDialect, QueryParams};
pub use transport::{AuthStyle, RestTransport};

/// Nested `{"id": ...}` reference used by vendors that link records by object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
}

impl IdRef {
    pub fn to(id: Option<&str>) -> Option<Self> {
        id.map(|id| Self { id: id.to_string() })
    }

    pub fn id(reference: Option<&Self>) -> Option<String> {
        reference.map(|r| r.id.clone()).filter(|id| !id.is_empty())
    }
}

/// `collection/id`, refusing ids that would escape the resource path
pub fn resource_path(collection: &str, id: &str) -> Result<String, PlatformError> {
    let id = id.trim();
    if id.is_empty() || id.contains(['/', '?', '#']) || id == ".." {
        return Err(PlatformError::validation("id", format!("'{id}' is not a valid record id")));
    }
    Ok(format!("{collection}/{id}"))
}

/// Decode a list body into canonical entities with pagination attached.
pub fn decode_page<W, T>(
    body: Value,
    page: PageRequest,
    what: &str,
    map: impl Fn(W) -> T,
) -> ApiResponse<Vec<T>>
where
    W: DeserializeOwned,
{
    let decoded = list_payload(body).and_then(|raw| {
        let total = raw.total;
        decode_all::<W>(raw.records, what).map(|rows| (rows, total))
    });
    match decoded {
        Ok((rows, total)) => {
            let items: Vec<T> = rows.into_iter().map(map).collect();
            let pagination = Pagination::for_page(page, items.len(), total);
            ApiResponse::paged(items, pagination)
        }
        Err(error) => ApiResponse::failure(error),
    }
}

/// Decode a single-record body into a canonical entity.
pub fn decode_one<W, T>(body: Value, what: &str, map: impl FnOnce(W) -> T) -> Result<T, PlatformError>
where
    W: DeserializeOwned,
{
    single_payload(body).and_then(|record| decode::<W>(record, what)).map(map)
}

/// GET a listing and decode it as one page.
pub async fn fetch_page<W, T>(
    transport: &RestTransport,
    token: &AccessToken,
    path: &str,
    params: &QueryParams,
    page: PageRequest,
    what: &str,
    map: impl Fn(W) -> T,
) -> ApiResponse<Vec<T>>
where
    W: DeserializeOwned,
{
    match transport.get(token, path, params).await {
        Ok(body) => decode_page(body, page, what, map),
        Err(error) => ApiResponse::failure(error),
    }
}

/// GET `collection/id` and decode the record.
pub async fn fetch_record<W, T>(
    transport: &RestTransport,
    token: &AccessToken,
    collection: &str,
    id: &str,
    what: &str,
    map: impl FnOnce(W) -> T,
) -> Result<T, PlatformError>
where
    W: DeserializeOwned,
{
    let path = resource_path(collection, id)?;
    let body = transport.get(token, &path, &QueryParams::new()).await?;
    decode_one(body, what, map)
}

/// DELETE `collection/id`
pub async fn delete_record(
    transport: &RestTransport,
    token: &AccessToken,
    collection: &str,
    id: &str,
) -> Result<(), PlatformError> {
    let path = resource_path(collection, id)?;
    transport.delete(token, &path).await
}
