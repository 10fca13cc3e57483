use std::sync::Arc;

use async_trait::async_trait;
use billsync_common::Clock;
use billsync_core::PlatformAdapter;
use billsync_domain::{
    AccessToken, ApiResponse, AuthGrant, Client, CredentialMaterial, Matter, PageRequest,
    Platform, PlatformError, TimeEntry, TimeEntryFilter, User, Validate, ValidationError,
};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

use super::models::{
    activity_from_entry, client_from_contact, clio_matter_from_matter, contact_from_client,
    entry_from_activity, matter_from_clio, user_from_clio, ClioActivity, ClioContact, ClioMatter,
};
use crate::http::HttpClient;
use crate::integrations::shared::oauth::{refresh_grant, token_endpoint};
use crate::integrations::shared::{
    decode_one, delete_record, fetch_page, fetch_record, resource_path, AuthStyle, DateStyle,
    FilterDialect, RestTransport,
};

pub const DEFAULT_BASE_URL: &str = "https://app.clio.com/api/v4";

const ACTIVITIES: &str = "activities";
const CONTACTS: &str = "contacts";
const MATTERS: &str = "matters";
const USERS: &str = "users";

const DIALECT: FilterDialect = FilterDialect {
    date_from: "start_date",
    date_to: "end_date",
    client: "client_id",
    matter: "matter_id",
    user: "user_id",
    limit: "limit",
    offset: "offset",
    date_style: DateStyle::Iso,
};

/// Clio Manage v4 adapter
pub struct ClioAdapter {
    transport: RestTransport,
    token_url: Url,
    clock: Arc<dyn Clock>,
}

impl ClioAdapter {
    pub fn new(http: HttpClient, base_url: Url, clock: Arc<dyn Clock>) -> Result<Self, PlatformError> {
        let token_url = token_endpoint(&base_url)?;
        Ok(Self { transport: RestTransport::new(http, base_url, AuthStyle::Bearer), token_url, clock })
    }

    fn check(&self, entry: &TimeEntry) -> Result<(), PlatformError> {
        self.validate_time_entry(entry).map_err(PlatformError::from)
    }

    /// Clio wraps every write payload in `{"data": ...}`.
    async fn write(
        &self,
        method: Method,
        token: &AccessToken,
        path: &str,
        record: impl serde::Serialize,
    ) -> Result<Value, PlatformError> {
        let record = serde_json::to_value(record)
            .map_err(|err| PlatformError::unexpected(format!("unserializable record: {err}")))?;
        let body = json!({ "data": record });
        self.transport.send_json(method, token, path, &body).await
    }

    async fn save_entry(
        &self,
        token: &AccessToken,
        id: Option<&str>,
        entry: &TimeEntry,
    ) -> Result<TimeEntry, PlatformError> {
        self.check(entry)?;
        let mut activity = activity_from_entry(entry);
        let body = match id {
            Some(id) => {
                let path = resource_path(ACTIVITIES, id)?;
                activity.id = Some(id.to_string());
                self.write(Method::PATCH, token, &path, activity).await?
            }
            None => {
                activity.id = None;
                self.write(Method::POST, token, ACTIVITIES, activity).await?
            }
        };
        decode_one::<ClioActivity, _>(body, "activity", entry_from_activity)
    }

    async fn save_client(&self, token: &AccessToken, client: &Client) -> Result<Client, PlatformError> {
        client.validate()?;
        let mut contact = contact_from_client(client);
        contact.id = None;
        let body = self.write(Method::POST, token, CONTACTS, contact).await?;
        decode_one::<ClioContact, _>(body, "contact", client_from_contact)
    }

    async fn save_matter(&self, token: &AccessToken, matter: &Matter) -> Result<Matter, PlatformError> {
        matter.validate()?;
        let mut record = clio_matter_from_matter(matter);
        record.id = None;
        let body = self.write(Method::POST, token, MATTERS, record).await?;
        decode_one::<ClioMatter, _>(body, "matter", matter_from_clio)
    }
}

#[async_trait]
impl PlatformAdapter for ClioAdapter {
    fn platform(&self) -> Platform {
        Platform::Clio
    }

    fn validate_time_entry(&self, entry: &TimeEntry) -> Result<(), ValidationError> {
        entry.validate()?;
        if !entry.matter_id.as_deref().is_some_and(|matter| !matter.trim().is_empty()) {
            return Err(ValidationError::new("matter_id", "Clio time entries must belong to a matter"));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(platform = "clio"))]
    async fn authenticate(&self, credential: &CredentialMaterial) -> ApiResponse<AuthGrant> {
        let now = self.clock.utc_now();
        ApiResponse::from_result(refresh_grant(self.transport.http(), &self.token_url, credential, now).await)
    }

    #[instrument(skip_all, fields(platform = "clio"))]
    async fn probe(&self, token: &AccessToken) -> ApiResponse<()> {
        let params = vec![("fields", "id".to_string())];
        let result = self.transport.get(token, "users/who_am_i", &params).await;
        debug!(ok = result.is_ok(), "probe finished");
        ApiResponse::from_result(result.map(|_| ()))
    }

    #[instrument(skip_all, fields(platform = "clio"))]
    async fn list_time_entries(
        &self,
        token: &AccessToken,
        filter: &TimeEntryFilter,
    ) -> ApiResponse<Vec<TimeEntry>> {
        let mut params = DIALECT.time_entry_params(filter);
        params.push(("type", "TimeEntry".to_string()));
        fetch_page(&self.transport, token, ACTIVITIES, &params, filter.page, "activity", entry_from_activity).await
    }

    #[instrument(skip(self, token), fields(platform = "clio"))]
    async fn get_time_entry(&self, token: &AccessToken, id: &str) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, ACTIVITIES, id, "activity", entry_from_activity).await,
        )
    }

    #[instrument(skip_all, fields(platform = "clio"))]
    async fn create_time_entry(&self, token: &AccessToken, entry: &TimeEntry) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(self.save_entry(token, None, entry).await)
    }

    #[instrument(skip(self, token, entry), fields(platform = "clio"))]
    async fn update_time_entry(
        &self,
        token: &AccessToken,
        id: &str,
        entry: &TimeEntry,
    ) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(self.save_entry(token, Some(id), entry).await)
    }

    #[instrument(skip(self, token), fields(platform = "clio"))]
    async fn delete_time_entry(&self, token: &AccessToken, id: &str) -> ApiResponse<()> {
        ApiResponse::from_result(delete_record(&self.transport, token, ACTIVITIES, id).await)
    }

    async fn list_clients(&self, token: &AccessToken, page: PageRequest) -> ApiResponse<Vec<Client>> {
        let params = DIALECT.page_params(page);
        fetch_page(&self.transport, token, CONTACTS, &params, page, "contact", client_from_contact).await
    }

    async fn get_client(&self, token: &AccessToken, id: &str) -> ApiResponse<Client> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, CONTACTS, id, "contact", client_from_contact).await,
        )
    }

    async fn create_client(&self, token: &AccessToken, client: &Client) -> ApiResponse<Client> {
        ApiResponse::from_result(self.save_client(token, client).await)
    }

    async fn list_matters(
        &self,
        token: &AccessToken,
        client_id: Option<&str>,
        page: PageRequest,
    ) -> ApiResponse<Vec<Matter>> {
        let params = DIALECT.scoped_page_params(client_id, page);
        fetch_page(&self.transport, token, MATTERS, &params, page, "matter", matter_from_clio).await
    }

    async fn get_matter(&self, token: &AccessToken, id: &str) -> ApiResponse<Matter> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, MATTERS, id, "matter", matter_from_clio).await,
        )
    }

    async fn create_matter(&self, token: &AccessToken, matter: &Matter) -> ApiResponse<Matter> {
        ApiResponse::from_result(self.save_matter(token, matter).await)
    }

    async fn list_users(&self, token: &AccessToken, page: PageRequest) -> ApiResponse<Vec<User>> {
        let params = DIALECT.page_params(page);
        fetch_page(&self.transport, token, USERS, &params, page, "user", user_from_clio).await
    }
}
