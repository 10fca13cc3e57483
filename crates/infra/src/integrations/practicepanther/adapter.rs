use std::sync::Arc;

use async_trait::async_trait;
use billsync_common::Clock;
use billsync_core::PlatformAdapter;
use billsync_domain::{
    AccessToken, ApiResponse, AuthGrant, Client, CredentialMaterial, Matter, PageRequest,
    Platform, PlatformError, TimeEntry, TimeEntryFilter, User, Validate, ValidationError,
};
use reqwest::Method;
use rust_decimal::Decimal;
use tracing::instrument;
use url::Url;

use super::models::{
    account_from_client, client_from_account, entry_from_panther, matter_from_panther,
    panther_entry_from_entry, panther_matter_from_matter, user_from_panther,
};
use crate::http::HttpClient;
use crate::integrations::shared::oauth::{refresh_grant, token_endpoint};
use crate::integrations::shared::{
    decode_one, delete_record, fetch_page, fetch_record, resource_path, AuthStyle, DateStyle,
    FilterDialect, RestTransport,
};

pub const DEFAULT_BASE_URL: &str = "https://app.practicepanther.com/api/v2";

const TIME_ENTRIES: &str = "timeentries";
const ACCOUNTS: &str = "accounts";
const MATTERS: &str = "matters";
const USERS: &str = "users";

/// PracticePanther refuses entries longer than a day.
const MAX_ENTRY_HOURS: Decimal = Decimal::from_parts(24, 0, 0, false, 0);

const DIALECT: FilterDialect = FilterDialect {
    date_from: "date_from",
    date_to: "date_to",
    client: "account_id",
    matter: "matter_id",
    user: "user_id",
    limit: "$top",
    offset: "$skip",
    date_style: DateStyle::IsoMidnight,
};

/// PracticePanther v2 adapter. Records travel bare, without envelopes.
pub struct PracticePantherAdapter {
    transport: RestTransport,
    token_url: Url,
    clock: Arc<dyn Clock>,
}

impl PracticePantherAdapter {
    pub fn new(http: HttpClient, base_url: Url, clock: Arc<dyn Clock>) -> Result<Self, PlatformError> {
        let token_url = token_endpoint(&base_url)?;
        Ok(Self { transport: RestTransport::new(http, base_url, AuthStyle::Bearer), token_url, clock })
    }

    async fn save_entry(
        &self,
        token: &AccessToken,
        id: Option<&str>,
        entry: &TimeEntry,
    ) -> Result<TimeEntry, PlatformError> {
        self.validate_time_entry(entry)?;
        let mut record = panther_entry_from_entry(entry);
        record.id = id.map(str::to_string);
        let body = serde_json::to_value(&record)
            .map_err(|err| PlatformError::unexpected(format!("unserializable time entry: {err}")))?;

        let response = match id {
            Some(id) => {
                let path = resource_path(TIME_ENTRIES, id)?;
                self.transport.send_json(Method::PUT, token, &path, &body).await?
            }
            None => self.transport.send_json(Method::POST, token, TIME_ENTRIES, &body).await?,
        };
        decode_one(response, "time entry", entry_from_panther)
    }

    async fn save_client(&self, token: &AccessToken, client: &Client) -> Result<Client, PlatformError> {
        client.validate()?;
        let mut account = account_from_client(client);
        account.id = None;
        let body = serde_json::to_value(&account)
            .map_err(|err| PlatformError::unexpected(format!("unserializable account: {err}")))?;
        let response = self.transport.send_json(Method::POST, token, ACCOUNTS, &body).await?;
        decode_one(response, "account", client_from_account)
    }

    async fn save_matter(&self, token: &AccessToken, matter: &Matter) -> Result<Matter, PlatformError> {
        matter.validate()?;
        let mut record = panther_matter_from_matter(matter);
        record.id = None;
        let body = serde_json::to_value(&record)
            .map_err(|err| PlatformError::unexpected(format!("unserializable matter: {err}")))?;
        let response = self.transport.send_json(Method::POST, token, MATTERS, &body).await?;
        decode_one(response, "matter", matter_from_panther)
    }
}

#[async_trait]
impl PlatformAdapter for PracticePantherAdapter {
    fn platform(&self) -> Platform {
        Platform::PracticePanther
    }

    fn validate_time_entry(&self, entry: &TimeEntry) -> Result<(), ValidationError> {
        entry.validate()?;
        if entry.hours > MAX_ENTRY_HOURS {
            return Err(ValidationError::new(
                "hours",
                format!("PracticePanther accepts at most {MAX_ENTRY_HOURS} hours, got {}", entry.hours),
            ));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(platform = "practice_panther"))]
    async fn authenticate(&self, credential: &CredentialMaterial) -> ApiResponse<AuthGrant> {
        let now = self.clock.utc_now();
        ApiResponse::from_result(refresh_grant(self.transport.http(), &self.token_url, credential, now).await)
    }

    #[instrument(skip_all, fields(platform = "practice_panther"))]
    async fn probe(&self, token: &AccessToken) -> ApiResponse<()> {
        ApiResponse::from_result(self.transport.get(token, "users/me", &Vec::new()).await.map(|_| ()))
    }

    #[instrument(skip_all, fields(platform = "practice_panther"))]
    async fn list_time_entries(
        &self,
        token: &AccessToken,
        filter: &TimeEntryFilter,
    ) -> ApiResponse<Vec<TimeEntry>> {
        let params = DIALECT.time_entry_params(filter);
        fetch_page(&self.transport, token, TIME_ENTRIES, &params, filter.page, "time entry", entry_from_panther)
            .await
    }

    #[instrument(skip(self, token), fields(platform = "practice_panther"))]
    async fn get_time_entry(&self, token: &AccessToken, id: &str) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, TIME_ENTRIES, id, "time entry", entry_from_panther).await,
        )
    }

    #[instrument(skip_all, fields(platform = "practice_panther"))]
    async fn create_time_entry(&self, token: &AccessToken, entry: &TimeEntry) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(self.save_entry(token, None, entry).await)
    }

    #[instrument(skip(self, token, entry), fields(platform = "practice_panther"))]
    async fn update_time_entry(
        &self,
        token: &AccessToken,
        id: &str,
        entry: &TimeEntry,
    ) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(self.save_entry(token, Some(id), entry).await)
    }

    #[instrument(skip(self, token), fields(platform = "practice_panther"))]
    async fn delete_time_entry(&self, token: &AccessToken, id: &str) -> ApiResponse<()> {
        ApiResponse::from_result(delete_record(&self.transport, token, TIME_ENTRIES, id).await)
    }

    async fn list_clients(&self, token: &AccessToken, page: PageRequest) -> ApiResponse<Vec<Client>> {
        let params = DIALECT.page_params(page);
        fetch_page(&self.transport, token, ACCOUNTS, &params, page, "account", client_from_account).await
    }

    async fn get_client(&self, token: &AccessToken, id: &str) -> ApiResponse<Client> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, ACCOUNTS, id, "account", client_from_account).await,
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
        fetch_page(&self.transport, token, MATTERS, &params, page, "matter", matter_from_panther).await
    }

    async fn get_matter(&self, token: &AccessToken, id: &str) -> ApiResponse<Matter> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, MATTERS, id, "matter", matter_from_panther).await,
        )
    }

    async fn create_matter(&self, token: &AccessToken, matter: &Matter) -> ApiResponse<Matter> {
        ApiResponse::from_result(self.save_matter(token, matter).await)
    }

    async fn list_users(&self, token: &AccessToken, page: PageRequest) -> ApiResponse<Vec<User>> {
        let params = DIALECT.page_params(page);
        fetch_page(&self.transport, token, USERS, &params, page, "user", user_from_panther).await
    }
}
