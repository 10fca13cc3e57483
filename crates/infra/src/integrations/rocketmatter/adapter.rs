use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use billsync_common::Clock;
use billsync_core::PlatformAdapter;
use billsync_domain::constants::API_KEY_VALIDITY_DAYS;
use billsync_domain::{
    AccessToken, ApiResponse, AuthGrant, Client, CredentialMaterial, Matter, PageRequest,
    Platform, PlatformError, TimeEntry, TimeEntryFilter, User, Validate, ValidationError,
};
use regex::Regex;
use reqwest::Method;
use tracing::{debug, instrument};
use url::Url;

use super::models::{
    client_from_rocket, entry_from_rocket, matter_from_rocket, rocket_client_from_client,
    rocket_entry_from_entry, rocket_matter_from_matter, user_from_rocket,
};
use crate::http::HttpClient;
use crate::integrations::shared::{
    decode_one, delete_record, fetch_page, fetch_record, resource_path, AuthStyle, DateStyle,
    FilterDialect, RestTransport,
};

const TIME_ENTRIES: &str = "time_entries";
const CLIENTS: &str = "clients";
const MATTERS: &str = "matters";
const USERS: &str = "users";

const API_KEY_HEADER: &str = "x-api-key";

const DIALECT: FilterDialect = FilterDialect {
    date_from: "start",
    date_to: "end",
    client: "client",
    matter: "matter",
    user: "timekeeper",
    limit: "page_size",
    offset: "start_index",
    date_style: DateStyle::MonthDayYear,
};

static SUBDOMAIN: OnceLock<Regex> = OnceLock::new();
static API_KEY: OnceLock<Regex> = OnceLock::new();
static UTBMS_TASK: OnceLock<Regex> = OnceLock::new();
static UTBMS_ACTIVITY: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern should compile - this is a bug"))
}

fn subdomain_pattern() -> &'static Regex {
    compiled(&SUBDOMAIN, r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$")
}

fn api_key_pattern() -> &'static Regex {
    compiled(&API_KEY, r"^[A-Za-z0-9_\-]{16,128}$")
}

fn utbms_task_pattern() -> &'static Regex {
    compiled(&UTBMS_TASK, r"^[A-Z]\d{3}$")
}

fn utbms_activity_pattern() -> &'static Regex {
    compiled(&UTBMS_ACTIVITY, r"^A\d{3}$")
}

/// API root for a Rocket Matter tenant: `https://{subdomain}.rocketmatter.net/api/v1`
pub fn tenant_base_url(subdomain: &str) -> Result<Url, PlatformError> {
    let subdomain = subdomain.trim().to_ascii_lowercase();
    if !subdomain_pattern().is_match(&subdomain) {
        return Err(PlatformError::validation(
            "subdomain",
            format!("'{subdomain}' is not a valid Rocket Matter subdomain"),
        ));
    }
    Url::parse(&format!("https://{subdomain}.rocketmatter.net/api/v1"))
        .map_err(|err| PlatformError::unexpected(format!("invalid tenant url: {err}")))
}

/// Rocket Matter v1 adapter. Authenticates with a static API key that is
/// checked locally; no token exchange exists.
pub struct RocketMatterAdapter {
    transport: RestTransport,
    clock: Arc<dyn Clock>,
}

impl RocketMatterAdapter {
    pub fn new(http: HttpClient, base_url: Url, clock: Arc<dyn Clock>) -> Self {
        Self { transport: RestTransport::new(http, base_url, AuthStyle::Header(API_KEY_HEADER)), clock }
    }

    async fn save_entry(
        &self,
        token: &AccessToken,
        id: Option<&str>,
        entry: &TimeEntry,
    ) -> Result<TimeEntry, PlatformError> {
        self.validate_time_entry(entry)?;
        let mut record = rocket_entry_from_entry(entry);
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
        decode_one(response, "time entry", entry_from_rocket)
    }

    async fn save_client(&self, token: &AccessToken, client: &Client) -> Result<Client, PlatformError> {
        client.validate()?;
        let mut record = rocket_client_from_client(client);
        record.id = None;
        let body = serde_json::to_value(&record)
            .map_err(|err| PlatformError::unexpected(format!("unserializable client: {err}")))?;
        let response = self.transport.send_json(Method::POST, token, CLIENTS, &body).await?;
        decode_one(response, "client", client_from_rocket)
    }

    async fn save_matter(&self, token: &AccessToken, matter: &Matter) -> Result<Matter, PlatformError> {
        matter.validate()?;
        let mut record = rocket_matter_from_matter(matter);
        record.id = None;
        let body = serde_json::to_value(&record)
            .map_err(|err| PlatformError::unexpected(format!("unserializable matter: {err}")))?;
        let response = self.transport.send_json(Method::POST, token, MATTERS, &body).await?;
        decode_one(response, "matter", matter_from_rocket)
    }
}

#[async_trait]
impl PlatformAdapter for RocketMatterAdapter {
    fn platform(&self) -> Platform {
        Platform::RocketMatter
    }

    /// UTBMS codes: tasks are a letter and three digits (`L110`), activities
    /// `A` and three digits (`A103`).
    fn validate_time_entry(&self, entry: &TimeEntry) -> Result<(), ValidationError> {
        entry.validate()?;
        if let Some(task) = entry.task_code.as_deref() {
            if !utbms_task_pattern().is_match(task) {
                return Err(ValidationError::new(
                    "task_code",
                    format!("'{task}' is not a UTBMS task code"),
                ));
            }
        }
        if let Some(activity) = entry.activity_code.as_deref() {
            if !utbms_activity_pattern().is_match(activity) {
                return Err(ValidationError::new(
                    "activity_code",
                    format!("'{activity}' is not a UTBMS activity code"),
                ));
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(platform = "rocket_matter"))]
    async fn authenticate(&self, credential: &CredentialMaterial) -> ApiResponse<AuthGrant> {
        let CredentialMaterial::ApiKey { key } = credential else {
            return ApiResponse::failure(PlatformError::authentication(
                "Rocket Matter authenticates with an API key",
            ));
        };
        let key = key.trim();
        if !api_key_pattern().is_match(key) {
            return ApiResponse::failure(PlatformError::authentication("API key is malformed"));
        }

        let expires_at = self.clock.utc_now() + chrono::Duration::days(API_KEY_VALIDITY_DAYS);
        debug!("API key accepted");
        ApiResponse::ok(AuthGrant { token: key.to_string(), expires_at, refresh_token: None })
    }

    #[instrument(skip_all, fields(platform = "rocket_matter"))]
    async fn probe(&self, token: &AccessToken) -> ApiResponse<()> {
        let params = DIALECT.page_params(PageRequest::new(1, 0));
        ApiResponse::from_result(self.transport.get(token, USERS, &params).await.map(|_| ()))
    }

    #[instrument(skip_all, fields(platform = "rocket_matter"))]
    async fn list_time_entries(
        &self,
        token: &AccessToken,
        filter: &TimeEntryFilter,
    ) -> ApiResponse<Vec<TimeEntry>> {
        let params = DIALECT.time_entry_params(filter);
        fetch_page(&self.transport, token, TIME_ENTRIES, &params, filter.page, "time entry", entry_from_rocket)
            .await
    }

    #[instrument(skip(self, token), fields(platform = "rocket_matter"))]
    async fn get_time_entry(&self, token: &AccessToken, id: &str) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, TIME_ENTRIES, id, "time entry", entry_from_rocket).await,
        )
    }

    #[instrument(skip_all, fields(platform = "rocket_matter"))]
    async fn create_time_entry(&self, token: &AccessToken, entry: &TimeEntry) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(self.save_entry(token, None, entry).await)
    }

    #[instrument(skip(self, token, entry), fields(platform = "rocket_matter"))]
    async fn update_time_entry(
        &self,
        token: &AccessToken,
        id: &str,
        entry: &TimeEntry,
    ) -> ApiResponse<TimeEntry> {
        ApiResponse::from_result(self.save_entry(token, Some(id), entry).await)
    }

    #[instrument(skip(self, token), fields(platform = "rocket_matter"))]
    async fn delete_time_entry(&self, token: &AccessToken, id: &str) -> ApiResponse<()> {
        ApiResponse::from_result(delete_record(&self.transport, token, TIME_ENTRIES, id).await)
    }

    async fn list_clients(&self, token: &AccessToken, page: PageRequest) -> ApiResponse<Vec<Client>> {
        let params = DIALECT.page_params(page);
        fetch_page(&self.transport, token, CLIENTS, &params, page, "client", client_from_rocket).await
    }

    async fn get_client(&self, token: &AccessToken, id: &str) -> ApiResponse<Client> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, CLIENTS, id, "client", client_from_rocket).await,
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
        fetch_page(&self.transport, token, MATTERS, &params, page, "matter", matter_from_rocket).await
    }

    async fn get_matter(&self, token: &AccessToken, id: &str) -> ApiResponse<Matter> {
        ApiResponse::from_result(
            fetch_record(&self.transport, token, MATTERS, id, "matter", matter_from_rocket).await,
        )
    }

    async fn create_matter(&self, token: &AccessToken, matter: &Matter) -> ApiResponse<Matter> {
        ApiResponse::from_result(self.save_matter(token, matter).await)
    }

    async fn list_users(&self, token: &AccessToken, page: PageRequest) -> ApiResponse<Vec<User>> {
        let params = DIALECT.page_params(page);
        fetch_page(&self.transport, token, USERS, &params, page, "user", user_from_rocket).await
    }
}
