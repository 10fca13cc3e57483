//! Authenticated JSON transport used by every vendor adapter

use billsync_domain::{AccessToken, PlatformError};
use reqwest::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::query::QueryParams;
use crate::errors::classify_response;
use crate::http::HttpClient;

/// How the access token is attached to requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// Token sent verbatim in a vendor header
    Header(&'static str),
}

/// HTTP client bound to one vendor's base URL and auth scheme.
#[derive(Clone)]
pub struct RestTransport {
    http: HttpClient,
    base_url: Url,
    auth: AuthStyle,
}

impl RestTransport {
    /// `base_url` is normalized to end in `/` so resource paths join under it.
    pub fn new(http: HttpClient, mut base_url: Url, auth: AuthStyle) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url, auth }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub async fn get(
        &self,
        token: &AccessToken,
        path: &str,
        query: &QueryParams,
    ) -> Result<Value, PlatformError> {
        let request = self.request(Method::GET, token, path)?.query(query);
        self.execute(request).await
    }

    pub async fn send_json(
        &self,
        method: Method,
        token: &AccessToken,
        path: &str,
        body: &Value,
    ) -> Result<Value, PlatformError> {
        let request = self.request(method, token, path)?.json(body);
        self.execute(request).await
    }

    pub async fn delete(&self, token: &AccessToken, path: &str) -> Result<(), PlatformError> {
        let request = self.request(Method::DELETE, token, path)?;
        self.execute(request).await.map(|_| ())
    }

    fn request(
        &self,
        method: Method,
        token: &AccessToken,
        path: &str,
    ) -> Result<RequestBuilder, PlatformError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| PlatformError::unexpected(format!("invalid resource path {path}: {err}")))?;

        let (name, value) = match self.auth {
            AuthStyle::Bearer => (AUTHORIZATION, format!("Bearer {}", token.secret())),
            AuthStyle::Header(header) => (HeaderName::from_static(header), token.secret().to_string()),
        };
        let mut value = HeaderValue::from_str(&value)
            .map_err(|_| PlatformError::authentication("access token is not a valid header value"))?;
        value.set_sensitive(true);

        Ok(self
            .http
            .request(method, url)
            .header(name, value)
            .header(ACCEPT, "application/json")
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Value, PlatformError> {
        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_response(response).await);
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| PlatformError::network(format!("failed to read response body: {err}")))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        debug!(status = status.as_u16(), bytes = body.len(), "decoding vendor response");
        serde_json::from_slice(&body)
            .map_err(|err| PlatformError::unexpected(format!("response is not JSON: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use billsync_domain::{Platform, PlatformErrorKind};
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn token() -> AccessToken {
        AccessToken::new(Platform::RocketMatter, "key-123", Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap())
    }

    fn transport(server: &MockServer, auth: AuthStyle) -> RestTransport {
        let base = Url::parse(&format!("{}/api/v1", server.uri())).unwrap();
        RestTransport::new(HttpClient::builder().max_attempts(1).build().unwrap(), base, auth)
    }

    #[tokio::test]
    async fn joins_paths_under_the_base_and_sends_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/time_entries"))
            .and(header("X-API-Key", "key-123"))
            .and(query_param("page_size", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server, AuthStyle::Header("x-api-key"));
        let body = transport
            .get(&token(), "time_entries", &vec![("page_size", "10".to_string())])
            .await
            .unwrap();
        assert_eq!(body["items"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn bearer_tokens_use_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(header("Authorization", "Bearer key-123"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server, AuthStyle::Bearer).delete(&token(), "activities/9").await.unwrap();
    }

    #[tokio::test]
    async fn non_json_success_bodies_are_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = transport(&server, AuthStyle::Bearer).get(&token(), "users", &Vec::new()).await.unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::Unexpected);
    }

    #[tokio::test]
    async fn error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "message": "entry is locked"
            })))
            .mount(&server)
            .await;

        let err = transport(&server, AuthStyle::Bearer)
            .send_json(Method::POST, &token(), "activities", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::Conflict);
        assert!(err.message.contains("entry is locked"));
    }
}
