//! OAuth refresh-token exchange
//!
//! Both OAuth vendors use the standard form-encoded `refresh_token` grant
//! against an `/oauth/token` endpoint on the API host.

use std::time::Duration;

use billsync_common::lenient;
use billsync_domain::{AuthGrant, CredentialMaterial, PlatformError, PlatformErrorKind};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::errors::classify_response;
use crate::http::HttpClient;

/// Lifetime assumed when a vendor omits `expires_in`
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    expires_in: Option<String>,
}

/// Token endpoint for an API base URL: `https://host/api/v4` becomes
/// `https://host/oauth/token`.
pub fn token_endpoint(base_url: &Url) -> Result<Url, PlatformError> {
    base_url
        .join("/oauth/token")
        .map_err(|err| PlatformError::unexpected(format!("invalid token endpoint: {err}")))
}

/// Exchange a refresh token for a fresh access grant.
///
/// Rejected grants (`400`/`401`) are authentication failures; server errors
/// and transport failures stay transient so the caller can try again later.
pub async fn refresh_grant(
    http: &HttpClient,
    token_url: &Url,
    credential: &CredentialMaterial,
    now: DateTime<Utc>,
) -> Result<AuthGrant, PlatformError> {
    let CredentialMaterial::OAuth { client_id, client_secret, refresh_token, .. } = credential
    else {
        return Err(PlatformError::authentication("OAuth credentials required"));
    };
    if refresh_token.trim().is_empty() {
        return Err(PlatformError::authentication("no refresh token available"));
    }

    let params = [
        ("grant_type", "refresh_token"),
        ("client_id", client_id.as_str()),
        ("client_secret", client_secret.as_str()),
        ("refresh_token", refresh_token.as_str()),
    ];
    let request = http.request(Method::POST, token_url.clone()).form(&params);
    let response = http.send(request).await?;

    if !response.status().is_success() {
        let mut error = classify_response(response).await;
        if matches!(error.kind, PlatformErrorKind::Validation | PlatformErrorKind::NotFound) {
            error.kind = PlatformErrorKind::Authentication;
        }
        warn!(code = error.code(), status = ?error.status, "token exchange rejected");
        return Err(error);
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|err| PlatformError::unexpected(format!("undecodable token response: {err}")))?;

    let lifetime = token
        .expires_in
        .and_then(|raw| raw.parse::<u64>().ok())
        .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
    let expires_at = now
        + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::hours(1));
    debug!(expires_in_secs = lifetime.as_secs(), "token exchange succeeded");

    Ok(AuthGrant { token: token.access_token, expires_at, refresh_token: token.refresh_token })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn credential() -> CredentialMaterial {
        CredentialMaterial::OAuth {
            client_id: "app-1".into(),
            client_secret: "secret".into(),
            access_token: None,
            refresh_token: "rt-1".into(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()
    }

    async fn exchange(server: &MockServer) -> Result<AuthGrant, PlatformError> {
        let http = HttpClient::builder().max_attempts(1).build().unwrap();
        let base = Url::parse(&format!("{}/api/v4", server.uri())).unwrap();
        refresh_grant(&http, &token_endpoint(&base).unwrap(), &credential(), now()).await
    }

    #[test]
    fn token_endpoint_sits_on_the_api_host() {
        let base = Url::parse("https://app.clio.com/api/v4").unwrap();
        assert_eq!(token_endpoint(&base).unwrap().as_str(), "https://app.clio.com/oauth/token");
    }

    #[tokio::test]
    async fn exchanges_refresh_token_for_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-2",
                "refresh_token": "rt-2",
                "token_type": "bearer",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = exchange(&server).await.unwrap();
        assert_eq!(grant.token, "at-2");
        assert_eq!(grant.refresh_token.as_deref(), Some("rt-2"));
        assert_eq!(grant.expires_at, now() + chrono::Duration::hours(2));
    }

    #[tokio::test]
    async fn invalid_grant_is_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let err = exchange(&server).await.unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::Authentication);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn server_errors_stay_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let err = exchange(&server).await.unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::Network);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn api_keys_cannot_be_exchanged() {
        let http = HttpClient::new().unwrap();
        let url = Url::parse("https://example.test/oauth/token").unwrap();
        let key = CredentialMaterial::ApiKey { key: "k".into() };
        let err = refresh_grant(&http, &url, &key, now()).await.unwrap_err();
        assert_eq!(err.kind, PlatformErrorKind::Authentication);
    }
}
