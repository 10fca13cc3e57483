//! Platform credentials and authentication state
//!
//! Secrets never appear in `Debug` output; everything that holds one
//! implements `Debug` by hand.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;
use crate::types::platform::{AuthScheme, Platform};

const REDACTED: &str = "[redacted]";

/// Secret material for one platform
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CredentialMaterial {
    #[serde(rename = "api_key")]
    ApiKey { key: String },
    #[serde(rename = "oauth")]
    OAuth {
        client_id: String,
        client_secret: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_token: Option<String>,
        refresh_token: String,
    },
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey { .. } => f.debug_struct("ApiKey").field("key", &REDACTED).finish(),
            Self::OAuth { client_id, access_token, .. } => f
                .debug_struct("OAuth")
                .field("client_id", client_id)
                .field("client_secret", &REDACTED)
                .field("access_token", &access_token.as_ref().map(|_| REDACTED))
                .field("refresh_token", &REDACTED)
                .finish(),
        }
    }
}

impl CredentialMaterial {
    pub const fn scheme(&self) -> AuthScheme {
        match self {
            Self::ApiKey { .. } => AuthScheme::ApiKey,
            Self::OAuth { .. } => AuthScheme::OAuth,
        }
    }

    /// Copy of this material updated with a freshly issued grant. Vendors that
    /// rotate refresh tokens return a new one; otherwise the old one is kept.
    #[must_use]
    pub fn with_grant(&self, grant: &AuthGrant) -> Self {
        match self {
            Self::ApiKey { .. } => self.clone(),
            Self::OAuth { client_id, client_secret, refresh_token, .. } => Self::OAuth {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                access_token: Some(grant.token.clone()),
                refresh_token: grant.refresh_token.clone().unwrap_or_else(|| refresh_token.clone()),
            },
        }
    }
}

/// Stored credential record. Mutated only by the authentication manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCredential {
    pub platform: Platform,
    pub material: CredentialMaterial,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// A refresh is due before the next call
    #[serde(default)]
    pub needs_refresh: bool,
    /// Rejected by the vendor; cleared only by re-authentication
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invalid: bool,
    pub updated_at: DateTime<Utc>,
}

impl PlatformCredential {
    pub fn new(platform: Platform, material: CredentialMaterial, now: DateTime<Utc>) -> Self {
        Self { platform, material, expires_at: None, needs_refresh: false, invalid: false, updated_at: now }
    }
}

/// Result of `authenticate` / `refresh_authentication`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Rotated refresh token, when the vendor issues one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGrant")
            .field("token", &REDACTED)
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Read-only credential snapshot lent to an adapter for one call
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    platform: Platform,
    secret: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(platform: Platform, secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self { platform, secret: secret.into(), expires_at }
    }

    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Bearer token or API key, depending on the platform scheme
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("platform", &self.platform)
            .field("secret", &REDACTED)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Authentication lifecycle per platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated,
    Expiring,
    Refreshing,
    /// Refresh failed; only an explicit re-authentication leaves this state
    Invalid,
}

impl_domain_status_conversions!(AuthState {
    Unauthenticated => "unauthenticated",
    Authenticated => "authenticated",
    Expiring => "expiring",
    Refreshing => "refreshing",
    Invalid => "invalid",
});

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn oauth() -> CredentialMaterial {
        CredentialMaterial::OAuth {
            client_id: "app-123".into(),
            client_secret: "shh".into(),
            access_token: Some("at-old".into()),
            refresh_token: "rt-old".into(),
        }
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", oauth());
        assert!(rendered.contains("app-123"));
        assert!(!rendered.contains("shh"));
        assert!(!rendered.contains("at-old"));
        assert!(!rendered.contains("rt-old"));

        let key = CredentialMaterial::ApiKey { key: "rm-secret-key".into() };
        assert!(!format!("{key:?}").contains("rm-secret-key"));
    }

    #[test]
    fn grant_rotates_refresh_token_when_present() {
        let expires = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rotated = oauth().with_grant(&AuthGrant {
            token: "at-new".into(),
            expires_at: expires,
            refresh_token: Some("rt-new".into()),
        });
        let kept = oauth().with_grant(&AuthGrant {
            token: "at-new".into(),
            expires_at: expires,
            refresh_token: None,
        });

        assert!(matches!(rotated, CredentialMaterial::OAuth { ref refresh_token, .. } if refresh_token == "rt-new"));
        assert!(matches!(kept, CredentialMaterial::OAuth { ref refresh_token, ref access_token, .. }
            if refresh_token == "rt-old" && access_token.as_deref() == Some("at-new")));
    }

    #[test]
    fn material_is_tagged_by_kind() {
        let json = serde_json::json!({ "kind": "api_key", "key": "abc" });
        let parsed: CredentialMaterial = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.scheme(), AuthScheme::ApiKey);
    }
}
