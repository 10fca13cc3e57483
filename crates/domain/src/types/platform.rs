//! Supported practice-management platforms

use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// A practice-management vendor BillSync can synchronize with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Clio,
    PracticePanther,
    RocketMatter,
}

impl_domain_status_conversions!(Platform {
    Clio => "clio",
    PracticePanther => "practice_panther",
    RocketMatter => "rocket_matter",
});

/// How a platform authenticates API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// Static key validated locally; never expires in practice
    ApiKey,
    /// Bearer token obtained through a refresh-token exchange
    OAuth,
}

impl Platform {
    pub const ALL: [Self; 3] = [Self::Clio, Self::PracticePanther, Self::RocketMatter];

    pub const fn auth_scheme(self) -> AuthScheme {
        match self {
            Self::Clio | Self::PracticePanther => AuthScheme::OAuth,
            Self::RocketMatter => AuthScheme::ApiKey,
        }
    }

    /// Prefix used for this platform's environment variables
    pub const fn env_prefix(self) -> &'static str {
        match self {
            Self::Clio => "CLIO",
            Self::PracticePanther => "PRACTICEPANTHER",
            Self::RocketMatter => "ROCKETMATTER",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_names() {
        assert_eq!("practice_panther".parse::<Platform>(), Ok(Platform::PracticePanther));
        assert_eq!("Clio".parse::<Platform>(), Ok(Platform::Clio));
        assert!("mycase".parse::<Platform>().is_err());
    }

    #[test]
    fn serde_and_display_agree() {
        for platform in Platform::ALL {
            let json = serde_json::to_string(&platform).unwrap();
            assert_eq!(json, format!("\"{platform}\""));
        }
    }

    #[test]
    fn only_rocket_matter_uses_api_keys() {
        assert_eq!(Platform::RocketMatter.auth_scheme(), AuthScheme::ApiKey);
        assert_eq!(Platform::Clio.auth_scheme(), AuthScheme::OAuth);
        assert_eq!(Platform::PracticePanther.auth_scheme(), AuthScheme::OAuth);
    }
}
