//! Adapter construction from configuration

use std::collections::HashMap;
use std::sync::Arc;

use billsync_common::Clock;
use billsync_core::PlatformAdapter;
use billsync_domain::config::PlatformConfig;
use billsync_domain::{BillSyncError, Platform, PlatformError, Result};
use tracing::info;
use url::Url;

use super::{clio, practicepanther, rocketmatter};
use crate::http::HttpClient;

const USER_AGENT: &str = concat!("billsync/", env!("CARGO_PKG_VERSION"));

fn config_error(platform: Platform, error: PlatformError) -> BillSyncError {
    BillSyncError::Config(format!("{platform}: {}", error.message))
}

fn parse_base_url(platform: Platform, raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|err| BillSyncError::Config(format!("{platform}: invalid base_url '{raw}': {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BillSyncError::Config(format!(
            "{platform}: base_url must be http(s), got '{}'",
            url.scheme()
        )));
    }
    Ok(url)
}

/// Vendor host for a platform: the configured override, else the vendor
/// default (tenant subdomain for Rocket Matter).
pub fn resolve_base_url(config: &PlatformConfig) -> Result<Url> {
    let platform = config.platform;
    if let Some(raw) = config.base_url.as_deref() {
        return parse_base_url(platform, raw);
    }
    match platform {
        Platform::Clio => parse_base_url(platform, clio::DEFAULT_BASE_URL),
        Platform::PracticePanther => parse_base_url(platform, practicepanther::DEFAULT_BASE_URL),
        Platform::RocketMatter => {
            let subdomain = config.subdomain.as_deref().ok_or_else(|| {
                BillSyncError::Config("rocket_matter requires a subdomain or base_url".into())
            })?;
            rocketmatter::tenant_base_url(subdomain).map_err(|err| config_error(platform, err))
        }
    }
}

/// Build the adapter for one configured platform.
pub fn build_adapter(config: &PlatformConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn PlatformAdapter>> {
    let platform = config.platform;
    let base_url = resolve_base_url(config)?;
    let http = HttpClient::builder().timeout(config.timeout()).user_agent(USER_AGENT).build()?;

    info!(platform = %platform, base_url = %base_url, "configuring adapter");
    let adapter: Arc<dyn PlatformAdapter> = match platform {
        Platform::Clio => Arc::new(
            clio::ClioAdapter::new(http, base_url, clock).map_err(|err| config_error(platform, err))?,
        ),
        Platform::PracticePanther => Arc::new(
            practicepanther::PracticePantherAdapter::new(http, base_url, clock)
                .map_err(|err| config_error(platform, err))?,
        ),
        Platform::RocketMatter => Arc::new(rocketmatter::RocketMatterAdapter::new(http, base_url, clock)),
    };
    Ok(adapter)
}

/// Build adapters for every configured platform.
pub fn build_adapters(
    platforms: &[PlatformConfig],
    clock: &Arc<dyn Clock>,
) -> Result<HashMap<Platform, Arc<dyn PlatformAdapter>>> {
    platforms
        .iter()
        .map(|config| Ok((config.platform, build_adapter(config, Arc::clone(clock))?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use billsync_common::SystemClock;
    use billsync_domain::CredentialMaterial;

    use super::*;

    fn api_key() -> CredentialMaterial {
        CredentialMaterial::ApiKey { key: "rm_live_0123456789abcdef".into() }
    }

    fn oauth() -> CredentialMaterial {
        CredentialMaterial::OAuth {
            client_id: "id".into(),
            client_secret: "secret".into(),
            access_token: None,
            refresh_token: "rt".into(),
        }
    }

    #[test]
    fn default_hosts_are_used_without_override() {
        let config = PlatformConfig::new(Platform::Clio, oauth());
        assert_eq!(resolve_base_url(&config).unwrap().as_str(), "https://app.clio.com/api/v4");

        let mut config = PlatformConfig::new(Platform::RocketMatter, api_key());
        config.subdomain = Some("smithlaw".into());
        assert_eq!(
            resolve_base_url(&config).unwrap().as_str(),
            "https://smithlaw.rocketmatter.net/api/v1"
        );
    }

    #[test]
    fn overrides_win_and_are_checked() {
        let mut config = PlatformConfig::new(Platform::PracticePanther, oauth());
        config.base_url = Some("http://127.0.0.1:9000/api/v2".into());
        assert_eq!(resolve_base_url(&config).unwrap().port(), Some(9000));

        config.base_url = Some("ftp://example.test".into());
        assert!(matches!(resolve_base_url(&config), Err(BillSyncError::Config(_))));
    }

    #[test]
    fn rocket_matter_without_subdomain_is_a_config_error() {
        let config = PlatformConfig::new(Platform::RocketMatter, api_key());
        let err = build_adapter(&config, Arc::new(SystemClock)).err().unwrap();
        assert!(matches!(err, BillSyncError::Config(_)));

        let mut config = PlatformConfig::new(Platform::RocketMatter, api_key());
        config.subdomain = Some("bad_sub!".into());
        assert!(build_adapter(&config, Arc::new(SystemClock)).is_err());
    }

    #[test]
    fn builds_one_adapter_per_platform() {
        let mut rocket = PlatformConfig::new(Platform::RocketMatter, api_key());
        rocket.subdomain = Some("smithlaw".into());
        let configs = vec![PlatformConfig::new(Platform::Clio, oauth()), rocket];

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let adapters = build_adapters(&configs, &clock).unwrap();
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters[&Platform::RocketMatter].platform(), Platform::RocketMatter);
    }
}
