//! Port interfaces for credential storage

use async_trait::async_trait;
use billsync_domain::{Platform, PlatformCredential, Result};

/// Durable store for platform credentials
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Get the stored credential for a platform
    async fn get(&self, platform: Platform) -> Result<Option<PlatformCredential>>;

    /// Insert or replace the credential for its platform
    async fn save(&self, credential: &PlatformCredential) -> Result<()>;

    /// Remove the credential for a platform
    async fn delete(&self, platform: Platform) -> Result<()>;
}
