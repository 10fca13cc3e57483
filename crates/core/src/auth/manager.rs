//! Per-platform authentication lifecycle
//!
//! The manager owns every credential. Adapters only ever see the
//! [`AccessToken`] it lends them. Each platform has its own slot guarded by an
//! async mutex, so concurrent callers wait for one refresh instead of racing
//! the vendor with several.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use billsync_common::Clock;
use billsync_domain::{
    AccessToken, AuthGrant, AuthScheme, AuthState, CredentialMaterial, Platform,
    PlatformCredential, PlatformError, Result,
};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::auth::ports::CredentialRepository;
use crate::platform::PlatformAdapter;

#[derive(Debug)]
struct AuthSlot {
    credential: PlatformCredential,
    state: AuthState,
    token: Option<AccessToken>,
}

impl AuthSlot {
    fn new(credential: PlatformCredential) -> Self {
        Self { credential, state: AuthState::Unauthenticated, token: None }
    }

    /// Slot for a persisted credential. An invalid credential stays invalid
    /// and a stored token is reused until it nears expiry.
    fn restore(credential: PlatformCredential) -> Self {
        let platform = credential.platform;
        let mut slot = Self::new(credential);
        if slot.credential.invalid {
            slot.state = AuthState::Invalid;
        } else if let (Some(expires_at), Some(secret)) =
            (slot.credential.expires_at, stored_secret(&slot.credential.material))
        {
            slot.token = Some(AccessToken::new(platform, secret, expires_at));
            slot.state = AuthState::Authenticated;
        }
        slot
    }
}

/// Owns credentials and hands out access tokens.
pub struct AuthManager {
    slots: RwLock<HashMap<Platform, Arc<Mutex<AuthSlot>>>>,
    store: Arc<dyn CredentialRepository>,
    clock: Arc<dyn Clock>,
    refresh_margin: chrono::Duration,
}

impl AuthManager {
    pub fn new(
        store: Arc<dyn CredentialRepository>,
        clock: Arc<dyn Clock>,
        refresh_margin: Duration,
    ) -> Self {
        let refresh_margin =
            chrono::Duration::from_std(refresh_margin).unwrap_or_else(|_| chrono::Duration::zero());
        Self { slots: RwLock::new(HashMap::new()), store, clock, refresh_margin }
    }

    /// Persist a credential and load it into its platform's slot. A
    /// credential persisted as invalid stays `invalid`.
    pub async fn register(&self, credential: PlatformCredential) -> Result<()> {
        self.store.save(&credential).await?;
        let platform = credential.platform;
        self.slots.write().await.insert(platform, Arc::new(Mutex::new(AuthSlot::restore(credential))));
        debug!(platform = %platform, "credential registered");
        Ok(())
    }

    /// Current state; platforms without a credential are `unauthenticated`.
    pub async fn state(&self, platform: Platform) -> AuthState {
        match self.slots.read().await.get(&platform) {
            Some(slot) => slot.lock().await.state,
            None => AuthState::Unauthenticated,
        }
    }

    /// Token for the next call, authenticating or refreshing first when needed.
    pub async fn access_token(
        &self,
        adapter: &dyn PlatformAdapter,
    ) -> std::result::Result<AccessToken, PlatformError> {
        let platform = adapter.platform();
        let slot = self.slot(platform).await?;
        let mut slot = slot.lock().await;

        match slot.state {
            AuthState::Invalid => return Err(invalid_error(platform)),
            AuthState::Unauthenticated => return self.authenticate_locked(&mut slot, adapter).await,
            AuthState::Authenticated | AuthState::Expiring | AuthState::Refreshing => {}
        }

        if slot.credential.needs_refresh || self.within_margin(slot.credential.expires_at) {
            if slot.state == AuthState::Authenticated {
                slot.state = AuthState::Expiring;
                slot.credential.needs_refresh = true;
                self.persist(&slot.credential).await;
            }
            return self.refresh_locked(&mut slot, adapter).await;
        }

        match &slot.token {
            Some(token) => Ok(token.clone()),
            None => self.authenticate_locked(&mut slot, adapter).await,
        }
    }

    /// React to a vendor 401 on `rejected`.
    ///
    /// If another caller already refreshed, the newer token is returned
    /// without a second refresh. A rejected API key cannot be refreshed, so
    /// the platform goes straight to `invalid`.
    pub async fn handle_unauthorized(
        &self,
        adapter: &dyn PlatformAdapter,
        rejected: &AccessToken,
    ) -> std::result::Result<AccessToken, PlatformError> {
        let platform = adapter.platform();
        let slot = self.slot(platform).await?;
        let mut slot = slot.lock().await;

        if slot.state == AuthState::Invalid {
            return Err(invalid_error(platform));
        }
        if let Some(current) = &slot.token {
            if current != rejected {
                return Ok(current.clone());
            }
        }

        match slot.credential.material.scheme() {
            AuthScheme::ApiKey => {
                self.mark_invalid(&mut slot, "API key rejected by vendor").await;
                Err(invalid_error(platform))
            }
            AuthScheme::OAuth => {
                slot.state = AuthState::Expiring;
                slot.credential.needs_refresh = true;
                self.refresh_locked(&mut slot, adapter).await
            }
        }
    }

    /// Mark a platform `invalid` after a refreshed token was also rejected.
    pub async fn invalidate(&self, platform: Platform, reason: &str) {
        if let Some(slot) = self.slots.read().await.get(&platform).cloned() {
            let mut slot = slot.lock().await;
            self.mark_invalid(&mut slot, reason).await;
        }
    }

    /// Replace the credential material and authenticate from scratch. This is
    /// the only way out of `invalid`.
    pub async fn reauthenticate(
        &self,
        adapter: &dyn PlatformAdapter,
        material: CredentialMaterial,
    ) -> std::result::Result<AccessToken, PlatformError> {
        let platform = adapter.platform();
        let credential = PlatformCredential::new(platform, material, self.clock.utc_now());
        let slot = {
            let mut slots = self.slots.write().await;
            Arc::clone(
                slots
                    .entry(platform)
                    .or_insert_with(|| Arc::new(Mutex::new(AuthSlot::new(credential.clone())))),
            )
        };
        let mut slot = slot.lock().await;
        *slot = AuthSlot::new(credential);
        self.persist(&slot.credential).await;
        info!(platform = %platform, "re-authenticating with new credentials");
        self.authenticate_locked(&mut slot, adapter).await
    }

    async fn slot(
        &self,
        platform: Platform,
    ) -> std::result::Result<Arc<Mutex<AuthSlot>>, PlatformError> {
        if let Some(slot) = self.slots.read().await.get(&platform) {
            return Ok(Arc::clone(slot));
        }

        let stored = self.store.get(platform).await.map_err(|err| {
            PlatformError::unexpected(format!("credential store unavailable: {err}"))
        })?;
        let Some(credential) = stored else {
            return Err(PlatformError::authentication(format!(
                "no credential registered for {platform}"
            )));
        };

        let mut slots = self.slots.write().await;
        let slot = slots
            .entry(platform)
            .or_insert_with(|| Arc::new(Mutex::new(AuthSlot::restore(credential))));
        Ok(Arc::clone(slot))
    }

    async fn authenticate_locked(
        &self,
        slot: &mut AuthSlot,
        adapter: &dyn PlatformAdapter,
    ) -> std::result::Result<AccessToken, PlatformError> {
        let platform = adapter.platform();
        match adapter.authenticate(&slot.credential.material).await.into_result() {
            Ok(grant) => {
                info!(platform = %platform, expires_at = %grant.expires_at, "authenticated");
                Ok(self.apply_grant(slot, platform, &grant).await)
            }
            Err(err) if err.is_transient() => {
                warn!(platform = %platform, error = %err, "authentication deferred by transient failure");
                Err(err)
            }
            Err(err) => {
                self.mark_invalid(slot, &err.message).await;
                Err(PlatformError::authentication(format!(
                    "{platform} authentication failed: {}",
                    err.message
                )))
            }
        }
    }

    async fn refresh_locked(
        &self,
        slot: &mut AuthSlot,
        adapter: &dyn PlatformAdapter,
    ) -> std::result::Result<AccessToken, PlatformError> {
        let platform = adapter.platform();
        slot.state = AuthState::Refreshing;
        debug!(platform = %platform, "refreshing credentials");

        match adapter.refresh_authentication(&slot.credential.material).await.into_result() {
            Ok(grant) => {
                info!(platform = %platform, expires_at = %grant.expires_at, "credentials refreshed");
                Ok(self.apply_grant(slot, platform, &grant).await)
            }
            Err(err) if err.is_transient() => {
                slot.state = AuthState::Expiring;
                slot.credential.needs_refresh = true;
                warn!(platform = %platform, error = %err, "refresh failed transiently; will retry");
                Err(err)
            }
            Err(err) => {
                self.mark_invalid(slot, &err.message).await;
                Err(PlatformError::authentication(format!(
                    "{platform} refresh failed: {}",
                    err.message
                )))
            }
        }
    }

    async fn apply_grant(
        &self,
        slot: &mut AuthSlot,
        platform: Platform,
        grant: &AuthGrant,
    ) -> AccessToken {
        slot.credential.material = slot.credential.material.with_grant(grant);
        slot.credential.expires_at = Some(grant.expires_at);
        slot.credential.needs_refresh = false;
        slot.credential.updated_at = self.clock.utc_now();
        slot.state = AuthState::Authenticated;

        let token = AccessToken::new(platform, grant.token.clone(), grant.expires_at);
        slot.token = Some(token.clone());
        self.persist(&slot.credential).await;
        token
    }

    async fn mark_invalid(&self, slot: &mut AuthSlot, reason: &str) {
        warn!(platform = %slot.credential.platform, reason, "credentials invalid; re-authentication required");
        slot.state = AuthState::Invalid;
        slot.token = None;
        slot.credential.invalid = true;
        slot.credential.needs_refresh = false;
        slot.credential.updated_at = self.clock.utc_now();
        self.persist(&slot.credential).await;
    }

    async fn persist(&self, credential: &PlatformCredential) {
        if let Err(err) = self.store.save(credential).await {
            warn!(platform = %credential.platform, error = %err, "failed to persist credential");
        }
    }

    fn within_margin(&self, expires_at: Option<DateTime<Utc>>) -> bool {
        expires_at.is_some_and(|at| at - self.refresh_margin <= self.clock.utc_now())
    }
}

fn stored_secret(material: &CredentialMaterial) -> Option<String> {
    match material {
        CredentialMaterial::ApiKey { key } => Some(key.clone()),
        CredentialMaterial::OAuth { access_token, .. } => access_token.clone(),
    }
}

fn invalid_error(platform: Platform) -> PlatformError {
    PlatformError::authentication(format!(
        "{platform} credentials are invalid; re-authentication required"
    ))
}
