//! Per-provider credential session
//!
//! The session lock is held for the whole refresh or login exchange, so
//! callers arriving while one is in flight wait for it and then see the
//! credential it produced instead of starting a second exchange. Vendor
//! refresh tokens are single-use; two concurrent refreshes would leave one
//! of the callers holding an invalidated token.

use super::{AuthState, Authenticator, ConsentResolver};
use crate::credential::{Credential, Provider};
use crate::error::{LadningError, Result};
use crate::logging::{StructuredLogger, get_provider_logger};
use crate::token_cache::TokenCache;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

#[derive(Debug, Default)]
struct SessionInner {
    credential: Option<Credential>,
    loaded: bool,
}

pub struct AuthSession {
    provider: Provider,
    authenticator: Arc<dyn Authenticator>,
    cache: Arc<TokenCache>,
    consent: ConsentResolver,
    refresh_margin: chrono::Duration,
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<AuthState>,
    logger: StructuredLogger,
}

impl AuthSession {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        cache: Arc<TokenCache>,
        consent: ConsentResolver,
        refresh_margin: std::time::Duration,
    ) -> Self {
        let provider = authenticator.provider();
        let (state_tx, _) = watch::channel(AuthState::Unauthenticated);
        Self {
            provider,
            authenticator,
            cache,
            consent,
            refresh_margin: chrono::Duration::from_std(refresh_margin)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            inner: Mutex::new(SessionInner::default()),
            state_tx,
            logger: get_provider_logger("auth", provider.as_str()),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Current lifecycle state, readable while an exchange is in flight
    pub fn state(&self) -> AuthState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// Return a credential valid for longer than the refresh margin.
    ///
    /// Refreshes a stale credential and falls back to a full login when
    /// there is nothing to refresh or the refresh token was rejected. Fails
    /// with `ReauthRequired` when that login needs an operator and none is
    /// available.
    pub async fn get_valid_credential(&self) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner);

        if let Some(current) = inner.credential.as_ref()
            && current.is_fresh(Utc::now(), self.refresh_margin)
        {
            return Ok(current.clone());
        }
        self.refresh_locked(&mut inner, true).await
    }

    /// Replace a credential the vendor rejected mid-call.
    ///
    /// If another caller already replaced `rejected`, the replacement is
    /// returned without a second exchange.
    pub async fn force_refresh(&self, rejected: &Credential) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        self.ensure_loaded(&mut inner);

        if let Some(current) = inner.credential.as_ref()
            && current.access_token != rejected.access_token
            && current.is_fresh(Utc::now(), self.refresh_margin)
        {
            self.logger
                .debug("Rejected credential already replaced by a concurrent refresh");
            return Ok(current.clone());
        }
        self.logger.info("Vendor rejected the credential, refreshing");
        self.refresh_locked(&mut inner, false).await
    }

    fn set_state(&self, state: AuthState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            self.logger.debug(&format!(
                "State {} -> {}",
                previous.as_str(),
                state.as_str()
            ));
        }
    }

    fn ensure_loaded(&self, inner: &mut SessionInner) {
        if inner.loaded {
            return;
        }
        inner.loaded = true;

        let loaded = match self.cache.load(self.provider) {
            Ok(found) => found,
            Err(e) => {
                self.logger
                    .warn(&format!("Ignoring token cache, treating as absent: {}", e));
                None
            }
        };

        let expected_account = self.authenticator.account_id();
        inner.credential = loaded.filter(|c| {
            let matches = expected_account.is_empty() || c.account_id == expected_account;
            if !matches {
                self.logger.warn(&format!(
                    "Cached credential belongs to {}, not {}; ignoring it",
                    c.account_id, expected_account
                ));
            }
            matches
        });

        match inner.credential.as_ref() {
            Some(c) if c.is_fresh(Utc::now(), self.refresh_margin) => {
                self.logger.info(&format!(
                    "Loaded cached credential valid until {}",
                    c.expires_at.to_rfc3339()
                ));
                self.set_state(AuthState::Authenticated);
            }
            Some(_) => {
                self.logger.info("Loaded cached credential that needs a refresh");
                self.set_state(AuthState::Expired);
            }
            None => self.set_state(AuthState::Unauthenticated),
        }
    }

    fn persist(&self, credential: &Credential) {
        // The new credential stays in memory even when the disk write fails
        if let Err(e) = self.cache.save(self.provider, credential) {
            self.logger
                .error(&format!("Failed to persist refreshed credential: {}", e));
        }
    }

    fn store(&self, inner: &mut SessionInner, credential: Credential) -> Credential {
        self.persist(&credential);
        inner.credential = Some(credential.clone());
        self.set_state(AuthState::Authenticated);
        credential
    }

    /// Refresh the held credential, or log in when there is none.
    ///
    /// `may_keep_current` lets a transient refresh failure hand back the
    /// current credential as long as it has not actually expired.
    async fn refresh_locked(
        &self,
        inner: &mut SessionInner,
        may_keep_current: bool,
    ) -> Result<Credential> {
        let Some(current) = inner.credential.clone() else {
            return self.authenticate_locked(inner).await;
        };
        self.set_state(AuthState::Expired);

        if !current.has_refresh_token() {
            self.logger
                .warn("Credential has no refresh token, a new login is needed");
            inner.credential = None;
            self.set_state(AuthState::Revoked);
            return self.authenticate_locked(inner).await;
        }

        match self.authenticator.refresh(&current).await {
            Ok(fresh) => {
                self.logger.info(&format!(
                    "Refreshed credential, valid until {}",
                    fresh.expires_at.to_rfc3339()
                ));
                Ok(self.store(inner, fresh))
            }
            Err(e) if e.is_transient() || e.is_cancelled() => {
                if may_keep_current && !current.is_expired(Utc::now()) {
                    self.logger.warn(&format!(
                        "Refresh failed ({}), using current credential for {}s more",
                        e,
                        current.remaining(Utc::now()).num_seconds()
                    ));
                    return Ok(current);
                }
                Err(e)
            }
            Err(e) => {
                self.logger.warn(&format!("Refresh token rejected: {}", e));
                inner.credential = None;
                self.set_state(AuthState::Revoked);
                self.authenticate_locked(inner).await
            }
        }
    }

    async fn authenticate_locked(&self, inner: &mut SessionInner) -> Result<Credential> {
        if self.authenticator.needs_consent() && !self.consent.is_available() {
            if self.state() != AuthState::Revoked {
                self.set_state(AuthState::Unauthenticated);
            }
            return Err(LadningError::reauth_required(
                self.provider.as_str(),
                format!(
                    "no usable credential in {} and no interactive login on this host; \
                     run once in a terminal or copy a token cache produced elsewhere to that path",
                    self.cache.path().display()
                ),
            ));
        }

        if self.authenticator.needs_consent() {
            self.set_state(AuthState::AwaitingUserConsent);
        }
        match self.authenticator.authenticate(&self.consent).await {
            Ok(credential) => {
                self.logger.info("Authenticated");
                Ok(self.store(inner, credential))
            }
            Err(e) => {
                self.set_state(AuthState::Unauthenticated);
                if e.is_transient() || e.is_cancelled() || e.is_reauth_required() {
                    return Err(e);
                }
                Err(LadningError::reauth_required(
                    self.provider.as_str(),
                    format!("login failed: {}", e),
                ))
            }
        }
    }
}
