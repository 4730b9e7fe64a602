//! Credential lifecycle for the vendor APIs
//!
//! An [`AuthSession`] per provider hands out credentials that are valid for
//! longer than the refresh margin. It loads them from the [`TokenCache`],
//! refreshes them through the provider's [`Authenticator`], and falls back to
//! a fresh login when nothing usable is left. Whether that login may involve
//! an operator is decided once at startup through the [`ConsentResolver`].
//!
//! [`TokenCache`]: crate::token_cache::TokenCache

pub mod consent;
pub mod easee;
pub mod pkce;
pub mod session;
pub mod tesla;

pub use consent::{ConsentPrompt, ConsentResolver, StdinConsentPrompt};
pub use easee::EaseeAuthenticator;
pub use session::AuthSession;
pub use tesla::TeslaAuthenticator;

use crate::credential::{Credential, Provider};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one provider's credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    /// No credential known
    Unauthenticated,
    /// Waiting for the operator to complete a browser login
    AwaitingUserConsent,
    /// Holding a credential that is valid beyond the refresh margin
    Authenticated,
    /// Holding a credential that is expired or about to expire
    Expired,
    /// The refresh token was rejected; only a full login recovers
    Revoked,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::AwaitingUserConsent => "awaiting_user_consent",
            AuthState::Authenticated => "authenticated",
            AuthState::Expired => "expired",
            AuthState::Revoked => "revoked",
        }
    }
}

/// Vendor-specific token exchanges
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    fn provider(&self) -> Provider;

    /// Account the configured login belongs to; empty when not configured
    fn account_id(&self) -> &str;

    /// Whether a first login needs an operator to grant consent
    fn needs_consent(&self) -> bool;

    /// Obtain an initial credential, asking `consent` when the login needs it
    async fn authenticate(&self, consent: &ConsentResolver) -> Result<Credential>;

    /// Exchange the refresh token of `credential` for a new credential
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;
}
