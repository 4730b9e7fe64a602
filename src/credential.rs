//! Session credentials for the vendor APIs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vendor a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Tesla,
    Easee,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Tesla => "tesla",
            Provider::Easee => "easee",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access/refresh token pair and the metadata needed to keep it valid.
///
/// `expires_at` is always known; token responses without a lifetime are
/// rejected when the credential is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
    pub account_id: String,
}

impl Credential {
    /// Build a credential from a token lifetime in seconds, counted from `now`
    pub fn from_lifetime(
        access_token: String,
        refresh_token: String,
        expires_in_secs: i64,
        scope: String,
        account_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now + Duration::seconds(expires_in_secs.max(0)),
            scope,
            account_id,
        }
    }

    /// Expiry is at or before `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Still valid for longer than `margin` after `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > now
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }

    /// Time left before expiry, zero when already expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}
