//! Easee account login: username/password exchanged for a bearer token

use super::{Authenticator, ConsentResolver};
use crate::config::EaseeConfig;
use crate::credential::{Credential, Provider};
use crate::error::{LadningError, Result};
use crate::http::{join_url, read_json};
use crate::logging::{StructuredLogger, get_provider_logger};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    access_claims: Vec<String>,
}

pub struct EaseeAuthenticator {
    http: reqwest::Client,
    config: EaseeConfig,
    logger: StructuredLogger,
}

impl EaseeAuthenticator {
    pub fn new(http: reqwest::Client, config: EaseeConfig) -> Self {
        Self {
            http,
            config,
            logger: get_provider_logger("auth", "easee"),
        }
    }

    fn into_credential(
        &self,
        token: TokenResponse,
        fallback_refresh: Option<&str>,
    ) -> Result<Credential> {
        let expires_in = token
            .expires_in
            .ok_or_else(|| LadningError::permanent("Easee token response carries no expiresIn"))?;
        let refresh_token = token
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| fallback_refresh.map(str::to_string))
            .unwrap_or_default();
        Ok(Credential::from_lifetime(
            token.access_token,
            refresh_token,
            expires_in,
            token.access_claims.join(" "),
            self.config.username.clone(),
            Utc::now(),
        ))
    }
}

#[async_trait::async_trait]
impl Authenticator for EaseeAuthenticator {
    fn provider(&self) -> Provider {
        Provider::Easee
    }

    fn account_id(&self) -> &str {
        &self.config.username
    }

    fn needs_consent(&self) -> bool {
        false
    }

    async fn authenticate(&self, _consent: &ConsentResolver) -> Result<Credential> {
        if self.config.username.is_empty() || self.config.password.is_empty() {
            return Err(LadningError::reauth_required(
                "easee",
                "no Easee username/password configured",
            ));
        }
        let resp = self
            .http
            .post(join_url(&self.config.base_url, "api/accounts/login"))
            .json(&json!({
                "userName": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await?;
        let token: TokenResponse = read_json(resp, "Easee login").await?;
        let credential = self.into_credential(token, None)?;
        self.logger.info(&format!(
            "Logged in as {}, token valid until {}",
            self.config.username,
            credential.expires_at.to_rfc3339()
        ));
        Ok(credential)
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let resp = self
            .http
            .post(join_url(&self.config.base_url, "api/accounts/refresh_token"))
            .json(&json!({
                "accessToken": credential.access_token,
                "refreshToken": credential.refresh_token,
            }))
            .send()
            .await?;
        let token: TokenResponse = read_json(resp, "Easee token refresh").await?;
        let mut refreshed = self.into_credential(token, Some(&credential.refresh_token))?;
        if refreshed.account_id.is_empty() {
            refreshed.account_id = credential.account_id.clone();
        }
        Ok(refreshed)
    }
}
