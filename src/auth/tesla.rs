//! Tesla account login: OAuth2 authorization code with PKCE

use super::pkce::AuthorizationRequest;
use super::{Authenticator, ConsentResolver};
use crate::config::TeslaConfig;
use crate::credential::{Credential, Provider};
use crate::error::{LadningError, Result};
use crate::http::{join_url, read_json};
use crate::logging::{StructuredLogger, get_provider_logger};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

pub struct TeslaAuthenticator {
    http: reqwest::Client,
    config: TeslaConfig,
    logger: StructuredLogger,
}

impl TeslaAuthenticator {
    pub fn new(http: reqwest::Client, config: TeslaConfig) -> Self {
        Self {
            http,
            config,
            logger: get_provider_logger("auth", "tesla"),
        }
    }

    fn token_url(&self) -> String {
        join_url(&self.config.auth_base_url, "token")
    }

    async fn exchange(&self, body: serde_json::Value, context: &str) -> Result<TokenResponse> {
        let resp = self.http.post(self.token_url()).json(&body).send().await?;
        read_json(resp, context).await
    }

    fn into_credential(
        &self,
        token: TokenResponse,
        fallback_refresh: Option<&str>,
    ) -> Result<Credential> {
        let Some(expires_in) = token.expires_in else {
            return Err(LadningError::permanent(
                "Tesla token response carries no expires_in",
            ));
        };
        let refresh_token = token
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| fallback_refresh.map(str::to_string))
            .ok_or_else(|| {
                LadningError::permanent("Tesla token response carries no refresh_token")
            })?;
        Ok(Credential::from_lifetime(
            token.access_token,
            refresh_token,
            expires_in,
            token.scope.unwrap_or_else(|| self.config.scope.clone()),
            self.config.email.clone(),
            Utc::now(),
        ))
    }
}

#[async_trait::async_trait]
impl Authenticator for TeslaAuthenticator {
    fn provider(&self) -> Provider {
        Provider::Tesla
    }

    fn account_id(&self) -> &str {
        &self.config.email
    }

    fn needs_consent(&self) -> bool {
        true
    }

    async fn authenticate(&self, consent: &ConsentResolver) -> Result<Credential> {
        let request = AuthorizationRequest::new(
            &join_url(&self.config.auth_base_url, "authorize"),
            &self.config.client_id,
            &self.config.redirect_uri,
            &self.config.scope,
            Some(self.config.email.as_str()),
        )?;

        self.logger.info("Waiting for operator to complete Tesla login");
        let callback = consent.resolve(Provider::Tesla, &request.url).await?;
        let code = request.code_from_callback(&callback)?;

        let token = self
            .exchange(
                json!({
                    "grant_type": "authorization_code",
                    "client_id": self.config.client_id,
                    "code": code,
                    "code_verifier": request.code_verifier,
                    "redirect_uri": self.config.redirect_uri,
                }),
                "Tesla code exchange",
            )
            .await?;
        let credential = self.into_credential(token, None)?;
        self.logger.info(&format!(
            "Tesla login complete, token valid until {}",
            credential.expires_at.to_rfc3339()
        ));
        Ok(credential)
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let token = self
            .exchange(
                json!({
                    "grant_type": "refresh_token",
                    "client_id": self.config.client_id,
                    "refresh_token": credential.refresh_token,
                    "scope": self.config.scope,
                }),
                "Tesla token refresh",
            )
            .await?;
        let mut refreshed = self.into_credential(token, Some(&credential.refresh_token))?;
        if refreshed.account_id.is_empty() {
            refreshed.account_id = credential.account_id.clone();
        }
        Ok(refreshed)
    }
}
