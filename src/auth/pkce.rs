//! OAuth authorization code + PKCE (RFC 7636) helpers.

use crate::error::{LadningError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a PKCE code verifier (43 char URL-safe random string).
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute code_challenge = base64url_nopad(sha256(verifier)).
pub fn compute_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random state parameter.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One pending authorization: what was sent to the browser and what must come back
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
}

impl AuthorizationRequest {
    /// Build the authorization URL for `authorize_endpoint`
    pub fn new(
        authorize_endpoint: &str,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        login_hint: Option<&str>,
    ) -> Result<Self> {
        let code_verifier = generate_code_verifier();
        let state = generate_state();
        let mut url = url::Url::parse(authorize_endpoint).map_err(|e| {
            LadningError::config(format!("Invalid authorize URL {}: {}", authorize_endpoint, e))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", client_id)
                .append_pair("code_challenge", &compute_code_challenge(&code_verifier))
                .append_pair("code_challenge_method", "S256")
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", scope)
                .append_pair("state", &state);
            if let Some(hint) = login_hint.filter(|h| !h.is_empty()) {
                query.append_pair("login_hint", hint);
            }
        }
        Ok(Self {
            url: url.to_string(),
            state,
            code_verifier,
        })
    }

    /// Extract the authorization code from the redirected URL.
    ///
    /// A bare code is accepted as well; when the callback carries a `state`
    /// it must match the one sent out.
    pub fn code_from_callback(&self, callback: &str) -> Result<String> {
        let callback = callback.trim();
        let Ok(url) = url::Url::parse(callback) else {
            if callback.is_empty() || callback.contains(char::is_whitespace) {
                return Err(LadningError::permanent("Callback is neither a URL nor a code"));
            }
            return Ok(callback.to_string());
        };

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(err) = error {
            return Err(LadningError::permanent(format!(
                "Authorization was denied: {}",
                err
            )));
        }
        if let Some(returned) = state
            && returned != self.state
        {
            return Err(LadningError::permanent(
                "Callback state does not match the authorization request",
            ));
        }
        code.filter(|c| !c.is_empty())
            .ok_or_else(|| LadningError::permanent("Callback URL carries no authorization code"))
    }
}
