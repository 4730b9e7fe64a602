//! Shared HTTP plumbing for the vendor clients
//!
//! Every vendor call goes through a client with a request timeout, and every
//! non-success status is folded into one of three error classes the control
//! loop knows how to handle.

use crate::error::{LadningError, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("ladning/", env!("LADNING_VERSION"));

/// Build a client whose requests time out after `timeout`
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| LadningError::config(format!("Cannot build HTTP client: {}", e)))
}

/// Map a non-success status to an error class
///
/// - 401/403: credential rejected
/// - 408/425/429 and 5xx: worth retrying
/// - any other 4xx: logical rejection
pub fn classify_status(status: StatusCode, context: &str, body: &str) -> LadningError {
    let detail = body.trim();
    let message = if detail.is_empty() {
        format!("{} failed with {}", context, status)
    } else {
        let snippet: String = detail.chars().take(200).collect();
        format!("{} failed with {}: {}", context, status, snippet)
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LadningError::auth_expired(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY | StatusCode::TOO_MANY_REQUESTS => {
            LadningError::transient(message)
        }
        s if s.is_server_error() => LadningError::transient(message),
        _ => LadningError::permanent(message),
    }
}

/// Pass successful responses through, classify the rest
pub async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_status(status, context, &body))
}

/// Check the status and decode a JSON body
pub async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, context: &str) -> Result<T> {
    let resp = ensure_success(resp, context).await?;
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        LadningError::permanent(format!("{} returned an unexpected body: {}", context, e))
    })
}

/// Join a base URL and a path without doubling or dropping the slash
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_auth_expired() {
        assert!(classify_status(StatusCode::UNAUTHORIZED, "x", "").is_auth_expired());
        assert!(classify_status(StatusCode::FORBIDDEN, "x", "").is_auth_expired());
    }

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "x", "").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "x", "").is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "x", "").is_transient());
    }

    #[test]
    fn other_client_errors_are_permanent() {
        let err = classify_status(StatusCode::NOT_FOUND, "fetch vehicle", "no such vehicle");
        assert!(matches!(err, LadningError::Permanent { .. }));
        assert!(err.to_string().contains("no such vehicle"));
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("https://a/", "/b"), "https://a/b");
        assert_eq!(join_url("https://a", "b/c"), "https://a/b/c");
    }
}
