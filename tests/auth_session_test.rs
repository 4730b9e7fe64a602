use chrono::{Duration as ChronoDuration, Utc};
use ladning::auth::pkce::compute_code_challenge;
use ladning::auth::{
    AuthSession, AuthState, ConsentPrompt, ConsentResolver, EaseeAuthenticator,
    TeslaAuthenticator,
};
use ladning::config::{EaseeConfig, TeslaConfig};
use ladning::credential::{Credential, Provider};
use ladning::token_cache::TokenCache;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMAIL: &str = "owner@example.com";
const MARGIN: Duration = Duration::from_secs(60);

fn tesla_config(server: &MockServer) -> TeslaConfig {
    TeslaConfig {
        email: EMAIL.to_string(),
        auth_base_url: format!("{}/oauth2/v3", server.uri()),
        api_base_url: server.uri(),
        ..Default::default()
    }
}

fn http() -> reqwest::Client {
    ladning::http::build_client(Duration::from_secs(5)).unwrap()
}

fn cached(token: &str, expires_in: ChronoDuration) -> Credential {
    Credential {
        access_token: token.to_string(),
        refresh_token: format!("{}-rt", token),
        expires_at: Utc::now() + expires_in,
        scope: "openid email offline_access".to_string(),
        account_id: EMAIL.to_string(),
    }
}

fn tesla_session(
    server: &MockServer,
    cache_path: &Path,
    consent: ConsentResolver,
) -> AuthSession {
    AuthSession::new(
        Arc::new(TeslaAuthenticator::new(http(), tesla_config(server))),
        Arc::new(TokenCache::new(cache_path)),
        consent,
        MARGIN,
    )
}

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 28800,
        "token_type": "Bearer",
    })
}

#[tokio::test]
async fn credential_expired_ten_minutes_ago_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .and(body_partial_json(json!({
            "grant_type": "refresh_token",
            "refresh_token": "at-old-rt",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-new", "rt-new")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    TokenCache::new(&cache_path)
        .save(Provider::Tesla, &cached("at-old", ChronoDuration::minutes(-10)))
        .unwrap();

    let session = tesla_session(&server, &cache_path, ConsentResolver::Unavailable);
    let credential = session.get_valid_credential().await.unwrap();

    assert_eq!(credential.access_token, "at-new");
    assert_eq!(credential.refresh_token, "rt-new");
    assert!(credential.expires_at > Utc::now() + ChronoDuration::hours(7));
    assert_eq!(session.state(), AuthState::Authenticated);

    let on_disk = TokenCache::new(&cache_path)
        .load(Provider::Tesla)
        .unwrap()
        .unwrap();
    assert_eq!(on_disk, credential);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("at-new", "rt-new"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    TokenCache::new(&cache_path)
        .save(Provider::Tesla, &cached("at-old", ChronoDuration::seconds(10)))
        .unwrap();

    let session = Arc::new(tesla_session(
        &server,
        &cache_path,
        ConsentResolver::Unavailable,
    ));
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.get_valid_credential().await })
        })
        .collect();

    for task in tasks {
        let credential = task.await.unwrap().unwrap();
        assert_eq!(credential.access_token, "at-new");
    }
}

#[tokio::test]
async fn headless_without_cache_fails_fast_naming_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("x", "y")))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("ladning_tokens.json");
    let session = tesla_session(&server, &cache_path, ConsentResolver::Unavailable);

    let err = session.get_valid_credential().await.unwrap_err();
    assert!(err.is_reauth_required());
    assert!(err.to_string().contains("ladning_tokens.json"));
    assert_eq!(session.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn corrupt_cache_is_treated_as_absent() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    std::fs::write(&cache_path, b"{ truncated").unwrap();

    let session = tesla_session(&server, &cache_path, ConsentResolver::Unavailable);
    let err = session.get_valid_credential().await.unwrap_err();
    assert!(err.is_reauth_required());
}

#[tokio::test]
async fn credential_of_another_account_is_ignored() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    let mut foreign = cached("at-foreign", ChronoDuration::hours(8));
    foreign.account_id = "someone-else@example.com".to_string();
    TokenCache::new(&cache_path)
        .save(Provider::Tesla, &foreign)
        .unwrap();

    let session = tesla_session(&server, &cache_path, ConsentResolver::Unavailable);
    let err = session.get_valid_credential().await.unwrap_err();
    assert!(err.is_reauth_required());
}

#[tokio::test]
async fn rejected_refresh_token_leaves_session_revoked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh_token is invalid",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    TokenCache::new(&cache_path)
        .save(Provider::Tesla, &cached("at-old", ChronoDuration::minutes(-1)))
        .unwrap();

    let session = tesla_session(&server, &cache_path, ConsentResolver::Unavailable);
    let err = session.get_valid_credential().await.unwrap_err();
    assert!(err.is_reauth_required());
    assert_eq!(session.state(), AuthState::Revoked);
}

#[tokio::test]
async fn transient_refresh_failure_keeps_unexpired_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    // Inside the refresh margin but not yet expired
    TokenCache::new(&cache_path)
        .save(Provider::Tesla, &cached("at-old", ChronoDuration::seconds(30)))
        .unwrap();

    let session = tesla_session(&server, &cache_path, ConsentResolver::Unavailable);
    let credential = session.get_valid_credential().await.unwrap();
    assert_eq!(credential.access_token, "at-old");
}

#[tokio::test]
async fn transient_refresh_failure_never_returns_expired_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    TokenCache::new(&cache_path)
        .save(Provider::Tesla, &cached("at-old", ChronoDuration::minutes(-10)))
        .unwrap();

    let session = tesla_session(&server, &cache_path, ConsentResolver::Unavailable);
    let err = session.get_valid_credential().await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn forced_refresh_of_an_already_replaced_token_is_not_repeated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-2", "rt-2")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    TokenCache::new(&cache_path)
        .save(Provider::Tesla, &cached("at-1", ChronoDuration::hours(8)))
        .unwrap();

    let session = tesla_session(&server, &cache_path, ConsentResolver::Unavailable);
    let first = session.get_valid_credential().await.unwrap();
    assert_eq!(first.access_token, "at-1");

    let replaced = session.force_refresh(&first).await.unwrap();
    assert_eq!(replaced.access_token, "at-2");
    let again = session.force_refresh(&first).await.unwrap();
    assert_eq!(again.access_token, "at-2");
}

/// Plays the operator: completes the login and records the PKCE challenge
struct BrowserStandIn {
    redirect_uri: String,
    challenge: Mutex<Option<String>>,
}

#[async_trait::async_trait]
impl ConsentPrompt for BrowserStandIn {
    async fn resolve(
        &self,
        _provider: Provider,
        authorization_url: &str,
    ) -> ladning::Result<String> {
        let url = url::Url::parse(authorization_url).unwrap();
        let query: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();
        assert_eq!(query.get("code_challenge_method").map(String::as_str), Some("S256"));
        assert_eq!(query.get("login_hint").map(String::as_str), Some(EMAIL));
        *self.challenge.lock().unwrap() = query.get("code_challenge").cloned();
        Ok(format!(
            "{}?code=abc123&state={}",
            self.redirect_uri,
            query.get("state").cloned().unwrap_or_default()
        ))
    }
}

#[tokio::test]
async fn interactive_login_exchanges_code_with_matching_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v3/token"))
        .and(body_partial_json(json!({
            "grant_type": "authorization_code",
            "code": "abc123",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at-login", "rt-login")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    let browser = Arc::new(BrowserStandIn {
        redirect_uri: TeslaConfig::default().redirect_uri,
        challenge: Mutex::new(None),
    });
    let session = tesla_session(
        &server,
        &cache_path,
        ConsentResolver::Interactive(browser.clone()),
    );

    let credential = session.get_valid_credential().await.unwrap();
    assert_eq!(credential.access_token, "at-login");
    assert_eq!(credential.account_id, EMAIL);
    assert_eq!(session.state(), AuthState::Authenticated);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let verifier = body["code_verifier"].as_str().unwrap();
    let challenge = browser.challenge.lock().unwrap().clone().unwrap();
    assert_eq!(compute_code_challenge(verifier), challenge);

    assert!(
        TokenCache::new(&cache_path)
            .load(Provider::Tesla)
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn easee_logs_in_headless_with_configured_password() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/accounts/login"))
        .and(body_partial_json(json!({
            "userName": "owner@example.com",
            "password": "hunter2",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "easee-at",
            "expiresIn": 86400,
            "accessClaims": ["User"],
            "tokenType": "Bearer",
            "refreshToken": "easee-rt",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("tokens.json");
    let config = EaseeConfig {
        username: "owner@example.com".to_string(),
        password: "hunter2".to_string(),
        base_url: server.uri(),
        ..Default::default()
    };
    let session = AuthSession::new(
        Arc::new(EaseeAuthenticator::new(http(), config)),
        Arc::new(TokenCache::new(&cache_path)),
        ConsentResolver::Unavailable,
        MARGIN,
    );

    let credential = session.get_valid_credential().await.unwrap();
    assert_eq!(credential.access_token, "easee-at");
    assert_eq!(credential.refresh_token, "easee-rt");
    assert_eq!(credential.scope, "User");

    // Served from memory afterwards
    let again = session.get_valid_credential().await.unwrap();
    assert_eq!(again, credential);
}

#[tokio::test]
async fn easee_without_password_requires_reauth() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = EaseeConfig {
        username: "owner@example.com".to_string(),
        base_url: server.uri(),
        ..Default::default()
    };
    let session = AuthSession::new(
        Arc::new(EaseeAuthenticator::new(http(), config)),
        Arc::new(TokenCache::new(dir.path().join("tokens.json"))),
        ConsentResolver::Unavailable,
        MARGIN,
    );
    let err = session.get_valid_credential().await.unwrap_err();
    assert!(err.is_reauth_required());
}
