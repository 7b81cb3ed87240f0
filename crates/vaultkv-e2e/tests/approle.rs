//! Approle token exchange, caching and refresh

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use futures_util::future::join_all;
use serde_json::json;
use vaultkv::clock::{Clock, ManualClock};
use vaultkv::{AppRoleAuth, AuthMethod, RetryPolicy, VaultClient, VaultError};
use vaultkv_e2e::{init_test, kv_fixture, login_body, MockVault, LOGIN_PATH, NAMESPACE};

const ROLE_ID: &str = "role-3f1c9a";
const SECRET_ID: &str = "secret-8d2e7b";
const SECRET_PATH: &str = "/v1/kv-tests/data/database-secrets";
const CLIENT_PATH: &str = "v1/kv-tests/data/database-secrets";

fn approle_client(vault: &MockVault, clock: Arc<ManualClock>) -> VaultClient {
    let auth = AppRoleAuth::new(vault.url(), NAMESPACE, ROLE_ID, SECRET_ID).with_clock(clock);
    VaultClient::builder(vault.url(), NAMESPACE, auth)
        .retry_policy(RetryPolicy::immediate(2))
        .build()
        .unwrap()
}

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ))
}

fn expires_at(client: &VaultClient) -> Option<DateTime<Utc>> {
    match client.auth() {
        AuthMethod::AppRole(approle) => approle.expires_at(),
        AuthMethod::Token(_) => None,
    }
}

#[tokio::test]
async fn test_login_request_shape() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond_json("POST", LOGIN_PATH, 200, &login_body("hvs.approle-1", 7200));
    vault.respond_json("GET", SECRET_PATH, 200, &kv_fixture());
    let client = approle_client(&vault, manual_clock());

    client.read(CLIENT_PATH).await.unwrap();

    let logins = vault.requests_to("POST", LOGIN_PATH);
    assert_eq!(logins.len(), 1);
    assert_eq!(
        logins[0].json(),
        json!({"role_id": ROLE_ID, "secret_id": SECRET_ID})
    );
    assert_eq!(logins[0].header("content-type"), Some("application/json"));
    assert_eq!(logins[0].header("x-vault-namespace"), Some(NAMESPACE));
    assert_eq!(logins[0].header("x-vault-token"), None);

    let reads = vault.requests_to("GET", SECRET_PATH);
    assert_eq!(reads[0].header("x-vault-token"), Some("hvs.approle-1"));
}

#[tokio::test]
async fn test_token_is_cached_across_calls() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond_json("POST", LOGIN_PATH, 200, &login_body("hvs.approle-1", 7200));
    vault.respond_json("GET", SECRET_PATH, 200, &kv_fixture());
    let client = approle_client(&vault, manual_clock());

    for _ in 0..5 {
        client.read(CLIENT_PATH).await.unwrap();
    }

    assert_eq!(vault.requests_to("POST", LOGIN_PATH).len(), 1);
    assert_eq!(vault.requests_to("GET", SECRET_PATH).len(), 5);
}

#[tokio::test]
async fn test_token_replaced_once_threshold_window_starts() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond_json("POST", LOGIN_PATH, 200, &login_body("hvs.approle-1", 7200));
    vault.respond_json("GET", SECRET_PATH, 200, &kv_fixture());
    let clock = manual_clock();
    let start = clock.now();
    let client = approle_client(&vault, clock.clone());

    client.read(CLIENT_PATH).await.unwrap();
    assert_eq!(expires_at(&client), Some(start + TimeDelta::seconds(3600)));

    clock.advance(TimeDelta::seconds(3599));
    client.read(CLIENT_PATH).await.unwrap();
    assert_eq!(vault.requests_to("POST", LOGIN_PATH).len(), 1);

    vault.respond_json("POST", LOGIN_PATH, 200, &login_body("hvs.approle-2", 7200));
    clock.set(start + TimeDelta::seconds(3601));
    client.read(CLIENT_PATH).await.unwrap();
    client.read(CLIENT_PATH).await.unwrap();

    assert_eq!(vault.requests_to("POST", LOGIN_PATH).len(), 2);
    let reads = vault.requests_to("GET", SECRET_PATH);
    assert_eq!(reads.len(), 4);
    assert_eq!(reads[3].header("x-vault-token"), Some("hvs.approle-2"));
    assert_eq!(
        expires_at(&client),
        Some(start + TimeDelta::seconds(3601 + 3600))
    );
}

#[tokio::test]
async fn test_concurrent_callers_share_one_exchange() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond_json("POST", LOGIN_PATH, 200, &login_body("hvs.approle-1", 7200));
    vault.delay("POST", LOGIN_PATH, Duration::from_millis(200));
    vault.respond_json("GET", SECRET_PATH, 200, &kv_fixture());
    let client = approle_client(&vault, manual_clock());

    let reads = (0..8).map(|_| {
        let client = client.clone();
        async move { client.read(CLIENT_PATH).await }
    });
    let results = join_all(reads).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(vault.requests_to("POST", LOGIN_PATH).len(), 1);
    assert_eq!(vault.requests_to("GET", SECRET_PATH).len(), 8);
}

#[tokio::test]
async fn test_forced_refresh_exchanges_again() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond_json("POST", LOGIN_PATH, 200, &login_body("hvs.approle-1", 7200));
    let client = approle_client(&vault, manual_clock());

    client.refresh_token().await.unwrap();
    client.refresh_token().await.unwrap();

    assert_eq!(vault.requests_to("POST", LOGIN_PATH).len(), 2);
}

#[tokio::test]
async fn test_rejected_login_is_authentication_error_without_credentials() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond(
        "POST",
        LOGIN_PATH,
        403,
        format!(r#"{{"errors":["invalid secret id {}"]}}"#, SECRET_ID),
    );
    vault.respond_json("GET", SECRET_PATH, 200, &kv_fixture());
    let client = approle_client(&vault, manual_clock());

    let err = client.read(CLIENT_PATH).await.unwrap_err();

    assert!(matches!(err, VaultError::Authentication { .. }));
    let message = format!("{} {:?}", err, err);
    assert!(message.contains("403"));
    assert!(!message.contains(ROLE_ID));
    assert!(!message.contains(SECRET_ID));
    assert!(!message.contains("invalid secret id"));
    // Status codes are never retried and the read is never attempted
    assert_eq!(vault.requests_to("POST", LOGIN_PATH).len(), 1);
    assert!(vault.requests_to("GET", SECRET_PATH).is_empty());
}

#[tokio::test]
async fn test_malformed_login_response_is_authentication_error() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond("POST", LOGIN_PATH, 200, r#"{"auth":{"client_token":"hvs.partial""#);
    let client = approle_client(&vault, manual_clock());

    let err = client.read(CLIENT_PATH).await.unwrap_err();
    assert!(matches!(err, VaultError::Authentication { .. }));
    assert!(!err.to_string().contains("hvs.partial"));
}

#[tokio::test]
async fn test_login_without_auth_block_is_authentication_error() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond_json("POST", LOGIN_PATH, 200, &json!({"auth": null, "data": null}));
    let client = approle_client(&vault, manual_clock());

    let err = client.read(CLIENT_PATH).await.unwrap_err();
    assert!(matches!(err, VaultError::Authentication { .. }));
    assert!(expires_at(&client).is_none());
}

#[tokio::test]
async fn test_unreachable_login_is_authentication_error() {
    init_test();
    let vault = MockVault::start().await;
    vault.drop_connections(2);
    let client = approle_client(&vault, manual_clock());

    let err = client.read(CLIENT_PATH).await.unwrap_err();
    match err {
        VaultError::Authentication { reason, .. } => {
            assert_eq!(reason, "no response after 2 attempts")
        }
        other => panic!("expected Authentication, got {:?}", other),
    }
    assert_eq!(vault.dropped_connections(), 2);
}

#[tokio::test]
async fn test_custom_mount() {
    init_test();
    let vault = MockVault::start().await;
    vault.respond_json(
        "POST",
        "/v1/auth/ci-approle/login",
        200,
        &login_body("hvs.approle-ci", 7200),
    );
    vault.respond_json("GET", SECRET_PATH, 200, &kv_fixture());
    let auth = AppRoleAuth::new(vault.url(), "", ROLE_ID, SECRET_ID)
        .with_mount("/ci-approle/")
        .with_clock(manual_clock());
    let client = VaultClient::builder(vault.url(), "", auth)
        .retry_policy(RetryPolicy::immediate(1))
        .build()
        .unwrap();

    client.read(CLIENT_PATH).await.unwrap();

    let logins = vault.requests_to("POST", "/v1/auth/ci-approle/login");
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].header("x-vault-namespace"), None);
}
