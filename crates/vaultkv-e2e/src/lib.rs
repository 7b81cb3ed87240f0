//! End-to-end test utilities for the vaultkv client
//!
//! Runs the real client against [`MockVault`], a local HTTP server that
//! speaks just enough of the KV v2 and approle login surface.

pub mod mock_vault;

use std::sync::Once;

use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use vaultkv::{AuthMethod, RetryPolicy, VaultClient};

pub use mock_vault::{MockVault, RecordedRequest};

/// Namespace the helpers configure clients with
pub const NAMESPACE: &str = "team-a";

/// Static token the helpers configure clients with
pub const STATIC_TOKEN: &str = "hvs.static-test-token";

pub const LOGIN_PATH: &str = "/v1/auth/approle/login";

static INIT: Once = Once::new();

/// Initialize tracing for tests
pub fn init_test() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive("vaultkv=debug".parse().unwrap())
                    .add_directive("vaultkv_e2e=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A KV v2 read response for `database-secrets`, including fields the client does not model
pub fn kv_fixture() -> Value {
    json!({
        "request_id": "8b5c1c4e-1f3a-4c1e-9d7e-2c5a3f1b0e9a",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": {
            "data": {
                "registry_pwd": "dummyPassword",
                "registry_usr_info": "admin"
            },
            "metadata": {
                "created_time": "2024-03-01T10:15:30.123456Z",
                "custom_metadata": null,
                "deletion_time": "",
                "destroyed": false,
                "version": 2
            }
        },
        "wrap_info": null,
        "warnings": null,
        "auth": null,
        "mount_type": "kv"
    })
}

/// An approle login response carrying `token` valid for `lease_secs`
pub fn login_body(token: &str, lease_secs: u64) -> Value {
    json!({
        "request_id": "0d3f6c2a-4b1e-4f7a-8c9d-1e2f3a4b5c6d",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": null,
        "wrap_info": null,
        "warnings": null,
        "auth": {
            "client_token": token,
            "accessor": "accessor-test",
            "policies": ["default", "kv-read"],
            "token_policies": ["default", "kv-read"],
            "metadata": {"role_name": "tests"},
            "lease_duration": lease_secs,
            "renewable": true,
            "entity_id": "entity-test",
            "token_type": "service",
            "orphan": true
        }
    })
}

/// Client authenticating with [`STATIC_TOKEN`] in [`NAMESPACE`]
pub fn token_client(vault: &MockVault, retry: RetryPolicy) -> VaultClient {
    VaultClient::builder(vault.url(), NAMESPACE, AuthMethod::token(STATIC_TOKEN))
        .retry_policy(retry)
        .build()
        .expect("Failed to build token client")
}
