//! Client for a Vault-compatible KV v2 secret store
//!
//! Two pieces carry the real invariants:
//!
//! - **Token lifecycle** ([`auth`]): a static token, or an approle role/secret
//!   pair exchanged for a short-lived token that is cached and refreshed an
//!   hour (configurable) before the server would expire it.
//! - **Resilient transport** ([`transport`], [`retry`]): every call is
//!   time-boxed per attempt and retried a bounded number of times with a
//!   deterministic backoff when the connection itself fails. HTTP status codes
//!   are never retried.
//!
//! Neither credentials nor request/response bodies are ever written to logs or
//! error messages; failures name the verb and endpoint only.
//!
//! # Example
//!
//! ```rust,ignore
//! use vaultkv::{AppRoleAuth, VaultClient};
//!
//! let base: reqwest::Url = "https://vault.example.com".parse()?;
//! let auth = AppRoleAuth::new(base.clone(), "team-a", role_id, secret_id);
//! let client = VaultClient::builder(base, "team-a", auth).build()?;
//!
//! let secret = client.read("v1/kv/data/database-secrets").await?;
//! ```

pub mod auth;
pub mod blocking;
mod client;
pub mod clock;
pub mod envelope;
mod error;
pub mod retry;
mod sensitive;
pub mod transport;

pub use auth::{AppRoleAuth, AuthMethod, StaticToken};
pub use blocking::BlockingVaultClient;
pub use client::{VaultClient, VaultClientBuilder};
pub use envelope::{SecretEnvelope, SecretMap, SecretPatch, SecretWriteRequest};
pub use error::VaultError;
pub use retry::RetryPolicy;
pub use sensitive::SecretString;

// Re-exported so callers can build base URLs without depending on reqwest
pub use reqwest::Url;

pub const TOKEN_HEADER: &str = "X-Vault-Token";
pub const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
pub const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";
