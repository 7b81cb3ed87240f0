//! Wire types for the KV v2 REST surface and the typed response decoder
//!
//! Every response type ignores fields it does not know about, so newer store
//! versions adding fields never break decoding.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::VaultError;
use crate::sensitive::SecretString;

/// Key/value pairs stored in one secret version
pub type SecretMap = BTreeMap<String, String>;

/// Standard response wrapper returned by the store
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretEnvelope {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub lease_id: Option<String>,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub data: Option<KvData>,
    #[serde(default)]
    pub wrap_info: Option<serde_json::Value>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default)]
    pub auth: Option<AuthInfo>,
}

/// The `data` object of a KV v2 read
#[derive(Debug, Clone, Deserialize)]
pub struct KvData {
    #[serde(deserialize_with = "scalar_values")]
    pub data: SecretMap,
    #[serde(default)]
    pub metadata: Option<VersionMetadata>,
}

/// A stored value as it appears on the wire
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl StoredValue {
    fn into_text(self) -> String {
        match self {
            StoredValue::Text(text) => text,
            StoredValue::Number(number) => number.to_string(),
            StoredValue::Flag(flag) => flag.to_string(),
        }
    }
}

/// Numbers and booleans are kept as their JSON text. Arrays, objects and
/// `null` are a type mismatch.
fn scalar_values<'de, D>(deserializer: D) -> Result<SecretMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, StoredValue>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.into_text())).collect())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionMetadata {
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub deletion_time: Option<String>,
    #[serde(default)]
    pub destroyed: bool,
    #[serde(default)]
    pub version: u64,
}

/// The `auth` object of a login response
#[derive(Debug, Clone, Deserialize)]
pub struct AuthInfo {
    pub client_token: SecretString,
    pub lease_duration: u64,
    #[serde(default)]
    pub accessor: Option<String>,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub token_policies: Vec<String>,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub orphan: bool,
}

/// Body of a create or patch call
///
/// `V = String` for plain writes. Patches use `Option<String>` so that a
/// `None` value serializes as `null`, which removes that field on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretWriteRequest<V = String> {
    pub data: BTreeMap<String, V>,
    pub options: BTreeMap<String, String>,
}

/// Merge-patch body
pub type SecretPatch = SecretWriteRequest<Option<String>>;

impl<V> SecretWriteRequest<V> {
    pub fn new(data: BTreeMap<String, V>, options: BTreeMap<String, String>) -> Self {
        Self { data, options }
    }

    /// `{"data":{},"options":{}}`
    pub fn empty() -> Self {
        Self {
            data: BTreeMap::new(),
            options: BTreeMap::new(),
        }
    }
}

/// Body of a destroy call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestroyRequest {
    pub versions: Vec<u64>,
}

/// Body of an approle login call
#[derive(Serialize)]
pub(crate) struct AppRoleLogin<'a> {
    pub role_id: &'a str,
    pub secret_id: &'a str,
}

/// Decode a response body into `T`.
///
/// The serde message is dropped since it may quote the offending
/// value, which could be a secret. Only the error category and position survive.
pub fn decode<T: DeserializeOwned>(operation: &str, body: &[u8]) -> Result<T, VaultError> {
    serde_json::from_slice(body).map_err(|e| {
        let category = match e.classify() {
            serde_json::error::Category::Io => "I/O failure",
            serde_json::error::Category::Syntax => "invalid JSON",
            serde_json::error::Category::Data => "unexpected structure",
            serde_json::error::Category::Eof => "truncated body",
        };
        tracing::debug!(operation, line = e.line(), column = e.column(), category, "Decode failed");
        VaultError::decode(
            operation,
            format!("{} at line {} column {}", category, e.line(), e.column()),
        )
    })
}
