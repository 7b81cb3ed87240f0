use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};

use crate::auth::AuthMethod;
use crate::envelope::{
    decode, DestroyRequest, SecretEnvelope, SecretMap, SecretPatch, SecretWriteRequest,
};
use crate::error::VaultError;
use crate::retry::RetryPolicy;
use crate::transport::{join, Operation, Reply, Transport, DEFAULT_ATTEMPT_TIMEOUT};
use crate::{MERGE_PATCH_CONTENT_TYPE, NAMESPACE_HEADER, TOKEN_HEADER};

/// Client for the KV v2 surface of the secret store
///
/// Cloning is cheap; clones share the transport and the auth mechanism,
/// including any cached token.
#[derive(Clone, Debug)]
pub struct VaultClient {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    base: Url,
    namespace: String,
    auth: AuthMethod,
    transport: Transport,
}

/// Builds a [`VaultClient`] from a base URL, a namespace and an auth mechanism
pub struct VaultClientBuilder {
    base: Url,
    namespace: String,
    auth: AuthMethod,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl VaultClientBuilder {
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Time box for each individual HTTP attempt (default 10 seconds)
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<VaultClient, VaultError> {
        let transport = Transport::new(self.attempt_timeout, self.retry)?;
        tracing::info!(
            url = %self.base,
            namespace = %self.namespace,
            auth = self.auth.name(),
            "Vault client initialized"
        );

        Ok(VaultClient {
            inner: Arc::new(Inner {
                base: self.base,
                namespace: self.namespace,
                auth: self.auth,
                transport,
            }),
        })
    }
}

impl VaultClient {
    pub fn builder(
        base: Url,
        namespace: impl Into<String>,
        auth: impl Into<AuthMethod>,
    ) -> VaultClientBuilder {
        VaultClientBuilder {
            base,
            namespace: namespace.into(),
            auth: auth.into(),
            retry: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn auth(&self) -> &AuthMethod {
        &self.inner.auth
    }

    /// `v1/<engine>/data/<name>`
    pub fn data_path(engine: &str, name: &str) -> String {
        format!(
            "v1/{}/data/{}",
            engine.trim_matches('/'),
            name.trim_start_matches('/')
        )
    }

    /// Force the auth mechanism to fetch a new token
    pub async fn refresh_token(&self) -> Result<(), VaultError> {
        self.inner.auth.refresh(&self.inner.transport).await
    }

    /// All key/value pairs of the latest version at `path`.
    ///
    /// `path` is relative to the base URL, e.g. `v1/secret/data/app`.
    pub async fn read(&self, path: &str) -> Result<SecretMap, VaultError> {
        let (operation, envelope) = self.fetch(path).await?;
        envelope
            .data
            .map(|kv| kv.data)
            .ok_or_else(|| VaultError::decode(operation.to_string(), "response has no data object"))
    }

    /// A single key of the secret at `path`, as a one-entry map
    pub async fn read_key(&self, path: &str, key: &str) -> Result<SecretMap, VaultError> {
        let mut secret = self.read(path).await?;
        match secret.remove_entry(key) {
            Some((key, value)) => Ok(BTreeMap::from([(key, value)])),
            None => Err(VaultError::SecretNotFound {
                path: path.to_string(),
                key: Some(key.to_string()),
            }),
        }
    }

    /// The full decoded envelope at `path`, metadata included
    pub async fn read_envelope(&self, path: &str) -> Result<SecretEnvelope, VaultError> {
        self.fetch(path).await.map(|(_, envelope)| envelope)
    }

    /// Create an empty secret `<engine>/data/<name>`
    pub async fn create_empty(&self, engine: &str, name: &str) -> Result<(), VaultError> {
        let body = encode_body(&SecretWriteRequest::<String>::empty())?;
        self.write(Method::PUT, &Self::data_path(engine, name), body, None)
            .await?;
        tracing::info!(engine, name, "Created empty secret");
        Ok(())
    }

    /// Write a new version of `<engine>/data/<name>`
    pub async fn create(
        &self,
        engine: &str,
        name: &str,
        data: BTreeMap<String, String>,
        options: BTreeMap<String, String>,
    ) -> Result<(), VaultError> {
        let body = encode_body(&SecretWriteRequest::new(data, options))?;
        self.write(Method::PUT, &Self::data_path(engine, name), body, None)
            .await?;
        tracing::info!(engine, name, "Created secret");
        Ok(())
    }

    /// Merge-patch `<engine>/data/<name>`.
    ///
    /// `Some` values are upserted, `None` values delete their key, and keys
    /// missing from `data` are left alone.
    pub async fn patch(
        &self,
        engine: &str,
        name: &str,
        data: BTreeMap<String, Option<String>>,
        options: BTreeMap<String, String>,
    ) -> Result<(), VaultError> {
        let body = encode_body(&SecretPatch::new(data, options))?;
        self.write(
            Method::PATCH,
            &Self::data_path(engine, name),
            body,
            Some(MERGE_PATCH_CONTENT_TYPE),
        )
        .await?;
        tracing::info!(engine, name, "Patched secret");
        Ok(())
    }

    /// Permanently destroy one version (default `1`) of `<engine>/<name>`.
    ///
    /// The response status is not checked: a rejected destroy is logged and
    /// otherwise reported as success. Transport failures still surface.
    pub async fn destroy(
        &self,
        engine: &str,
        name: &str,
        version: Option<u64>,
    ) -> Result<(), VaultError> {
        let path = format!(
            "v1/{}/destroy/{}",
            engine.trim_matches('/'),
            name.trim_start_matches('/')
        );
        let operation = Operation::new(Method::PUT, join(&self.inner.base, &path)?);
        let body = encode_body(&DestroyRequest {
            versions: vec![version.unwrap_or(1)],
        })?;

        let reply = self.execute(&operation, Some(body), None).await?;
        if !reply.is_success() {
            tracing::warn!(
                operation = %operation,
                status = reply.status.as_u16(),
                "Destroy was not accepted by the store"
            );
        }
        Ok(())
    }

    async fn fetch(&self, path: &str) -> Result<(Operation, SecretEnvelope), VaultError> {
        let operation = Operation::new(Method::GET, join(&self.inner.base, path)?);
        tracing::debug!(operation = %operation, "Reading secret");

        let reply = self.execute(&operation, None, None).await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Err(VaultError::SecretNotFound {
                path: path.to_string(),
                key: None,
            });
        }
        if !reply.is_success() {
            return Err(VaultError::store_operation(
                operation.to_string(),
                reply.status.as_u16(),
            ));
        }

        let envelope = decode(&operation.to_string(), &reply.body)?;
        Ok((operation, envelope))
    }

    /// PUT/PATCH whose only accepted outcome is HTTP 200
    async fn write(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&'static str>,
    ) -> Result<(), VaultError> {
        let operation = Operation::new(method, join(&self.inner.base, path)?);
        let reply = self.execute(&operation, Some(body), content_type).await?;

        if reply.status != StatusCode::OK {
            return Err(VaultError::store_operation(
                operation.to_string(),
                reply.status.as_u16(),
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        operation: &Operation,
        body: Option<Vec<u8>>,
        content_type: Option<&'static str>,
    ) -> Result<Reply, VaultError> {
        let transport = &self.inner.transport;
        let token = self.inner.auth.bearer(transport).await?;

        let mut token_header = HeaderValue::from_str(token.expose()).map_err(|_| {
            VaultError::authentication(
                self.inner.base.to_string(),
                "token is not a valid header value",
            )
        })?;
        token_header.set_sensitive(true);

        transport
            .send(operation, |request| {
                let mut request = request.header(TOKEN_HEADER, token_header.clone());
                if !self.inner.namespace.is_empty() {
                    request = request.header(NAMESPACE_HEADER, &self.inner.namespace);
                }
                if let Some(content_type) = content_type {
                    request = request.header(CONTENT_TYPE, content_type);
                }
                if let Some(body) = &body {
                    request = request.body(body.clone());
                }
                request
            })
            .await
    }
}

fn encode_body<T: serde::Serialize>(body: &T) -> Result<Vec<u8>, VaultError> {
    serde_json::to_vec(body).map_err(|_| VaultError::configuration("Failed to encode request body"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_path() {
        assert_eq!(
            VaultClient::data_path("kv-tests", "database-secrets"),
            "v1/kv-tests/data/database-secrets"
        );
        assert_eq!(VaultClient::data_path("/kv/", "app"), "v1/kv/data/app");
    }

    #[test]
    fn test_builder_defaults() {
        let client = VaultClient::builder(
            Url::parse("https://vault.example.com").unwrap(),
            "team-a",
            AuthMethod::token("hvs.static"),
        )
        .build()
        .unwrap();

        assert_eq!(client.namespace(), "team-a");
        assert_eq!(client.auth().name(), "token");
        assert!(!format!("{:?}", client).contains("hvs.static"));
    }
}
