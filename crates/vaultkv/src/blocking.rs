//! Synchronous facade over [`VaultClient`]
//!
//! Network I/O runs on a dedicated runtime with a single worker thread named
//! `secret-fetcher`; the calling thread just blocks until the result is in.
//! Backoff sleeps happen on that worker, so callers on time-sensitive threads
//! never poll network futures themselves.
//!
//! Do not create, call or drop this client from inside an async runtime.

use std::collections::BTreeMap;
use std::future::Future;

use tokio::runtime::{Builder, Runtime};

use crate::client::VaultClient;
use crate::envelope::SecretMap;
use crate::error::VaultError;

pub const WORKER_THREAD_NAME: &str = "secret-fetcher";

pub struct BlockingVaultClient {
    client: VaultClient,
    runtime: Runtime,
}

impl BlockingVaultClient {
    pub fn new(client: VaultClient) -> Result<Self, VaultError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(WORKER_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|_| VaultError::Worker("failed to start runtime".to_string()))?;

        Ok(Self { client, runtime })
    }

    /// The async client this facade drives
    pub fn client(&self) -> &VaultClient {
        &self.client
    }

    pub fn read(&self, path: &str) -> Result<SecretMap, VaultError> {
        let path = path.to_string();
        self.run(move |client| async move { client.read(&path).await })
    }

    pub fn read_key(&self, path: &str, key: &str) -> Result<SecretMap, VaultError> {
        let path = path.to_string();
        let key = key.to_string();
        self.run(move |client| async move { client.read_key(&path, &key).await })
    }

    pub fn create_empty(&self, engine: &str, name: &str) -> Result<(), VaultError> {
        let (engine, name) = (engine.to_string(), name.to_string());
        self.run(move |client| async move { client.create_empty(&engine, &name).await })
    }

    pub fn create(
        &self,
        engine: &str,
        name: &str,
        data: BTreeMap<String, String>,
        options: BTreeMap<String, String>,
    ) -> Result<(), VaultError> {
        let (engine, name) = (engine.to_string(), name.to_string());
        self.run(move |client| async move { client.create(&engine, &name, data, options).await })
    }

    pub fn patch(
        &self,
        engine: &str,
        name: &str,
        data: BTreeMap<String, Option<String>>,
        options: BTreeMap<String, String>,
    ) -> Result<(), VaultError> {
        let (engine, name) = (engine.to_string(), name.to_string());
        self.run(move |client| async move { client.patch(&engine, &name, data, options).await })
    }

    pub fn destroy(&self, engine: &str, name: &str, version: Option<u64>) -> Result<(), VaultError> {
        let (engine, name) = (engine.to_string(), name.to_string());
        self.run(move |client| async move { client.destroy(&engine, &name, version).await })
    }

    /// Spawn the operation onto the worker and block until it finishes
    fn run<T, F, Fut>(&self, operation: F) -> Result<T, VaultError>
    where
        F: FnOnce(VaultClient) -> Fut,
        Fut: Future<Output = Result<T, VaultError>> + Send + 'static,
        T: Send + 'static,
    {
        let task = self.runtime.spawn(operation(self.client.clone()));
        self.runtime.block_on(task).map_err(|e| {
            let reason = if e.is_panic() {
                "operation panicked"
            } else {
                "operation was cancelled"
            };
            VaultError::Worker(reason.to_string())
        })?
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Url;

    use super::*;
    use crate::auth::AuthMethod;
    use crate::retry::RetryPolicy;

    fn unreachable_client() -> BlockingVaultClient {
        let client = VaultClient::builder(
            Url::parse("http://127.0.0.1:9").unwrap(),
            "",
            AuthMethod::token("hvs.static"),
        )
        .retry_policy(RetryPolicy::immediate(1))
        .build()
        .unwrap();
        BlockingVaultClient::new(client).unwrap()
    }

    #[test]
    fn test_operations_run_on_worker_thread() {
        let blocking = unreachable_client();
        let name = blocking
            .run(|_| async { Ok(std::thread::current().name().map(str::to_string)) })
            .unwrap();
        assert_eq!(name.as_deref(), Some(WORKER_THREAD_NAME));
    }

    #[test]
    fn test_transport_errors_reach_the_caller() {
        let blocking = unreachable_client();
        assert!(matches!(
            blocking.read("v1/kv/data/app"),
            Err(VaultError::RetryExhausted { attempts: 1, .. })
        ));
    }
}
