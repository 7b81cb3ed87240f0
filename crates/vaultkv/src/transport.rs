//! HTTP transport: one reqwest client, per-attempt timeout, bounded retries

use std::fmt;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};

use crate::error::VaultError;
use crate::retry::{RetryError, RetryPolicy};

/// Default time box for a single HTTP attempt
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Verb and endpoint of a call; the only identifier allowed in errors and logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub method: Method,
    pub url: Url,
}

impl Operation {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A completed exchange, whatever its status
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Append a store path to the base URL
pub fn join(base: &Url, path: &str) -> Result<Url, VaultError> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|_| {
        VaultError::configuration(format!("Can not form a proper URL from path {{{}}}", path))
    })
}

pub struct Transport {
    client: Client,
    retry: RetryPolicy,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(attempt_timeout: Duration, retry: RetryPolicy) -> Result<Self, VaultError> {
        let client = Client::builder()
            .timeout(attempt_timeout)
            .build()
            .map_err(|_| VaultError::configuration("Failed to build HTTP client"))?;

        Ok(Self { client, retry })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Send one logical request under the retry policy.
    ///
    /// `build` decorates a fresh request for every attempt (headers, body).
    /// Each attempt reads the full body, so a connection dropped mid-body is
    /// retried like any other transport failure. Any HTTP status comes back
    /// as a [`Reply`].
    pub async fn send<F>(&self, operation: &Operation, build: F) -> Result<Reply, VaultError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let label = operation.to_string();

        let outcome = self
            .retry
            .run(&label, || {
                let request = build(
                    self.client
                        .request(operation.method.clone(), operation.url.clone()),
                );
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    let body = response.bytes().await?;
                    Ok::<_, reqwest::Error>(Reply {
                        status,
                        body: body.to_vec(),
                    })
                }
            })
            .await;

        match outcome {
            Ok(reply) => {
                tracing::debug!(operation = %label, status = reply.status.as_u16(), "Exchange complete");
                Ok(reply)
            }
            Err(RetryError::Exhausted { operation, attempts }) => {
                Err(VaultError::RetryExhausted { operation, attempts })
            }
            Err(RetryError::Permanent(e)) => {
                // The reqwest error itself is never rendered
                tracing::warn!(
                    operation = %label,
                    builder = e.is_builder(),
                    redirect = e.is_redirect(),
                    "Request failed"
                );
                Err(VaultError::Unavailable { operation: label })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_normalises_slashes() {
        let base = Url::parse("https://vault.example.com/").unwrap();
        assert_eq!(
            join(&base, "/v1/kv/data/app").unwrap().as_str(),
            "https://vault.example.com/v1/kv/data/app"
        );
        assert_eq!(
            join(&base, "database-secrets").unwrap().as_str(),
            "https://vault.example.com/database-secrets"
        );
    }

    #[test]
    fn test_join_keeps_base_path() {
        let base = Url::parse("https://gateway.example.com/vault").unwrap();
        assert_eq!(
            join(&base, "v1/auth/approle/login").unwrap().as_str(),
            "https://gateway.example.com/vault/v1/auth/approle/login"
        );
    }

    #[test]
    fn test_operation_display() {
        let op = Operation::new(
            Method::PATCH,
            Url::parse("https://vault.example.com/v1/kv/data/app").unwrap(),
        );
        assert_eq!(op.to_string(), "PATCH https://vault.example.com/v1/kv/data/app");
    }

    #[tokio::test]
    async fn test_unreachable_store_exhausts_retries() {
        // port 9 (discard) on loopback is closed on test hosts
        let transport = Transport::new(Duration::from_secs(1), RetryPolicy::immediate(2)).unwrap();
        let op = Operation::new(Method::GET, Url::parse("http://127.0.0.1:9/v1/kv/data/app").unwrap());

        let err = transport.send(&op, |req| req).await.unwrap_err();
        match err {
            VaultError::RetryExhausted { operation, attempts } => {
                assert_eq!(operation, "GET http://127.0.0.1:9/v1/kv/data/app");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }
}
