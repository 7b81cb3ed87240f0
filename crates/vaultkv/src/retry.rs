//! Bounded retry with deterministic backoff
//!
//! Only transport-level failures are retried. A completed HTTP exchange is a
//! success at this layer whatever its status code; interpreting the status is
//! up to the caller.

use std::future::Future;
use std::io;
use std::time::Duration;

/// Failures that may succeed when the same request is sent again
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for reqwest::Error {
    fn is_transient(&self) -> bool {
        self.is_connect() || self.is_timeout() || self.is_request() || self.is_body()
    }
}

impl Transient for io::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::TimedOut
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::Interrupted
        )
    }
}

/// Outcome of a retried operation that did not succeed
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error
    Exhausted { operation: String, attempts: u32 },
    /// First non-transient failure, returned as-is
    Permanent(E),
}

/// Attempt cap and backoff schedule
///
/// The k-th retry (k = 0 for the first retry) waits `base_delay + step * 2^k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, step: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            step,
        }
    }

    /// Policy that retries without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before the k-th retry
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_add(self.step.saturating_mul(factor))
    }

    /// Run `attempt` until it succeeds, fails permanently, or the attempt cap is hit.
    ///
    /// `operation` identifies the call in logs and in the exhaustion error; it
    /// must not contain any payload.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, RetryError<E>>
    where
        E: Transient,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut remaining = self.max_attempts;
        let mut made = 0u32;

        while remaining > 0 {
            made += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(RetryError::Permanent(e)),
                Err(_) => {
                    remaining -= 1;
                    if remaining == 0 {
                        break;
                    }
                    let delay = self.delay_for(made - 1);
                    tracing::warn!(
                        operation,
                        attempt = made,
                        remaining,
                        delay_ms = delay.as_millis() as u64,
                        "Transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::warn!(operation, attempts = made, "Retries exhausted");
        Err(RetryError::Exhausted {
            operation: operation.to_string(),
            attempts: made,
        })
    }
}
