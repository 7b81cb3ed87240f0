//! Role/secret exchange with a cached, proactively refreshed token

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::envelope::{decode, AppRoleLogin, SecretEnvelope};
use crate::error::VaultError;
use crate::sensitive::SecretString;
use crate::transport::{join, Operation, Transport};
use crate::NAMESPACE_HEADER;

/// Safety margin taken off the server-declared lease
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(3600);

pub const DEFAULT_APPROLE_MOUNT: &str = "approle";

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Approle credentials plus the token they were last exchanged for.
///
/// The token and its expiry are replaced together under one write lock, so a
/// reader sees either the old pair or the new one. Callers that find the
/// cache stale queue on `refresh_gate`; the first one performs the exchange and
/// the rest pick up its result. Neither lock is held while the other is
/// awaited, and the cache lock is never held across I/O or backoff sleeps.
pub struct AppRoleAuth {
    base: Url,
    namespace: String,
    mount: String,
    role_id: SecretString,
    secret_id: SecretString,
    threshold: Duration,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<CachedToken>>,
    refresh_gate: Mutex<()>,
}

impl AppRoleAuth {
    pub fn new(
        base: Url,
        namespace: impl Into<String>,
        role_id: impl Into<SecretString>,
        secret_id: impl Into<SecretString>,
    ) -> Self {
        Self {
            base,
            namespace: namespace.into(),
            mount: DEFAULT_APPROLE_MOUNT.to_string(),
            role_id: role_id.into(),
            secret_id: secret_id.into(),
            threshold: DEFAULT_REFRESH_THRESHOLD,
            clock: Arc::new(SystemClock),
            cached: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Auth mount the approle backend is enabled at
    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into().trim_matches('/').to_string();
        self
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Expiry of the cached token, if one has been obtained
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.cached.read().as_ref().map(|c| c.expires_at)
    }

    /// Cached token, refreshed first when missing or at/after its expiry
    pub async fn token(&self, transport: &Transport) -> Result<SecretString, VaultError> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we queued
        if let Some(token) = self.fresh_token() {
            tracing::debug!("Token refreshed by a concurrent caller");
            return Ok(token);
        }
        self.exchange(transport).await
    }

    /// Exchange the role/secret pair now, regardless of the cached expiry
    pub async fn refresh(&self, transport: &Transport) -> Result<SecretString, VaultError> {
        let _gate = self.refresh_gate.lock().await;
        self.exchange(transport).await
    }

    fn fresh_token(&self) -> Option<SecretString> {
        let now = self.clock.now();
        self.cached
            .read()
            .as_ref()
            .filter(|cached| cached.expires_at > now)
            .map(|cached| cached.token.clone())
    }

    async fn exchange(&self, transport: &Transport) -> Result<SecretString, VaultError> {
        let endpoint = self.base.to_string();
        let url = join(&self.base, &format!("v1/auth/{}/login", self.mount))?;
        let operation = Operation::new(Method::POST, url);

        let body = serde_json::to_vec(&AppRoleLogin {
            role_id: self.role_id.expose(),
            secret_id: self.secret_id.expose(),
        })
        .map_err(|_| VaultError::authentication(&endpoint, "could not encode login request"))?;

        let reply = transport
            .send(&operation, |request| {
                let request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
                if self.namespace.is_empty() {
                    request
                } else {
                    request.header(NAMESPACE_HEADER, &self.namespace)
                }
            })
            .await
            .map_err(|e| {
                let reason = match e {
                    VaultError::RetryExhausted { attempts, .. } => {
                        format!("no response after {} attempts", attempts)
                    }
                    _ => "transport failure".to_string(),
                };
                VaultError::authentication(&endpoint, reason)
            })?;

        if !reply.is_success() {
            return Err(VaultError::authentication(
                &endpoint,
                format!("login returned status {}", reply.status.as_u16()),
            ));
        }

        let envelope: SecretEnvelope = decode(&operation.to_string(), &reply.body)
            .map_err(|_| VaultError::authentication(&endpoint, "malformed login response"))?;
        let auth = envelope
            .auth
            .ok_or_else(|| VaultError::authentication(&endpoint, "login response has no auth block"))?;
        if auth.client_token.is_blank() {
            return Err(VaultError::authentication(
                &endpoint,
                "login response has an empty token",
            ));
        }

        let threshold_secs = self.threshold.as_secs();
        if auth.lease_duration <= threshold_secs {
            tracing::warn!(
                lease_duration = auth.lease_duration,
                threshold = threshold_secs,
                "Token lease is not longer than the refresh threshold; every use will trigger a new login"
            );
        }

        let expires_at = expiry_after(self.clock.now(), auth.lease_duration, threshold_secs);
        let token = auth.client_token;

        *self.cached.write() = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });

        tracing::info!(%expires_at, lease_duration = auth.lease_duration, "Refreshed vault token");
        Ok(token)
    }

    #[cfg(test)]
    fn seed(&self, token: &str, expires_at: DateTime<Utc>) {
        *self.cached.write() = Some(CachedToken {
            token: SecretString::new(token),
            expires_at,
        });
    }
}

impl fmt::Debug for AppRoleAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppRoleAuth")
            .field("base", &self.base.as_str())
            .field("namespace", &self.namespace)
            .field("mount", &self.mount)
            .field("role_id", &self.role_id)
            .field("secret_id", &self.secret_id)
            .field("expires_at", &self.expires_at())
            .finish()
    }
}

/// `now + lease - threshold`, saturating at the representable time range
fn expiry_after(now: DateTime<Utc>, lease_secs: u64, threshold_secs: u64) -> DateTime<Utc> {
    let lease = i64::try_from(lease_secs).unwrap_or(i64::MAX);
    let threshold = i64::try_from(threshold_secs).unwrap_or(i64::MAX);
    let offset = lease.saturating_sub(threshold);

    TimeDelta::try_seconds(offset)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(if offset < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;

    use super::*;

    fn approle(clock: Arc<ManualClock>) -> AppRoleAuth {
        AppRoleAuth::new(
            Url::parse("https://vault.example.com").unwrap(),
            "team-a",
            "role-123",
            "secret-456",
        )
        .with_clock(clock)
    }

    #[test]
    fn test_expiry_subtracts_threshold() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 7200, 3600), now + TimeDelta::seconds(3600));
    }

    #[test]
    fn test_short_lease_is_already_expired() {
        let now = Utc::now();
        assert!(expiry_after(now, 600, 3600) < now);
    }

    #[test]
    fn test_oversized_lease_never_expires() {
        let now = Utc::now();
        let expiry = expiry_after(now, u64::MAX, 0);
        assert_eq!(expiry, DateTime::<Utc>::MAX_UTC);
        assert!(expiry > now);
    }

    #[test]
    fn test_oversized_threshold_is_already_expired() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 0, u64::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_cached_token_served_until_expiry() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let auth = approle(clock.clone());
        assert!(auth.fresh_token().is_none());

        auth.seed("hvs.cached", start + TimeDelta::seconds(3600));
        assert_eq!(auth.fresh_token().unwrap().expose(), "hvs.cached");

        clock.advance(TimeDelta::seconds(3599));
        assert!(auth.fresh_token().is_some());

        // at the expiry instant the token counts as stale
        clock.advance(TimeDelta::seconds(1));
        assert!(auth.fresh_token().is_none());
    }

    #[test]
    fn test_debug_hides_credentials() {
        let auth = approle(Arc::new(ManualClock::new(Utc::now())));
        auth.seed("hvs.cached", Utc::now());
        let out = format!("{:?}", auth);
        assert!(!out.contains("role-123"));
        assert!(!out.contains("secret-456"));
        assert!(!out.contains("hvs.cached"));
        assert!(out.contains("team-a"));
    }

    #[test]
    fn test_mount_is_trimmed() {
        let auth = approle(Arc::new(ManualClock::new(Utc::now()))).with_mount("/ci-approle/");
        assert_eq!(auth.mount, "ci-approle");
    }
}
