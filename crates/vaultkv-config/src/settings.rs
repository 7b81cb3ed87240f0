//! Client settings with environment variable priority
//!
//! Settings are resolved in this order (first found wins):
//! 1. Environment variables (VAULTKV_*)
//! 2. Config file (vaultkv.toml) or flat properties
//! 3. Default values (where applicable)

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use vaultkv::auth::{DEFAULT_APPROLE_MOUNT, DEFAULT_REFRESH_THRESHOLD};
use vaultkv::transport::DEFAULT_ATTEMPT_TIMEOUT;
use vaultkv::{AppRoleAuth, AuthMethod, RetryPolicy, SecretString, Url, VaultClient};

use crate::error::ConfigError;
use crate::source::ValueSource;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "VAULTKV";

const MASK: &str = "******";

/// How the client authenticates against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Token,
    AppRole,
}

impl FromStr for Mechanism {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "TOKEN_AUTH" => Ok(Mechanism::Token),
            "APP_ROLE_AUTH" => Ok(Mechanism::AppRole),
            other => Err(ConfigError::InvalidMechanism(other.to_string())),
        }
    }
}

/// Settings as written in TOML, every field optional
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Base URL of the store, e.g. "https://vault.example.com"
    pub url: Option<String>,

    /// Namespace sent with every request; empty means the root namespace
    pub namespace: Option<String>,

    pub auth: AuthConfig,

    pub retry: RetryConfig,

    /// Per-attempt HTTP timeout
    pub timeout_secs: Option<u64>,

    /// How long before server-side expiry an approle token is replaced
    pub refresh_threshold_secs: Option<u64>,
}

/// Credential settings. Secret fields accept `env://`, `file://` or a plain value.
#[derive(Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// TOKEN_AUTH or APP_ROLE_AUTH
    pub mechanism: Option<String>,
    pub token: Option<String>,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
    /// Auth mount for approle, defaults to "approle"
    pub mount: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked = |v: &Option<String>| v.as_ref().map(|_| MASK);
        f.debug_struct("AuthConfig")
            .field("mechanism", &self.mechanism)
            .field("token", &masked(&self.token))
            .field("role_id", &masked(&self.role_id))
            .field("secret_id", &masked(&self.secret_id))
            .field("mount", &self.mount)
            .finish()
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_secs: Option<u64>,
}

/// Resolved credentials, ready to build an [`AuthMethod`]
#[derive(Debug, Clone)]
pub enum ResolvedAuth {
    Token(SecretString),
    AppRole {
        role_id: SecretString,
        secret_id: SecretString,
        mount: String,
    },
}

/// Fully resolved settings with actual credential values
#[derive(Debug, Clone)]
pub struct ResolvedVaultConfig {
    pub url: Url,
    pub namespace: String,
    pub auth: ResolvedAuth,
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
    pub refresh_threshold: Duration,
}

impl ResolvedVaultConfig {
    pub fn auth_method(&self) -> AuthMethod {
        match &self.auth {
            ResolvedAuth::Token(token) => AuthMethod::token(token.clone()),
            ResolvedAuth::AppRole {
                role_id,
                secret_id,
                mount,
            } => AppRoleAuth::new(
                self.url.clone(),
                self.namespace.clone(),
                role_id.clone(),
                secret_id.clone(),
            )
            .with_mount(mount.clone())
            .with_refresh_threshold(self.refresh_threshold)
            .into(),
        }
    }

    pub fn build_client(&self) -> Result<VaultClient, ConfigError> {
        let client = VaultClient::builder(self.url.clone(), self.namespace.clone(), self.auth_method())
            .retry_policy(self.retry)
            .attempt_timeout(self.attempt_timeout)
            .build()?;
        Ok(client)
    }
}

fn env_name(name: &str) -> String {
    format!("{}_{}", ENV_PREFIX, name)
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, "expected a non-negative integer"))
}

impl VaultConfig {
    /// Build settings from the flat `key=value` properties a host hands over
    ///
    /// Recognised keys: `url`, `namespace`, `auth.mechanism`, `token`,
    /// `role.id`, `secret.id`, `approle.mount`, `retry.max.attempts`,
    /// `retry.base.delay.secs`, `timeout.secs`, `refresh.threshold.secs`.
    /// Unknown keys are ignored.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            let key = key.as_ref();
            let value = value.into();
            match key {
                "url" => config.url = Some(value),
                "namespace" => config.namespace = Some(value),
                "auth.mechanism" => config.auth.mechanism = Some(value),
                "token" => config.auth.token = Some(value),
                "role.id" => config.auth.role_id = Some(value),
                "secret.id" => config.auth.secret_id = Some(value),
                "approle.mount" => config.auth.mount = Some(value),
                "retry.max.attempts" => config.retry.max_attempts = Some(parse_number(key, &value)?),
                "retry.base.delay.secs" => {
                    config.retry.base_delay_secs = Some(parse_number(key, &value)?)
                }
                "timeout.secs" => config.timeout_secs = Some(parse_number(key, &value)?),
                "refresh.threshold.secs" => {
                    config.refresh_threshold_secs = Some(parse_number(key, &value)?)
                }
                other => tracing::debug!(key = other, "Ignoring unknown property"),
            }
        }
        Ok(config)
    }

    /// Load settings from a TOML file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config file at {}, using environment and defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            message: e.kind().to_string(),
        })?;

        // toml's Display quotes the offending source line, which may hold a credential
        let config = toml::from_str(&content).map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: match e.span() {
                Some(span) => format!("invalid TOML near byte {}", span.start),
                None => "invalid TOML".to_string(),
            },
        })?;

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve settings from `VAULTKV_*` environment variables first, then this config
    pub fn resolve(self) -> Result<ResolvedVaultConfig, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve with a custom environment lookup, keyed by full variable name
    pub fn resolve_with<F>(self, env: F) -> Result<ResolvedVaultConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get_env = |name: &str| env(&env_name(name));
        let get_env_number = |name: &str| -> Result<Option<u64>, ConfigError> {
            get_env(name)
                .map(|v| parse_number(&env_name(name), &v))
                .transpose()
        };

        // URL: ENV > config > required
        let url = get_env("URL")
            .or(self.url)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::missing("Vault URL", "url", env_name("URL")))?;
        let url = Url::parse(url.trim())
            .map_err(|_| ConfigError::invalid("url", "not a valid absolute URL"))?;
        tracing::info!("Got vault url from config : {}", url);

        // Namespace: ENV > config > required, may be empty
        let namespace = get_env("NAMESPACE")
            .or(self.namespace)
            .ok_or_else(|| ConfigError::missing("Vault namespace", "namespace", env_name("NAMESPACE")))?
            .trim()
            .to_string();
        tracing::info!("Got vault namespace from config : {}", namespace);

        // Mechanism: ENV > config > required
        let mechanism: Mechanism = get_env("AUTH_MECHANISM")
            .or(self.auth.mechanism)
            .ok_or_else(|| {
                ConfigError::missing("Auth mechanism", "auth.mechanism", env_name("AUTH_MECHANISM"))
            })?
            .parse()?;

        let credential = |env_key: &str,
                          configured: Option<String>,
                          what: &'static str,
                          key: &'static str|
         -> Result<SecretString, ConfigError> {
            let source: ValueSource = get_env(env_key)
                .or(configured)
                .ok_or_else(|| ConfigError::missing(what, key, env_name(env_key)))?
                .parse()?;
            let value = source.resolve()?;
            if value.is_blank() {
                return Err(ConfigError::missing(what, key, env_name(env_key)));
            }
            tracing::info!("Got {} from config ({}) : {}", what, source.kind(), MASK);
            Ok(value)
        };

        let auth = match mechanism {
            Mechanism::Token => ResolvedAuth::Token(credential(
                "TOKEN",
                self.auth.token,
                "Vault token",
                "auth.token",
            )?),
            Mechanism::AppRole => {
                let role_id = credential("ROLE_ID", self.auth.role_id, "App role id", "auth.role_id")?;
                let secret_id = credential(
                    "SECRET_ID",
                    self.auth.secret_id,
                    "App role secret id",
                    "auth.secret_id",
                )?;
                let mount = get_env("APPROLE_MOUNT")
                    .or(self.auth.mount)
                    .map(|m| m.trim().trim_matches('/').to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_APPROLE_MOUNT.to_string());
                ResolvedAuth::AppRole {
                    role_id,
                    secret_id,
                    mount,
                }
            }
        };

        // Retry: ENV > config > defaults (3 attempts, 5s base, 1s step)
        let defaults = RetryPolicy::default();
        let max_attempts = match get_env_number("RETRY_MAX_ATTEMPTS")? {
            Some(n) => u32::try_from(n)
                .map_err(|_| ConfigError::invalid(env_name("RETRY_MAX_ATTEMPTS"), "out of range"))?,
            None => self.retry.max_attempts.unwrap_or(defaults.max_attempts()),
        };
        let retry = match get_env_number("RETRY_BASE_DELAY_SECS")?.or(self.retry.base_delay_secs) {
            Some(secs) => RetryPolicy::new(
                max_attempts,
                Duration::from_secs(secs),
                Duration::from_secs(1),
            ),
            None => defaults.with_max_attempts(max_attempts),
        };

        let attempt_timeout = get_env_number("TIMEOUT_SECS")?
            .or(self.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_ATTEMPT_TIMEOUT);

        let refresh_threshold = get_env_number("REFRESH_THRESHOLD_SECS")?
            .or(self.refresh_threshold_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REFRESH_THRESHOLD);

        Ok(ResolvedVaultConfig {
            url,
            namespace,
            auth,
            retry,
            attempt_timeout,
            refresh_threshold,
        })
    }

    /// Load config file and resolve with environment variable overrides
    pub fn load_and_resolve(path: impl AsRef<Path>) -> Result<ResolvedVaultConfig, ConfigError> {
        Self::load(path)?.resolve()
    }
}

/// Convenience for hosts that keep properties in a `HashMap`
impl TryFrom<&HashMap<String, String>> for VaultConfig {
    type Error = ConfigError;

    fn try_from(properties: &HashMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_properties(properties.iter().map(|(k, v)| (k.as_str(), v.clone())))
    }
}
