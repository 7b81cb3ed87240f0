use std::path::PathBuf;

use thiserror::Error;
use vaultkv::VaultError;

/// Errors raised while turning settings into a client
///
/// Messages name keys, environment variables and paths, never values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required setting absent or blank
    #[error("{what} must be supplied. Set {env} or {key} in config")]
    Missing {
        what: &'static str,
        key: &'static str,
        env: String,
    },

    /// Setting present but unusable
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    /// Unknown auth mechanism name
    #[error("Invalid auth.mechanism '{0}'. Valid values are TOKEN_AUTH & APP_ROLE_AUTH")]
    InvalidMechanism(String),

    /// `env://` reference to an unset variable
    #[error("Environment variable '{var}' not set")]
    EnvNotSet { var: String },

    /// `file://` reference or config file that could not be read
    #[error("Failed to read file '{path}': {message}")]
    File { path: PathBuf, message: String },

    /// Config file is not valid TOML
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Settings were accepted but the client could not be built
    #[error(transparent)]
    Client(#[from] VaultError),
}

impl ConfigError {
    pub fn missing(what: &'static str, key: &'static str, env: impl Into<String>) -> Self {
        Self::Missing {
            what,
            key,
            env: env.into(),
        }
    }

    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
