//! Settings for the vaultkv client
//!
//! Reads a TOML file or a flat property map, applies `VAULTKV_*` environment
//! overrides, resolves credential references (`env://`, `file://`, plain) and
//! hands the result to [`vaultkv::VaultClient::builder`].

mod error;
mod settings;
mod source;

pub use error::ConfigError;
pub use settings::{
    AuthConfig, Mechanism, ResolvedAuth, ResolvedVaultConfig, RetryConfig, VaultConfig, ENV_PREFIX,
};
pub use source::ValueSource;
