use std::path::PathBuf;
use std::str::FromStr;

use vaultkv::SecretString;

use crate::error::ConfigError;

/// Where a credential setting gets its value from.
///
/// - `env://VAR_NAME` - environment variable
/// - `file:///path/to/file` - file content
/// - anything else - the literal value, even if it looks like a path
#[derive(Clone, PartialEq)]
pub enum ValueSource {
    Plain(SecretString),
    Env { var_name: String },
    File { path: PathBuf },
}

impl ValueSource {
    /// Name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ValueSource::Plain(_) => "plain",
            ValueSource::Env { .. } => "env",
            ValueSource::File { .. } => "file",
        }
    }

    /// Fetch the value, trimming surrounding whitespace
    pub fn resolve(&self) -> Result<SecretString, ConfigError> {
        let raw = match self {
            ValueSource::Plain(value) => return Ok(SecretString::new(value.expose().trim())),
            ValueSource::Env { var_name } => {
                std::env::var(var_name).map_err(|_| ConfigError::EnvNotSet {
                    var: var_name.clone(),
                })?
            }
            ValueSource::File { path } => {
                std::fs::read_to_string(path).map_err(|e| ConfigError::File {
                    path: path.clone(),
                    message: e.kind().to_string(),
                })?
            }
        };
        let raw = SecretString::new(raw);
        Ok(SecretString::new(raw.expose().trim()))
    }
}

impl std::fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            ValueSource::Env { var_name } => f.debug_struct("Env").field("var_name", var_name).finish(),
            ValueSource::File { path } => f.debug_struct("File").field("path", path).finish(),
        }
    }
}

impl FromStr for ValueSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(var_name) = s.strip_prefix("env://") {
            if var_name.is_empty() {
                return Err(ConfigError::invalid(s, "env reference must name a variable"));
            }
            Ok(ValueSource::Env {
                var_name: var_name.to_string(),
            })
        } else if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(ConfigError::invalid(s, "file reference must specify a path"));
            }
            Ok(ValueSource::File {
                path: PathBuf::from(path),
            })
        } else {
            Ok(ValueSource::Plain(SecretString::new(s)))
        }
    }
}
