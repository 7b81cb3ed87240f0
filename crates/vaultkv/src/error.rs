use thiserror::Error;

/// Errors returned by the secret store client
///
/// Messages only ever carry operation identifiers (verb and URL), status
/// codes and attempt counts. Request and response bodies never appear here.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Credential exchange failed
    #[error("Failed to obtain a token from {endpoint}: {reason}")]
    Authentication { endpoint: String, reason: String },

    /// Transient transport failures used up every attempt
    #[error("All {attempts} attempts failed for {operation}")]
    RetryExhausted { operation: String, attempts: u32 },

    /// Transport failure that is not worth retrying
    #[error("Failed to get a response from {operation}")]
    Unavailable { operation: String },

    /// Response body did not match the expected schema
    #[error("Malformed response from {operation}: {reason}")]
    Decode { operation: String, reason: String },

    /// Secret or key absent from the store
    #[error("{}", not_found_message(.path, .key))]
    SecretNotFound { path: String, key: Option<String> },

    /// Write-side call returned an unexpected status code
    #[error("{operation} returned unexpected status {status}")]
    StoreOperation { operation: String, status: u16 },

    /// Client could not be constructed from the given settings
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Background worker of the blocking client is gone
    #[error("Secret fetcher worker failed: {0}")]
    Worker(String),
}

fn not_found_message(path: &str, key: &Option<String>) -> String {
    match key {
        Some(key) => format!("Secret value for key {} is not present at path {}", key, path),
        None => format!("No secret found at path {}", path),
    }
}

impl VaultError {
    /// Create an authentication error
    pub fn authentication(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a decode error
    pub fn decode(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a store operation error
    pub fn store_operation(operation: impl Into<String>, status: u16) -> Self {
        Self::StoreOperation {
            operation: operation.into(),
            status,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for the errors a caller may reasonably retry later
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. } | Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_key_and_path() {
        let err = VaultError::SecretNotFound {
            path: "/v1/kv/data/app".to_string(),
            key: Some("missing_key".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Secret value for key missing_key is not present at path /v1/kv/data/app"
        );
    }

    #[test]
    fn test_store_operation_message() {
        let err = VaultError::store_operation("PUT https://vault/v1/kv/data/app", 403);
        assert_eq!(
            err.to_string(),
            "PUT https://vault/v1/kv/data/app returned unexpected status 403"
        );
    }

    #[test]
    fn test_unavailable_classification() {
        let exhausted = VaultError::RetryExhausted {
            operation: "GET x".to_string(),
            attempts: 3,
        };
        assert!(exhausted.is_unavailable());
        assert!(!VaultError::configuration("bad url").is_unavailable());
    }
}
