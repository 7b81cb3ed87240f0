//! Authentication mechanisms
//!
//! The mechanism is picked once when the client is built. Each variant hands
//! out a bearer token on demand; the approle variant caches it and refreshes
//! it ahead of expiry.

mod approle;
mod token;

pub use approle::{AppRoleAuth, DEFAULT_APPROLE_MOUNT, DEFAULT_REFRESH_THRESHOLD};
pub use token::StaticToken;

use crate::error::VaultError;
use crate::sensitive::SecretString;
use crate::transport::Transport;

#[derive(Debug)]
pub enum AuthMethod {
    /// Long-lived token supplied up front
    Token(StaticToken),
    /// Role/secret pair exchanged for a short-lived token
    AppRole(AppRoleAuth),
}

impl AuthMethod {
    pub fn token(value: impl Into<SecretString>) -> Self {
        Self::Token(StaticToken::new(value))
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Token(_) => "token",
            AuthMethod::AppRole(_) => "approle",
        }
    }

    /// Current bearer token, refreshing first if the mechanism requires it
    pub async fn bearer(&self, transport: &Transport) -> Result<SecretString, VaultError> {
        match self {
            AuthMethod::Token(token) => Ok(token.get()),
            AuthMethod::AppRole(approle) => approle.token(transport).await,
        }
    }

    /// Force a fresh exchange; a no-op for static tokens
    pub async fn refresh(&self, transport: &Transport) -> Result<(), VaultError> {
        match self {
            AuthMethod::Token(_) => Ok(()),
            AuthMethod::AppRole(approle) => approle.refresh(transport).await.map(|_| ()),
        }
    }
}

impl From<StaticToken> for AuthMethod {
    fn from(token: StaticToken) -> Self {
        AuthMethod::Token(token)
    }
}

impl From<AppRoleAuth> for AuthMethod {
    fn from(approle: AppRoleAuth) -> Self {
        AuthMethod::AppRole(approle)
    }
}
