//! Bearer token verification against the identity provider's JWKS.

pub mod config;
pub mod jwks;
pub mod validation;

use thiserror::Error;

pub use config::AuthConfig;
pub use jwks::JwksProvider;
pub use validation::{Claims, TokenValidator};

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header.
    #[error("missing bearer token")]
    MissingToken,

    /// The token cannot be parsed as a JWT.
    #[error("malformed token: {reason}")]
    Malformed { reason: String },

    /// Parsed, but not trusted: signature, claims, headers or key lookup.
    #[error("token rejected: {reason}")]
    Rejected { reason: String },

    #[error("invalid auth configuration: {reason}")]
    Config { reason: String },
}

impl AuthError {
    /// 401 when there is nothing to verify, 403 when verification failed.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::MissingToken | Self::Malformed { .. })
    }
}

#[cfg(test)]
mod tests;
