//! Error types for OAuth authentication operations

/// Errors from OAuth authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("callback state does not match the state sent with the authorization request")]
    StateMismatch,

    #[error("refresh token rejected: {0}")]
    InvalidRefreshToken(String),

    #[error("stored credential unusable: {0}")]
    InvalidStoredCredential(String),

    #[error("callback capture failed: {0}")]
    Callback(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
