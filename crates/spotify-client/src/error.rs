//! Error types for the client manager
//!
//! Rate limiting is deliberately NOT represented here — a 429 is an
//! ordinary [`crate::ApiResponse`] carrying the retry timestamp, consumed
//! by the dispatcher to self-throttle.

/// Errors from client operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authorization, refresh, or credential storage failed.
    #[error(transparent)]
    Auth(#[from] spotify_auth::Error),

    /// Network-level failure on an API call. Surfaced to the caller of
    /// that specific operation; no automatic retry.
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The upstream reported its unreachable/unresolvable anomaly status.
    /// Distinguished from `Status` so callers can choose to swallow
    /// transient unreachability instead of treating it as a hard error.
    #[error("Spotify API unreachable (status {0})")]
    Unreachable(u16),

    /// Any other non-OK status from a player operation.
    #[error("{operation} returned non-OK status {status}")]
    Status { operation: &'static str, status: u16 },

    /// The manager was shut down with `end()` and must not be reused.
    #[error("client has been shut down")]
    Terminated,
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
