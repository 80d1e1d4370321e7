//! Spotify OAuth constants
//!
//! Public endpoints and baseline scopes for the accounts service. The client
//! ID is not a constant here — it identifies the caller's registered app and
//! is supplied through configuration. The actual secrets (access/refresh
//! tokens) are managed by the credential store.

/// Authorization endpoint presented to the user in a browser
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";

/// Base URL of the resource API (player endpoints live under /v1)
pub const API_BASE: &str = "https://api.spotify.com";

/// Scopes the accounts service grants unconditionally on every refresh.
/// A stored credential's scope set is only considered valid when it equals
/// the requested scopes plus these two, so they are folded into every
/// authorization request up front.
pub const BASELINE_SCOPES: &[&str] = &["user-read-private", "user-read-email"];
