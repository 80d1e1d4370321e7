//! Spotify client manager
//!
//! Owns the full token lifecycle on top of `spotify-auth`: obtain a token
//! (stored, refreshed, or interactively authorized), keep it silently
//! refreshed five minutes before every expiry, and dispatch
//! bearer-authenticated API calls throttled by the provider's rate-limit
//! windows. Player operations are thin wrappers over the dispatcher.
//!
//! Every manager instance exclusively owns its token record, rate-limit
//! window, and refresh timer, so independent instances never interfere.

pub mod dispatch;
pub mod error;
pub mod manager;
pub mod player;

pub use dispatch::ApiResponse;
pub use error::{Error, Result};
pub use manager::{ClientConfig, SpotifyClient};
pub use player::NowPlaying;

// Re-exported so binaries only need this crate to configure a client.
pub use spotify_auth::CaptureMode;
