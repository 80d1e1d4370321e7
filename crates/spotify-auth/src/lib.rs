//! Spotify OAuth PKCE authentication library
//!
//! Provides PKCE flow generation, callback capture, token exchange/refresh,
//! and credential file storage. This crate is a standalone library with no
//! dependency on the client manager — it can be tested and used
//! independently.
//!
//! Credential flow:
//! 1. `flow::authorize()` generates the PKCE pair and presents the URL
//! 2. `callback` captures the redirect (loopback listener or pasted URL)
//! 3. `token::exchange_code()` trades the code for tokens
//! 4. The stamped record is persisted via `credentials::save()`
//! 5. The owning manager calls `token::refresh()` before expiry
//! 6. Refreshed records are saved back via `credentials::save()`

pub mod callback;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod token;

pub use callback::{CallbackParams, CaptureMode};
pub use constants::*;
pub use credentials::{TokenRecord, load, now_millis, required_scopes, save};
pub use error::{Error, Result};
pub use pkce::{AuthRequest, compute_challenge, generate_state, generate_verifier};
pub use token::{TokenResponse, exchange_code, refresh};
