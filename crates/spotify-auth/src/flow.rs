//! Interactive PKCE authorization flow
//!
//! Drives one full authorization attempt: generate the verifier/challenge
//! pair and state, present the authorization URL to the user, capture the
//! callback, validate it, and exchange the code for a token record. The
//! verifier and state live only for the duration of this function.
//!
//! The user-facing wait (browser round trip or pasted URL) is unbounded —
//! it completes only when the user acts or the process is shut down.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::callback::{self, CaptureMode};
use crate::credentials::{TokenRecord, now_millis};
use crate::error::Result;
use crate::pkce::AuthRequest;
use crate::token;

/// Run the authorization flow to completion and return a stamped record.
///
/// Failures (denial, state mismatch, exchange errors) propagate to the
/// caller; the attempt is not retried here.
pub async fn authorize(
    client: &reqwest::Client,
    client_id: &str,
    scopes: &BTreeSet<String>,
    capture: &CaptureMode,
) -> Result<TokenRecord> {
    let request = AuthRequest::generate(capture.redirect_uri());
    let scope: Vec<&str> = scopes.iter().map(String::as_str).collect();
    let url = request.authorize_url(client_id, &scope.join(" "));

    println!("Authorize this app by visiting:\n{url}");

    let params = match capture {
        CaptureMode::Auto { listen } => {
            if let Err(e) = open::that(&url) {
                warn!(error = %e, "could not open a browser, visit the URL manually");
            }
            callback::capture_redirect(*listen).await?
        }
        CaptureMode::Manual { .. } => callback::read_redirect_url().await?,
    };

    let code = callback::validate(params, &request.state)?;

    let stamped_at = now_millis();
    let response =
        token::exchange_code(client, client_id, &code, &request.redirect_uri, &request.verifier)
            .await?;

    info!("authorization complete");
    Ok(TokenRecord::from_response(response, stamped_at))
}
