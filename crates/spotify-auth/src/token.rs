//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (initial PKCE flow completion)
//! 2. Token refresh (startup and scheduled refresh)
//!
//! Both operations POST form-encoded bodies to `TOKEN_ENDPOINT` with
//! different grant types. Neither retries — the refresh scheduler owns
//! retry policy, and the initial exchange surfaces failures to the caller.

use serde::{Deserialize, Serialize};

use crate::constants::TOKEN_ENDPOINT;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time. The caller
/// converts this to an absolute unix millisecond timestamp when building
/// the stored [`crate::TokenRecord`] — the endpoint never supplies an
/// absolute expiry itself.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Token scheme for the Authorization header, in practice "Bearer"
    pub token_type: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    pub refresh_token: String,
    /// Space-delimited scope names actually granted
    pub scope: String,
}

/// Exchange an authorization code for tokens (initial PKCE flow).
///
/// The user has authorized in their browser and the callback delivered the
/// authorization code. The PKCE verifier proves we initiated the flow; the
/// redirect URI must match the one sent in the authorization URL.
pub async fn exchange_code(
    client: &reqwest::Client,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("client_id", client_id),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Refresh an access token using a refresh token.
///
/// Called at startup when the stored token is near expiry and by the
/// refresh scheduler for the lifetime of the manager.
pub async fn refresh(
    client: &reqwest::Client,
    client_id: &str,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("client_id", client_id),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(classify_refresh_failure(status.as_u16(), &body));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

/// Map a non-success refresh status to the right error variant.
///
/// 400 with `invalid_grant` and 401/403 mean the refresh token is revoked
/// or invalid — the scheduler must stop retrying and the user has to
/// reauthorize. Everything else is a plain exchange failure.
fn classify_refresh_failure(status: u16, body: &str) -> Error {
    let revoked = matches!(status, 401 | 403)
        || (status == 400 && body.contains("invalid_grant"));
    if revoked {
        Error::InvalidRefreshToken(format!("token endpoint returned {status}: {body}"))
    } else {
        Error::TokenExchange(format!("token refresh returned {status}: {body}"))
    }
}
