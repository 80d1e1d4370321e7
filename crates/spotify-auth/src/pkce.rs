//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier and S256 challenge used during the OAuth
//! authorization flow, plus the anti-CSRF `state` value. The verifier is
//! held in memory for the lifetime of one authorization attempt and sent
//! during token exchange; the challenge is included in the authorization
//! URL so the accounts service can verify the exchange request came from
//! the same party that initiated the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use url::Url;

use crate::constants::AUTHORIZE_ENDPOINT;

/// Generate a cryptographically random PKCE code verifier.
///
/// Produces 96 random bytes encoded as URL-safe base64 (no padding),
/// yielding 128 characters — the top of RFC 7636's 43-128 range.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 96];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate the random `state` value for CSRF protection.
///
/// 15 random bytes → 20 base64url characters. The accounts service returns
/// it unchanged in the callback; the flow refuses to exchange the code if
/// it differs.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 15];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Ephemeral state for one authorization attempt.
///
/// Created when the flow starts, consumed when the authorization code is
/// exchanged for tokens, never persisted.
#[derive(Debug)]
pub struct AuthRequest {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
    pub redirect_uri: String,
}

impl AuthRequest {
    /// Generate a fresh verifier/challenge/state triple for the given
    /// redirect URI.
    pub fn generate(redirect_uri: String) -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: generate_state(),
            redirect_uri,
        }
    }

    /// Build the full authorization URL with all required OAuth parameters.
    ///
    /// `scope` is the space-joined scope string. Parameter encoding is
    /// handled by the `url` crate's query serializer.
    pub fn authorize_url(&self, client_id: &str, scope: &str) -> String {
        // AUTHORIZE_ENDPOINT is a compile-time constant, parsing cannot fail
        let mut url = Url::parse(AUTHORIZE_ENDPOINT).expect("valid authorize endpoint");
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &self.challenge)
            .append_pair("state", &self.state)
            .append_pair("scope", scope);
        url.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn verifier_is_url_safe_base64() {
        let verifier = generate_verifier();
        // 96 bytes → 128 base64url chars (no padding)
        assert_eq!(verifier.len(), 128);
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "verifier must be URL-safe base64 (no padding): {verifier}"
        );
    }

    #[test]
    fn verifiers_are_unique() {
        let a = generate_verifier();
        let b = generate_verifier();
        assert_ne!(a, b, "two verifiers must not collide");
    }

    #[test]
    fn state_is_short_and_url_safe() {
        let state = generate_state();
        assert_eq!(state.len(), 20);
        assert!(
            state
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "state must be URL-safe base64 (no padding): {state}"
        );
        assert_ne!(state, generate_state());
    }

    #[test]
    fn challenge_is_deterministic() {
        let verifier = "test-verifier-value";
        let c1 = compute_challenge(verifier);
        let c2 = compute_challenge(verifier);
        assert_eq!(c1, c2, "same verifier must produce same challenge");
    }

    #[test]
    fn challenge_is_url_safe_base64() {
        let challenge = compute_challenge("test-verifier");
        // SHA-256 produces 32 bytes → 43 base64url chars (no padding)
        assert_eq!(challenge.len(), 43);
        assert!(
            challenge
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "challenge must be URL-safe base64 (no padding): {challenge}"
        );
    }

    #[test]
    fn challenge_matches_known_value() {
        // Pre-computed: SHA256("hello") = 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
        // base64url of those 32 bytes = LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ
        let challenge = compute_challenge("hello");
        assert_eq!(challenge, "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ");
    }

    #[test]
    fn authorization_url_contains_required_params() {
        let request = AuthRequest::generate("http://127.0.0.1:1312/".into());
        let url = request.authorize_url("client-abc", "user-read-private playback");

        assert!(url.starts_with(AUTHORIZE_ENDPOINT));

        let parsed = Url::parse(&url).unwrap();
        let params: HashMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(params["client_id"], "client-abc");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:1312/");
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["code_challenge"], request.challenge);
        assert_eq!(params["state"], request.state);
        assert_eq!(params["scope"], "user-read-private playback");
    }

    #[test]
    fn generated_request_is_internally_consistent() {
        let request = AuthRequest::generate("http://127.0.0.1:1312/".into());
        assert_eq!(request.challenge, compute_challenge(&request.verifier));

        // Decode the challenge back to verify it's valid base64url
        let decoded = URL_SAFE_NO_PAD.decode(&request.challenge).expect("valid base64url");
        assert_eq!(decoded.len(), 32, "SHA-256 hash must be 32 bytes");
    }
}
