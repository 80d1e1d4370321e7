//! Credential storage for the OAuth token record
//!
//! One JSON file holds one six-field token record. The manager that owns
//! the record overwrites the file wholesale on every acquisition and
//! refresh; there are no partial updates and no concurrent writers. All
//! writes use atomic temp-file + rename to prevent corruption on crash.
//!
//! Loading validates structure and scope before the record is trusted:
//! any missing field, parse failure, or scope-set mismatch is reported as
//! `InvalidStoredCredential`, which callers treat as "reauthorize", never
//! as fatal.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::BASELINE_SCOPES;
use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// The persisted credential bundle.
///
/// Extends [`TokenResponse`] with `expires_at`, an absolute unix timestamp
/// in milliseconds. `expires_at` is always computed at stamping time from
/// the request-start time plus `expires_in`; the token endpoint does not
/// supply it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub token_type: String,
    /// Seconds of validity reported at grant time (kept verbatim)
    pub expires_in: u64,
    pub refresh_token: String,
    /// Space-delimited scope names granted
    pub scope: String,
    /// Absolute expiry as unix timestamp in milliseconds, computed locally
    pub expires_at: u64,
}

impl TokenRecord {
    /// Stamp a token response into a record.
    ///
    /// `stamped_at` is the unix millisecond timestamp captured immediately
    /// before the token request was sent, so the computed expiry errs on
    /// the early side.
    pub fn from_response(response: TokenResponse, stamped_at: u64) -> Self {
        Self {
            expires_at: stamped_at + response.expires_in * 1000,
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
            scope: response.scope,
        }
    }

    /// The granted scopes as a set.
    pub fn scope_set(&self) -> BTreeSet<String> {
        self.scope.split_whitespace().map(str::to_owned).collect()
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The scope set a stored credential must carry for a given request.
///
/// The accounts service adds the two baseline scopes on every refresh no
/// matter what was asked for, so they are folded in here — both for the
/// authorization request and for validating stored records.
pub fn required_scopes<I, S>(requested: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut scopes: BTreeSet<String> = requested.into_iter().map(Into::into).collect();
    for scope in BASELINE_SCOPES {
        scopes.insert((*scope).to_owned());
    }
    scopes
}

/// Load and validate a stored token record.
///
/// Fails with `InvalidStoredCredential` if the file is unreadable, any of
/// the six fields is absent, or the stored scope set is not exactly equal
/// to `required` — a missing scope means the token can't do what the
/// caller needs, an extra one means the caller's request changed.
pub async fn load(path: &Path, required: &BTreeSet<String>) -> Result<TokenRecord> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::InvalidStoredCredential(format!("reading {}: {e}", path.display())))?;

    let record: TokenRecord = serde_json::from_str(&contents)
        .map_err(|e| Error::InvalidStoredCredential(format!("parsing {}: {e}", path.display())))?;

    let stored = record.scope_set();
    if stored != *required {
        let missing: Vec<String> = required.difference(&stored).cloned().collect();
        let extra: Vec<String> = stored.difference(required).cloned().collect();
        return Err(Error::InvalidStoredCredential(format!(
            "scope set changed (missing: [{}], extra: [{}])",
            missing.join(" "),
            extra.join(" ")
        )));
    }

    debug!(path = %path.display(), "loaded stored credential");
    Ok(record)
}

/// Persist a token record, overwriting any previous file.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target, so a crash mid-write never leaves a truncated record.
/// File permissions are set to 0600 since the file contains live tokens.
pub async fn save(path: &Path, record: &TokenRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::Io(format!("serializing credential: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("auth file path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".auth.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp auth file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting auth file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp auth file: {e}")))?;

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_response() -> TokenResponse {
        TokenResponse {
            access_token: "at_1".into(),
            token_type: "Bearer".into(),
            expires_in: 3600,
            refresh_token: "rt_1".into(),
            scope: "user-read-private user-read-email playback".into(),
        }
    }

    fn test_record() -> TokenRecord {
        TokenRecord::from_response(test_response(), 1_700_000_000_000)
    }

    #[test]
    fn expires_at_is_stamped_locally() {
        let record = TokenRecord::from_response(test_response(), 1_700_000_000_000);
        assert_eq!(record.expires_at, 1_700_000_000_000 + 3600 * 1000);
        assert_eq!(record.expires_in, 3600, "raw delta is kept verbatim");
    }

    #[test]
    fn required_scopes_always_include_baseline() {
        let scopes = required_scopes(["playback"]);
        assert!(scopes.contains("playback"));
        assert!(scopes.contains("user-read-private"));
        assert!(scopes.contains("user-read-email"));
        assert_eq!(scopes.len(), 3);
    }

    #[test]
    fn required_scopes_deduplicate() {
        let scopes = required_scopes(["user-read-private", "user-read-private"]);
        assert_eq!(scopes.len(), 2);
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");

        let record = test_record();
        save(&path, &record).await.unwrap();

        let loaded = load(&path, &required_scopes(["playback"])).await.unwrap();
        assert_eq!(loaded.access_token, "at_1");
        assert_eq!(loaded.refresh_token, "rt_1");
        assert_eq!(loaded.expires_at, record.expires_at);
    }

    #[tokio::test]
    async fn load_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");

        let err = load(&path, &required_scopes(["playback"])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidStoredCredential(_)));
    }

    #[tokio::test]
    async fn load_rejects_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = load(&path, &required_scopes(["playback"])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidStoredCredential(_)));
    }

    #[tokio::test]
    async fn load_rejects_any_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let required = required_scopes(["playback"]);
        let full = serde_json::to_value(test_record()).unwrap();

        for field in [
            "access_token",
            "token_type",
            "expires_in",
            "refresh_token",
            "scope",
            "expires_at",
        ] {
            let mut partial = full.as_object().unwrap().clone();
            partial.remove(field);

            let path = dir.path().join(format!("auth-{field}.json"));
            tokio::fs::write(&path, serde_json::Value::Object(partial).to_string())
                .await
                .unwrap();

            let err = load(&path, &required).await.unwrap_err();
            assert!(
                matches!(err, Error::InvalidStoredCredential(_)),
                "record without {field} must be invalid"
            );
        }
    }

    #[tokio::test]
    async fn load_rejects_missing_scope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        save(&path, &test_record()).await.unwrap();

        // Caller now also wants a scope the stored token never had
        let err = load(&path, &required_scopes(["playback", "library-read"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStoredCredential(msg) if msg.contains("library-read")));
    }

    #[tokio::test]
    async fn load_rejects_extra_scope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        save(&path, &test_record()).await.unwrap();

        // Stored token carries "playback" the caller no longer requests
        let err = load(&path, &required_scopes(Vec::<String>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStoredCredential(msg) if msg.contains("playback")));
    }

    #[tokio::test]
    async fn load_accepts_exact_scope_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        save(&path, &test_record()).await.unwrap();

        // Stored scope is "user-read-private user-read-email playback";
        // requesting just "playback" matches once the baseline is folded in.
        let loaded = load(&path, &required_scopes(["playback"])).await.unwrap();
        assert_eq!(loaded.access_token, "at_1");
    }

    #[tokio::test]
    async fn save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");

        save(&path, &test_record()).await.unwrap();

        let mut refreshed = test_record();
        refreshed.access_token = "at_2".into();
        refreshed.expires_at += 3_600_000;
        save(&path, &refreshed).await.unwrap();

        let loaded = load(&path, &required_scopes(["playback"])).await.unwrap();
        assert_eq!(loaded.access_token, "at_2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn auth_file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        save(&path, &test_record()).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "auth file must be 0600, got {mode:o}");
    }

    #[test]
    fn scope_set_splits_on_whitespace() {
        let record = test_record();
        let scopes = record.scope_set();
        assert_eq!(scopes.len(), 3);
        assert!(scopes.contains("playback"));
    }
}
