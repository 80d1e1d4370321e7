//! Token lifecycle manager
//!
//! [`SpotifyClient`] owns one token record, one rate-limit window, and one
//! refresh task — all per-instance, so concurrent managers never clobber
//! each other. Construction obtains a usable token (stored, refreshed, or
//! freshly authorized), persists it, and arms the refresh scheduler; the
//! `connect` future resolving is the "ready" signal.
//!
//! The scheduler is a single re-armed loop: it sleeps until five minutes
//! before expiry (immediately for an already-expired token), refreshes,
//! persists, swaps the in-memory record, and re-arms. Transient refresh
//! failures back off exponentially; a rejected refresh token stops the
//! scheduler for good since only a new interactive authorization can
//! recover from it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use spotify_auth::callback::CaptureMode;
use spotify_auth::constants::API_BASE;
use spotify_auth::credentials::{self, TokenRecord, now_millis, required_scopes};
use spotify_auth::{flow, token};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{Error, Result};

/// Refresh this long before the access token expires.
const REFRESH_LEAD: Duration = Duration::from_secs(5 * 60);

/// Timeout applied to every HTTP request the manager makes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// First retry delay after a transient refresh failure.
const RETRY_BACKOFF_INITIAL: Duration = Duration::from_secs(30);

/// Retry delays double up to this ceiling.
const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(480);

/// Construction parameters for [`SpotifyClient::connect`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The registered app's client ID (public, not a secret under PKCE)
    pub client_id: String,
    /// Where the token record is persisted
    pub auth_file: PathBuf,
    /// Requested scopes; the baseline pair is folded in automatically
    pub scopes: Vec<String>,
    /// How the authorization callback reaches the process
    pub capture: CaptureMode,
    /// Discard any stored credential and reauthorize interactively
    pub force_reauth: bool,
}

/// Shared state owned by one manager instance.
pub(crate) struct Inner {
    pub(crate) client_id: String,
    pub(crate) auth_path: PathBuf,
    pub(crate) api_base: String,
    pub(crate) http: reqwest::Client,
    pub(crate) token: RwLock<TokenRecord>,
    /// Unix ms before which the dispatcher refuses to issue requests.
    /// Not persisted — resets to 0 on restart.
    pub(crate) no_requests_before: AtomicU64,
    pub(crate) ended: AtomicBool,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

/// Manager for one authorized Spotify session.
///
/// Cheap to clone-by-Arc internally but deliberately not `Clone`: the
/// instance that called `connect` owns the lifecycle and is the one that
/// should call [`SpotifyClient::end`].
pub struct SpotifyClient {
    pub(crate) inner: Arc<Inner>,
}

impl SpotifyClient {
    /// Obtain a usable token and arm the refresh scheduler.
    ///
    /// Resolution order: a stored record that validates against the
    /// required scope set is used as-is (refreshed first when it is past
    /// or within five minutes of expiry); anything else falls back to the
    /// interactive PKCE flow. The record is persisted before this returns.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let scopes = required_scopes(config.scopes.iter().cloned());
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("building HTTP client: {e}")))?;

        let stored = if config.force_reauth {
            info!("forced reauthorization requested, ignoring any stored credential");
            None
        } else {
            match credentials::load(&config.auth_file, &scopes).await {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "no usable stored credential, starting new authorization");
                    None
                }
            }
        };

        let record = match stored {
            Some(record) if !refresh_delay(record.expires_at, now_millis()).is_zero() => {
                info!("initialized from stored credential");
                record
            }
            Some(record) => {
                info!("stored access token at or near expiry, refreshing");
                let stamped_at = now_millis();
                match token::refresh(&http, &config.client_id, &record.refresh_token).await {
                    Ok(response) => {
                        let record = TokenRecord::from_response(response, stamped_at);
                        credentials::save(&config.auth_file, &record).await?;
                        record
                    }
                    Err(spotify_auth::Error::InvalidRefreshToken(msg)) => {
                        warn!(error = %msg, "stored refresh token rejected, reauthorizing");
                        Self::authorize_and_save(&http, &config, &scopes).await?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            None => Self::authorize_and_save(&http, &config, &scopes).await?,
        };

        let inner = Arc::new(Inner {
            client_id: config.client_id,
            auth_path: config.auth_file,
            api_base: API_BASE.to_owned(),
            http,
            token: RwLock::new(record),
            no_requests_before: AtomicU64::new(0),
            ended: AtomicBool::new(false),
            refresh_task: Mutex::new(None),
        });

        let handle = spawn_refresh_task(&inner);
        if let Ok(mut slot) = inner.refresh_task.lock() {
            *slot = Some(handle);
        }

        info!("client ready, first refresh armed");
        Ok(Self { inner })
    }

    async fn authorize_and_save(
        http: &reqwest::Client,
        config: &ClientConfig,
        scopes: &std::collections::BTreeSet<String>,
    ) -> Result<TokenRecord> {
        let record = flow::authorize(http, &config.client_id, scopes, &config.capture).await?;
        credentials::save(&config.auth_file, &record).await?;
        Ok(record)
    }

    /// Stop all scheduled activity.
    ///
    /// Cancels the pending refresh timer; in-flight HTTP requests are not
    /// cancelled. The manager is terminal afterwards — every subsequent
    /// API call returns [`Error::Terminated`]. Idempotent.
    pub fn end(&self) {
        self.inner.ended.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.inner.refresh_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
                info!("refresh scheduler stopped");
            }
        }
    }

    /// Snapshot of the current access token's absolute expiry (unix ms).
    pub async fn token_expires_at(&self) -> u64 {
        self.inner.token.read().await.expires_at
    }

    #[cfg(test)]
    pub(crate) fn for_tests(api_base: String, record: TokenRecord) -> Self {
        Self {
            inner: Arc::new(Inner {
                client_id: "test-client".into(),
                auth_path: PathBuf::from("unused-in-tests"),
                api_base,
                http: reqwest::Client::new(),
                token: RwLock::new(record),
                no_requests_before: AtomicU64::new(0),
                ended: AtomicBool::new(false),
                refresh_task: Mutex::new(None),
            }),
        }
    }
}

/// Time until the refresh for a token expiring at `expires_at` should fire.
///
/// `expires_at - now - 5min`, floored at zero so a past-due token
/// refreshes immediately rather than scheduling into the past.
pub(crate) fn refresh_delay(expires_at: u64, now: u64) -> Duration {
    let lead = REFRESH_LEAD.as_millis() as u64;
    Duration::from_millis(expires_at.saturating_sub(now).saturating_sub(lead))
}

/// Spawn the per-instance refresh loop.
///
/// The task holds only a weak reference: dropping the manager without
/// calling `end()` still lets the task exit at its next wake-up instead of
/// keeping the state alive forever.
fn spawn_refresh_task(inner: &Arc<Inner>) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    tokio::spawn(async move {
        let mut backoff = RETRY_BACKOFF_INITIAL;
        loop {
            // Snapshot what the sleep needs, then release the Arc so a
            // dropped manager is detected at the next upgrade.
            let (expires_at, refresh_token) = match weak.upgrade() {
                Some(inner) => {
                    let token = inner.token.read().await;
                    (token.expires_at, token.refresh_token.clone())
                }
                None => return,
            };

            tokio::time::sleep(refresh_delay(expires_at, now_millis())).await;

            let Some(inner) = weak.upgrade() else { return };

            let stamped_at = now_millis();
            match token::refresh(&inner.http, &inner.client_id, &refresh_token).await {
                Ok(response) => {
                    let record = TokenRecord::from_response(response, stamped_at);
                    let expires_at = record.expires_at;
                    if let Err(e) = credentials::save(&inner.auth_path, &record).await {
                        // The in-memory token is still good; keep serving
                        warn!(error = %e, "failed to persist refreshed token");
                    }
                    *inner.token.write().await = record;
                    backoff = RETRY_BACKOFF_INITIAL;
                    info!(expires_at, "access token refreshed");
                }
                Err(spotify_auth::Error::InvalidRefreshToken(msg)) => {
                    error!(
                        error = %msg,
                        "refresh token rejected, stopping scheduler; reauthorization required"
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_secs = backoff.as_secs(),
                        "token refresh failed, backing off"
                    );
                    drop(inner);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RETRY_BACKOFF_MAX);
                }
            }
        }
    })
}
