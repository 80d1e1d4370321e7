//! Rate-limited API dispatch
//!
//! Every remote call funnels through [`SpotifyClient::call_api`], which
//! injects the bearer token and honors the provider's rate-limit window:
//! a 429 response opens a window during which every call short-circuits to
//! a synthetic 429 without touching the network. The window is a single
//! atomic timestamp, so concurrent calls observe either the pre- or
//! post-update value and nothing in between.

use std::sync::atomic::Ordering;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde_json::Value;
use spotify_auth::credentials::now_millis;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::manager::SpotifyClient;

/// Outcome of one dispatched API call.
///
/// A 429 — synthetic or real — is a normal response, not an error:
/// `retry_at` carries the unix ms timestamp before which further calls
/// will be short-circuited.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Response body when it parsed as JSON, `None` otherwise
    pub data: Option<Value>,
    /// Present exactly when `status` is 429
    pub retry_at: Option<u64>,
}

impl SpotifyClient {
    /// Perform one authenticated API call against the resource API.
    ///
    /// Short-circuits inside an open rate-limit window. A response status
    /// of exactly 429 reads the `retry-after` header (seconds) and opens a
    /// new window; the window persists across calls until it elapses.
    pub async fn call_api(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let inner = &self.inner;
        if inner.ended.load(Ordering::SeqCst) {
            return Err(Error::Terminated);
        }

        let window = inner.no_requests_before.load(Ordering::Relaxed);
        if now_millis() < window {
            debug!(endpoint, retry_at = window, "inside rate-limit window, skipping request");
            return Ok(ApiResponse {
                status: 429,
                data: None,
                retry_at: Some(window),
            });
        }

        let auth_header = {
            let token = inner.token.read().await;
            format!("{} {}", token.token_type, token.access_token)
        };

        let url = format!("{}{}", inner.api_base, endpoint);
        let mut request = inner.http.request(method, &url);
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = request
            .header(AUTHORIZATION, auth_header)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{endpoint}: {e}")))?;

        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let text = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("{endpoint}: reading body: {e}")))?;
        let data: Option<Value> = serde_json::from_str(&text).ok();

        let retry_at = if status == 429 {
            let secs = retry_after_secs.unwrap_or(1);
            let window = now_millis() + secs * 1000;
            inner.no_requests_before.store(window, Ordering::Relaxed);
            warn!(endpoint, retry_after_secs = secs, "rate limited, throttling until window elapses");
            Some(window)
        } else {
            None
        };

        Ok(ApiResponse { status, data, retry_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::routing::get;
    use spotify_auth::credentials::TokenRecord;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    fn test_record() -> TokenRecord {
        TokenRecord {
            access_token: "at_test".into(),
            token_type: "Bearer".into(),
            expires_in: 3600,
            refresh_token: "rt_test".into(),
            scope: "user-read-private user-read-email".into(),
            expires_at: 4_102_444_800_000,
        }
    }

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn open_window_short_circuits_without_network() {
        // api_base points at a closed port: any real dispatch would fail
        // with a transport error, so an Ok(429) proves no call was made.
        let client = SpotifyClient::for_tests("http://127.0.0.1:1".into(), test_record());
        let window = now_millis() + 60_000;
        client
            .inner
            .no_requests_before
            .store(window, Ordering::Relaxed);

        let response = client
            .call_api(Method::GET, "/v1/me/player/currently-playing", &[])
            .await
            .unwrap();

        assert_eq!(response.status, 429);
        assert!(response.data.is_none());
        assert_eq!(response.retry_at, Some(window));
    }

    #[tokio::test]
    async fn elapsed_window_dispatches_again() {
        let app = Router::new().route("/v1/ping", get(|| async { "{\"ok\":true}" }));
        let base = serve(app).await;

        let client = SpotifyClient::for_tests(base, test_record());
        // Window already in the past — must not block the call
        client
            .inner
            .no_requests_before
            .store(now_millis().saturating_sub(1000), Ordering::Relaxed);

        let response = client.call_api(Method::GET, "/v1/ping", &[]).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.data.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn real_429_opens_window_and_subsequent_calls_short_circuit() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            "/v1/limited",
            get({
                let hits = hits.clone();
                move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        (
                            StatusCode::TOO_MANY_REQUESTS,
                            [(header::RETRY_AFTER, "30")],
                            "slow down",
                        )
                    }
                }
            }),
        );
        let base = serve(app).await;
        let client = SpotifyClient::for_tests(base, test_record());

        let before = now_millis();
        let first = client.call_api(Method::GET, "/v1/limited", &[]).await.unwrap();
        assert_eq!(first.status, 429);
        assert!(first.data.is_none(), "non-JSON body must yield no data");
        let retry_at = first.retry_at.unwrap();
        assert!(
            retry_at >= before + 30_000 && retry_at <= now_millis() + 30_000,
            "window must be ~30s out, got {retry_at}"
        );

        // Calls inside the window never reach the server
        for _ in 0..3 {
            let synthetic = client.call_api(Method::GET, "/v1/limited", &[]).await.unwrap();
            assert_eq!(synthetic.status, 429);
            assert_eq!(synthetic.retry_at, Some(retry_at));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1, "only the first call hits the network");
    }

    #[tokio::test]
    async fn bearer_token_and_query_params_are_sent() {
        let app = Router::new().route(
            "/v1/echo",
            get(|headers: HeaderMap, axum::extract::RawQuery(query): axum::extract::RawQuery| async move {
                let auth = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_owned();
                axum::Json(serde_json::json!({
                    "auth": auth,
                    "query": query.unwrap_or_default(),
                }))
            }),
        );
        let base = serve(app).await;
        let client = SpotifyClient::for_tests(base, test_record());

        let response = client
            .call_api(Method::GET, "/v1/echo", &[("market", "from_token")])
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let data = response.data.unwrap();
        assert_eq!(data["auth"], "Bearer at_test");
        assert_eq!(data["query"], "market=from_token");
        assert!(response.retry_at.is_none());
    }

    #[tokio::test]
    async fn non_json_body_yields_no_data() {
        let app = Router::new().route("/v1/html", get(|| async { "<html>not json</html>" }));
        let base = serve(app).await;
        let client = SpotifyClient::for_tests(base, test_record());

        let response = client.call_api(Method::GET, "/v1/html", &[]).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let client = SpotifyClient::for_tests("http://127.0.0.1:1".into(), test_record());
        let err = client
            .call_api(Method::GET, "/v1/anything", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
