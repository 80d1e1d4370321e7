//! Authorization callback capture
//!
//! After the user approves the app, the accounts service redirects the
//! browser to the flow's redirect URI carrying `code` and `state` query
//! parameters (or `error` on denial). Two capture modes deliver those
//! parameters back to the flow:
//!
//! - [`CaptureMode::Auto`]: a loopback HTTP listener bound to the redirect
//!   URI's host/port accepts exactly one request, answers with a static
//!   confirmation page, and shuts down.
//! - [`CaptureMode::Manual`]: the user pastes the full redirect URL on the
//!   console and it is parsed locally. Useful when the process runs
//!   headless and the browser lives on another machine.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::Query;
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Page served to the browser once the callback has been captured.
const CONFIRMATION_PAGE: &str =
    "<html><body><h1>You may now close this tab.</h1></body></html>\n";

/// How the authorization callback reaches the process.
#[derive(Debug, Clone)]
pub enum CaptureMode {
    /// Bind a loopback listener and catch the redirect automatically.
    Auto { listen: SocketAddr },
    /// Print the URL and let the user paste the redirect URL back in.
    Manual { redirect_uri: String },
}

impl CaptureMode {
    /// The redirect URI to register with the authorization request.
    ///
    /// Must be byte-identical in the authorization URL and the token
    /// exchange, so both are derived from here.
    pub fn redirect_uri(&self) -> String {
        match self {
            CaptureMode::Auto { listen } => format!("http://{listen}/"),
            CaptureMode::Manual { redirect_uri } => redirect_uri.clone(),
        }
    }
}

/// Query parameters carried by the authorization callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Validate callback parameters against the state generated at flow start.
///
/// Returns the authorization code. An `error` field fails the attempt with
/// `AuthorizationDenied`; a state mismatch fails with `StateMismatch` and
/// no token exchange is ever attempted for it.
pub fn validate(params: CallbackParams, expected_state: &str) -> Result<String> {
    if let Some(error) = params.error {
        return Err(Error::AuthorizationDenied(error));
    }
    match params.state.as_deref() {
        Some(state) if state == expected_state => {}
        _ => return Err(Error::StateMismatch),
    }
    params
        .code
        .ok_or_else(|| Error::Callback("callback carried no authorization code".into()))
}

/// Bind the loopback listener and capture one authorization callback.
pub async fn capture_redirect(listen: SocketAddr) -> Result<CallbackParams> {
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| Error::Callback(format!("binding callback listener on {listen}: {e}")))?;
    info!(addr = %listen, "waiting for authorization callback");
    serve_one_callback(listener).await
}

/// Serve the confirmation page for exactly one request on an already-bound
/// listener, then shut down.
///
/// The first request to `/` wins; the graceful shutdown lets its response
/// finish and drops any lingering connections. Requests to other paths
/// (browser favicon probes) never reach the capture handler.
pub(crate) async fn serve_one_callback(listener: TcpListener) -> Result<CallbackParams> {
    let (tx, mut rx) = mpsc::channel::<CallbackParams>(1);
    let done = Arc::new(Notify::new());

    let app = Router::new().route(
        "/",
        get({
            let done = done.clone();
            move |Query(params): Query<CallbackParams>| {
                let tx = tx.clone();
                let done = done.clone();
                async move {
                    let _ = tx.try_send(params);
                    done.notify_one();
                    Html(CONFIRMATION_PAGE)
                }
            }
        }),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let done = done.clone();
            async move { done.notified().await }
        })
        .await
        .map_err(|e| Error::Callback(format!("callback listener failed: {e}")))?;

    debug!("callback listener closed");
    rx.recv()
        .await
        .ok_or_else(|| Error::Callback("listener closed before a callback arrived".into()))
}

/// Prompt on the console and parse the pasted redirect URL.
pub async fn read_redirect_url() -> Result<CallbackParams> {
    print!("Paste the full redirect URL here: ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    reader
        .read_line(&mut line)
        .await
        .map_err(|e| Error::Callback(format!("reading redirect URL from stdin: {e}")))?;
    parse_redirect_url(line.trim())
}

/// Extract callback parameters from a full redirect URL.
pub fn parse_redirect_url(raw: &str) -> Result<CallbackParams> {
    let url = url::Url::parse(raw)
        .map_err(|e| Error::Callback(format!("invalid redirect URL: {e}")))?;
    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(params)
}
