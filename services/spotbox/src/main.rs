//! Spotbox daemon
//!
//! Connects a Spotify client, then runs two input sources until Ctrl-C:
//! a now-playing poll that logs playback transitions, and a line-based
//! console remote (next / prev / toggle) standing in where hardware
//! buttons would be wired. The LCD and GPIO collaborators consume the
//! same `NowPlaying` data object this daemon logs.

mod config;

use std::time::Duration;

use anyhow::{Context, Result};
use spotify_client::{ClientConfig, Error as ClientError, NowPlaying, SpotifyClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting spotbox");

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let capture = config.capture_mode();
    let client = SpotifyClient::connect(ClientConfig {
        client_id: config.spotify.client_id.clone(),
        auth_file: config.spotify.auth_file.clone(),
        scopes: config.spotify.scopes.clone(),
        capture,
        force_reauth: config.spotify.force_reauth,
    })
    .await
    .context("failed to initialize the Spotify client")?;

    info!("api initialized");
    run(&client, Duration::from_secs(config.daemon.poll_interval_secs)).await;

    client.end();
    info!("bye");
    Ok(())
}

/// Poll now-playing and process console commands until Ctrl-C.
async fn run(client: &SpotifyClient, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut previous: Option<NowPlaying> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return;
            }
            _ = ticker.tick() => {
                match client.currently_playing().await {
                    Ok(current) => {
                        report_transition(&previous, &current);
                        previous = current;
                    }
                    Err(ClientError::Unreachable(status)) => {
                        warn!(status, "Spotify unreachable, carrying on");
                    }
                    Err(e) => warn!(error = %e, "now-playing poll failed"),
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(command)) => handle_command(client, command.trim()).await,
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!(error = %e, "stdin closed");
                        stdin_open = false;
                    }
                }
            }
        }
    }
}

/// Log playback state transitions between two poll cycles.
fn report_transition(previous: &Option<NowPlaying>, current: &Option<NowPlaying>) {
    match (previous, current) {
        (None, None) => {}
        (Some(_), None) => info!("nothing playing"),
        (None, Some(now)) => {
            info!(
                track = %now.track_name,
                artists = %now.track_artists.join(", "),
                playing = now.playing,
                "now playing"
            );
        }
        (Some(prev), Some(now)) => {
            if prev.track_name != now.track_name {
                info!(
                    track = %now.track_name,
                    artists = %now.track_artists.join(", "),
                    "track changed"
                );
            } else if prev.playing && !now.playing {
                info!(track = %now.track_name, "playback paused");
            } else if !prev.playing && now.playing {
                info!(track = %now.track_name, "playback resumed");
            }
        }
    }
}

/// Dispatch one console command, standing in for a hardware button press.
async fn handle_command(client: &SpotifyClient, command: &str) {
    let result = match command {
        "next" | "n" => client.next().await,
        "prev" | "b" => client.previous().await,
        "toggle" | "p" => toggle_playback(client).await,
        "" => return,
        other => {
            warn!(command = other, "unknown command (next, prev, toggle)");
            return;
        }
    };

    match result {
        Ok(()) => {}
        Err(ClientError::Unreachable(status)) => {
            warn!(status, "Spotify unreachable, command ignored");
        }
        Err(e) => warn!(error = %e, "playback command failed"),
    }
}

/// Pause when playing, resume when paused, based on a fresh poll.
async fn toggle_playback(client: &SpotifyClient) -> spotify_client::Result<()> {
    match client.currently_playing().await? {
        Some(now) if now.playing => client.pause().await,
        Some(_) => client.play().await,
        None => {
            info!("nothing playing to toggle");
            Ok(())
        }
    }
}
