//! Configuration types and loading
//!
//! Config resolution: `--config` CLI flag > `SPOTBOX_CONFIG` env var >
//! `spotbox.toml` in the working directory. The client ID is public under
//! PKCE, so it lives in the TOML; the tokens themselves only ever live in
//! the auth file the client manages.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use spotify_client::CaptureMode;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Spotify app and credential settings
#[derive(Debug, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub auth_file: PathBuf,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub force_reauth: bool,
}

/// How the authorization callback is captured
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    pub mode: CaptureKind,
    pub listen_addr: SocketAddr,
    /// Redirect URI registered with the app; manual mode only
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Auto,
    Manual,
}

/// Poll loop settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub poll_interval_secs: u64,
}

fn default_scopes() -> Vec<String> {
    vec![
        "user-read-playback-state".into(),
        "user-modify-playback-state".into(),
    ]
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            mode: CaptureKind::Auto,
            listen_addr: "127.0.0.1:1312".parse().expect("valid default listen addr"),
            redirect_uri: None,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;

        if config.spotify.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("client_id must not be empty".into()));
        }

        if config.daemon.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        if config.callback.mode == CaptureKind::Manual && config.callback.redirect_uri.is_none() {
            return Err(ConfigError::Invalid(
                "manual callback mode requires redirect_uri".into(),
            ));
        }

        Ok(config)
    }

    /// The capture mode handed to the client.
    pub fn capture_mode(&self) -> CaptureMode {
        match self.callback.mode {
            CaptureKind::Auto => CaptureMode::Auto {
                listen: self.callback.listen_addr,
            },
            CaptureKind::Manual => CaptureMode::Manual {
                // Presence is validated in parse()
                redirect_uri: self.callback.redirect_uri.clone().unwrap_or_default(),
            },
        }
    }

    /// Resolve config file path from CLI arg or SPOTBOX_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("SPOTBOX_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("spotbox.toml")
    }
}
