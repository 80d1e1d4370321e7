//! Player operations
//!
//! Thin wrappers over the dispatcher interpreting the player endpoints'
//! status conventions: 204 is success with no body, 200 carries a payload,
//! the upstream's transport anomaly status is surfaced as `Unreachable` so
//! callers may shrug it off, and anything else is a plain status failure.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatch::ApiResponse;
use crate::error::{Error, Result};
use crate::manager::SpotifyClient;

/// Status the upstream reports when it cannot be reached or resolved.
/// Not a real HTTP status; kept distinct from ordinary failures so callers
/// can ignore transient unreachability.
const UNREACHABLE_STATUS: u16 = 443;

/// What is playing right now — the plain data object handed to the
/// presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NowPlaying {
    pub track_name: String,
    pub track_artists: Vec<String>,
    pub playing: bool,
}

/// The slice of the currently-playing payload this system cares about.
#[derive(Debug, Deserialize)]
struct PlaybackPayload {
    item: Option<TrackItem>,
    #[serde(default)]
    is_playing: bool,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

impl SpotifyClient {
    /// Pause playback on the active device.
    pub async fn pause(&self) -> Result<()> {
        let response = self.call_api(Method::PUT, "/v1/me/player/pause", &[]).await?;
        interpret_command("pause", &response)
    }

    /// Resume playback on the active device.
    pub async fn play(&self) -> Result<()> {
        let response = self.call_api(Method::PUT, "/v1/me/player/play", &[]).await?;
        interpret_command("play", &response)
    }

    /// Skip to the next track.
    pub async fn next(&self) -> Result<()> {
        let response = self.call_api(Method::POST, "/v1/me/player/next", &[]).await?;
        interpret_command("next", &response)
    }

    /// Return to the previous track.
    pub async fn previous(&self) -> Result<()> {
        let response = self
            .call_api(Method::POST, "/v1/me/player/previous", &[])
            .await?;
        interpret_command("previous", &response)
    }

    /// What is currently playing, or `None` when nothing is (status 204).
    pub async fn currently_playing(&self) -> Result<Option<NowPlaying>> {
        let response = self
            .call_api(Method::GET, "/v1/me/player/currently-playing", &[])
            .await?;
        interpret_now_playing(response)
    }
}

fn interpret_command(operation: &'static str, response: &ApiResponse) -> Result<()> {
    match response.status {
        204 => {
            info!(operation, "playback command accepted");
            Ok(())
        }
        UNREACHABLE_STATUS => Err(Error::Unreachable(UNREACHABLE_STATUS)),
        status => Err(Error::Status { operation, status }),
    }
}

fn interpret_now_playing(response: ApiResponse) -> Result<Option<NowPlaying>> {
    match response.status {
        200 => {
            let data = response.data.ok_or(Error::Status {
                operation: "currently-playing",
                status: 200,
            })?;
            let payload: PlaybackPayload = serde_json::from_value(data)
                .map_err(|e| Error::Transport(format!("currently-playing: decoding body: {e}")))?;
            // item is null for ads and local gaps — report it as nothing
            // playing rather than failing the poll
            Ok(payload.item.map(|item| NowPlaying {
                track_name: item.name,
                track_artists: item.artists.into_iter().map(|a| a.name).collect(),
                playing: payload.is_playing,
            }))
        }
        204 => Ok(None),
        UNREACHABLE_STATUS => Err(Error::Unreachable(UNREACHABLE_STATUS)),
        status => Err(Error::Status {
            operation: "currently-playing",
            status,
        }),
    }
}
