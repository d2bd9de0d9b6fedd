//! Playback state shared with observers.

use serde::{Deserialize, Serialize};

/// Observer-visible playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackStatus {
  #[default]
  Stopped,
  Playing,
  Paused,
}

/// Descriptive metadata of the media being cast.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastMeta {
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub thumbnail: String,
  /// Playable URL handed to the player.
  #[serde(rename = "url")]
  pub source_url: String,
  /// Audio track for video-only sources. Not sent to observers.
  #[serde(skip)]
  pub audio_url: Option<String>,
}

/// Snapshot returned by `initialState` and by a successful `cast`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialState {
  pub is_pending: bool,
  pub status: PlaybackStatus,
  pub meta: Option<CastMeta>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub volume: Option<f64>,
}
