//! The seam between the playback session and a concrete player process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

/// Where the player routes audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
  Hdmi,
  Local,
  #[default]
  Both,
}

/// Options for starting a process or swapping its source.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
  /// Media to play. `None` starts the player idle.
  pub source: Option<String>,
  /// Separate audio track played alongside a video-only `source`.
  pub audio_source: Option<String>,
  pub looping: bool,
  pub output: OutputMode,
  pub suppress_osd: bool,
}

/// A controllable external player.
///
/// Time values are in microseconds and volume is linear (1.0 = 100%).
/// Implementations perform I/O on every call; nothing is cached here.
#[async_trait]
pub trait PlayerBackend: Send + Sync {
  /// Start the process. The returned token is cancelled when it terminates.
  async fn launch(&self, opts: &LaunchOptions) -> Result<CancellationToken, BackendError>;

  /// Swap the playing media on the running process.
  async fn load(&self, opts: &LaunchOptions) -> Result<(), BackendError>;

  async fn duration_us(&self) -> Result<i64, BackendError>;

  async fn position_us(&self) -> Result<i64, BackendError>;

  async fn is_paused(&self) -> Result<bool, BackendError>;

  async fn volume(&self) -> Result<f64, BackendError>;

  async fn play(&self) -> Result<(), BackendError>;

  async fn pause(&self) -> Result<(), BackendError>;

  /// Seek relative to the current position.
  async fn seek_us(&self, offset_us: i64) -> Result<(), BackendError>;

  async fn set_position_us(&self, position_us: i64) -> Result<(), BackendError>;

  async fn set_volume(&self, volume: f64) -> Result<(), BackendError>;

  /// Add `delta` to the current volume inside the process.
  async fn step_volume(&self, delta: f64) -> Result<(), BackendError>;

  async fn quit(&self) -> Result<(), BackendError>;
}
