//! Application configuration loaded from a JSON file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::player::{OutputMode, SessionConfig};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
  /// Address the WebSocket server binds to.
  #[serde(default = "default_listen_addr")]
  pub listen_addr: String,

  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Additional MPV command-line arguments.
  #[serde(default)]
  pub mpv_args: Vec<String>,

  /// Unix socket used for the MPV JSON IPC.
  #[serde(default = "default_ipc_socket")]
  pub ipc_socket: String,

  /// Media looped while a cast is loading. None = start the player idle.
  #[serde(default = "default_placeholder_source")]
  pub placeholder_source: Option<String>,

  #[serde(default)]
  pub output: OutputMode,

  #[serde(default = "default_true")]
  pub suppress_osd: bool,

  /// Loop the cast media itself.
  #[serde(default)]
  pub loop_playback: bool,

  /// Wait after spawning MPV before it is considered ready.
  #[serde(default = "default_settle_delay_ms")]
  pub settle_delay_ms: u64,

  /// Position push interval per observer.
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,

  /// Linear step for increaseVolume / decreaseVolume (1.0 = 100%).
  #[serde(default = "default_volume_step")]
  pub volume_step: f64,

  /// Custom youtube-dl executable path (None = auto-detect).
  #[serde(default)]
  pub youtube_dl_path: Option<String>,

  #[serde(default = "default_youtube_dl_format")]
  pub youtube_dl_format: String,

  /// Drive the local console (clear while playing, show address when idle).
  #[serde(default)]
  pub screen_enabled: bool,

  /// One of off, error, warn, info, debug, trace.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

fn default_listen_addr() -> String {
  "0.0.0.0:8181".to_string()
}

fn default_ipc_socket() -> String {
  "/tmp/raspicast-mpv.sock".to_string()
}

fn default_placeholder_source() -> Option<String> {
  Some("assets/loading-screen.mp4".to_string())
}

fn default_true() -> bool {
  true
}

fn default_settle_delay_ms() -> u64 {
  5000
}

fn default_poll_interval_ms() -> u64 {
  1000
}

fn default_volume_step() -> f64 {
  0.1
}

fn default_youtube_dl_format() -> String {
  "bestvideo[ext!=webm]+bestaudio[ext!=webm]/best[ext!=webm]".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      listen_addr: default_listen_addr(),
      mpv_path: None,
      mpv_args: Vec::new(),
      ipc_socket: default_ipc_socket(),
      placeholder_source: default_placeholder_source(),
      output: OutputMode::default(),
      suppress_osd: default_true(),
      loop_playback: false,
      settle_delay_ms: default_settle_delay_ms(),
      poll_interval_ms: default_poll_interval_ms(),
      volume_step: default_volume_step(),
      youtube_dl_path: None,
      youtube_dl_format: default_youtube_dl_format(),
      screen_enabled: false,
      log_level: default_log_level(),
    }
  }
}

/// Treat empty strings in optional paths as unset.
fn non_empty(value: &Option<String>) -> Option<PathBuf> {
  value
    .as_ref()
    .filter(|s| !s.trim().is_empty())
    .map(PathBuf::from)
}

impl AppConfig {
  /// Default location: `<config dir>/raspicast/config.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("raspicast").join("config.json"))
  }

  /// Load and validate. A missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let config = match std::fs::read_to_string(path) {
      Ok(text) => serde_json::from_str(&text)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::info!("No config at {}, using defaults", path.display());
        Self::default()
      }
      Err(e) => return Err(e.into()),
    };
    config.validate()?;
    Ok(config)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

    if self.listen_addr.parse::<SocketAddr>().is_err() {
      return invalid("Listen address must be a socket address such as 0.0.0.0:8181");
    }
    if !(100..=60_000).contains(&self.poll_interval_ms) {
      return invalid("Poll interval must be between 100 and 60000 ms");
    }
    if self.settle_delay_ms > 60_000 {
      return invalid("Settle delay cannot exceed 60000 ms");
    }
    if !(self.volume_step > 0.0 && self.volume_step <= 1.0) {
      return invalid("Volume step must be in (0, 1]");
    }
    if self.log_level().is_none() {
      return invalid("Log level must be one of off, error, warn, info, debug, trace");
    }
    Ok(())
  }

  pub fn log_level(&self) -> Option<log::LevelFilter> {
    self.log_level.parse().ok()
  }

  pub fn mpv_path(&self) -> Option<PathBuf> {
    non_empty(&self.mpv_path)
  }

  pub fn youtube_dl_path(&self) -> Option<PathBuf> {
    non_empty(&self.youtube_dl_path)
  }

  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms)
  }

  pub fn session_config(&self) -> SessionConfig {
    SessionConfig {
      placeholder: self
        .placeholder_source
        .clone()
        .filter(|s| !s.trim().is_empty()),
      output: self.output,
      suppress_osd: self.suppress_osd,
      looping: self.loop_playback,
      settle_delay: Duration::from_millis(self.settle_delay_ms),
      volume_step: self.volume_step,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.log_level(), Some(log::LevelFilter::Info));
    assert_eq!(config.session_config().settle_delay, Duration::from_secs(5));
  }

  #[test]
  fn test_partial_json_fills_defaults() {
    let config: AppConfig =
      serde_json::from_str(r#"{"listenAddr":"127.0.0.1:9000","output":"hdmi","placeholderSource":null}"#)
        .unwrap();
    assert_eq!(config.listen_addr, "127.0.0.1:9000");
    assert_eq!(config.output, OutputMode::Hdmi);
    assert_eq!(config.poll_interval_ms, 1000);
    assert!(config.session_config().placeholder.is_none());
  }

  #[test]
  fn test_validation_rejects_bad_values() {
    let mut config = AppConfig::default();
    config.poll_interval_ms = 10;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.volume_step = 0.0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.listen_addr = "localhost".into();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.log_level = "loud".into();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_empty_paths_mean_auto_detect() {
    let mut config = AppConfig::default();
    config.mpv_path = Some("  ".into());
    assert!(config.mpv_path().is_none());
    config.youtube_dl_path = Some("/opt/yt-dlp".into());
    assert_eq!(config.youtube_dl_path(), Some(PathBuf::from("/opt/yt-dlp")));
  }

  #[test]
  fn test_missing_file_yields_defaults() {
    let config = AppConfig::load(Path::new("/nonexistent/raspicast/config.json")).unwrap();
    assert_eq!(config.listen_addr, default_listen_addr());
  }
}
