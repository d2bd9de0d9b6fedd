//! Error taxonomy shared by the player, the resolver and the gateway.

use thiserror::Error;

use crate::mpv::{IpcError, ProcessError};

/// A call into the player backend failed.
#[derive(Error, Debug)]
pub enum BackendError {
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("IPC error: {0}")]
  Ipc(#[from] IpcError),
  #[error("Player command failed: {0}")]
  CommandFailed(String),
  #[error("Not connected")]
  NotConnected,
}

/// The player process could not be started, or could not take a new source.
#[derive(Error, Debug)]
pub enum LaunchError {
  #[error("Player failed to start: {0}")]
  Backend(#[from] BackendError),
  #[error("Player process exited before it became ready")]
  ExitedEarly,
  #[error("No player process is running")]
  NotRunning,
}

/// The metadata resolver could not turn a cast request into a playable source.
#[derive(Error, Debug)]
pub enum ResolutionError {
  #[error("Resolver executable not found")]
  NotFound,
  #[error("Failed to run resolver: {0}")]
  Io(#[from] std::io::Error),
  #[error("Unsupported stream: {0}")]
  Unsupported(String),
  #[error("Invalid resolver output: {0}")]
  InvalidOutput(#[from] serde_json::Error),
}

/// No live process, or a query/mutation against it failed.
#[derive(Error, Debug)]
#[error("Player unavailable: {0}")]
pub struct Unavailable(pub String);

impl From<BackendError> for Unavailable {
  fn from(e: BackendError) -> Self {
    Unavailable(e.to_string())
  }
}

/// Failure of a command issued against the playback session.
#[derive(Error, Debug)]
pub enum CastError {
  #[error(transparent)]
  Launch(#[from] LaunchError),
  #[error(transparent)]
  Unavailable(#[from] Unavailable),
  #[error(transparent)]
  Resolution(#[from] ResolutionError),
  #[error("Another cast is already loading")]
  Busy,
  #[error("Invalid payload: {0}")]
  InvalidPayload(String),
}

impl CastError {
  /// Stable code sent to observers in `fail` events.
  pub fn code(&self) -> &'static str {
    match self {
      CastError::Launch(_) => "LAUNCH_FAILED",
      CastError::Unavailable(_) => "PLAYER_UNAVAILABLE",
      CastError::Resolution(_) => "UNSUPPORTED_STREAM",
      CastError::Busy => "BUSY",
      CastError::InvalidPayload(_) => "INVALID_PAYLOAD",
    }
  }
}

impl From<BackendError> for CastError {
  fn from(e: BackendError) -> Self {
    CastError::Unavailable(e.into())
  }
}

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config file: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config file: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Invalid configuration: {0}")]
  Invalid(String),
}
