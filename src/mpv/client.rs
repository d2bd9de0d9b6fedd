//! High-level MPV client; the production `PlayerBackend`.

use std::path::PathBuf;
use std::process::Child;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::ipc::MpvIpc;
use super::process::{audio_device, cleanup_ipc, spawn_mpv};
use super::protocol::{MpvCommand, MpvResponse, PropertyValue};
use crate::error::BackendError;
use crate::player::{LaunchOptions, PlayerBackend};

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// High-level MPV client.
#[derive(Clone)]
pub struct MpvClient {
  mpv_path: Option<PathBuf>,
  extra_args: Vec<String>,
  ipc_path: String,
  process: Arc<Mutex<Option<Child>>>,
  ipc: Arc<Mutex<Option<Arc<MpvIpc>>>>,
}

impl MpvClient {
  /// Create a new MPV client. `mpv_path` of `None` auto-detects the binary.
  pub fn new(mpv_path: Option<PathBuf>, extra_args: Vec<String>, ipc_path: String) -> Self {
    Self {
      mpv_path,
      extra_args,
      ipc_path,
      process: Arc::new(Mutex::new(None)),
      ipc: Arc::new(Mutex::new(None)),
    }
  }

  /// Stop MPV and disconnect.
  pub async fn stop(&self) {
    if let Some(conn) = self.ipc.lock().take() {
      conn.close();
    }

    let child = self.process.lock().take();
    if let Some(child) = child {
      reap(child, true).await;
    }

    cleanup_ipc(&self.ipc_path);
    log::info!("MPV client stopped");
  }

  /// Get a clone of the IPC connection.
  fn get_ipc(&self) -> Result<Arc<MpvIpc>, BackendError> {
    let guard = self.ipc.lock();
    guard.clone().ok_or(BackendError::NotConnected)
  }

  /// Send a command to MPV.
  async fn send(&self, cmd: MpvCommand) -> Result<MpvResponse, BackendError> {
    let ipc = self.get_ipc()?;
    let response = ipc.send_command(cmd).await?;

    if !response.is_success() {
      return Err(BackendError::CommandFailed(response.error));
    }

    Ok(response)
  }

  /// Get a property value.
  pub async fn get_property(&self, name: &str) -> Result<PropertyValue, BackendError> {
    let response = self.send(MpvCommand::get_property(name)).await?;
    Ok(
      response
        .data
        .map(PropertyValue::from)
        .unwrap_or(PropertyValue::Null),
    )
  }

  async fn get_number(&self, name: &str) -> Result<f64, BackendError> {
    match self.get_property(name).await? {
      PropertyValue::Number(n) => Ok(n),
      other => Err(BackendError::CommandFailed(format!(
        "{} is not numeric: {:?}",
        name, other
      ))),
    }
  }

  /// Reap the child once the IPC socket reports the process gone.
  fn watch_exit(&self, closed: CancellationToken, pid: u32) {
    let process = self.process.clone();
    let ipc = self.ipc.clone();
    tokio::spawn(async move {
      closed.cancelled().await;
      let child = {
        let mut guard = process.lock();
        match guard.as_ref() {
          Some(child) if child.id() == pid => guard.take(),
          _ => None,
        }
      };
      if let Some(child) = child {
        ipc.lock().take();
        reap(child, false).await;
      }
    });
  }
}

/// Wait for (and optionally kill) a child off the async runtime.
async fn reap(mut child: Child, kill: bool) {
  let pid = child.id();
  let result = tokio::task::spawn_blocking(move || {
    if kill {
      if let Err(e) = child.kill() {
        log::debug!("kill() on MPV pid {} failed: {}", pid, e);
      }
    }
    child.wait()
  })
  .await;

  match result {
    Ok(Ok(status)) => log::info!("MPV process {} exited with: {}", pid, status),
    Ok(Err(e)) => log::error!("wait() on MPV pid {} failed: {}", pid, e),
    Err(e) => log::error!("spawn_blocking panicked during process cleanup: {}", e),
  }
}

fn secs_to_micros(secs: f64) -> i64 {
  (secs * MICROS_PER_SECOND).round() as i64
}

fn micros_to_secs(micros: i64) -> f64 {
  micros as f64 / MICROS_PER_SECOND
}

#[async_trait]
impl PlayerBackend for MpvClient {
  async fn launch(&self, opts: &LaunchOptions) -> Result<CancellationToken, BackendError> {
    cleanup_ipc(&self.ipc_path);

    let child = spawn_mpv(
      self.mpv_path.as_deref(),
      &self.ipc_path,
      opts,
      &self.extra_args,
    )?;
    let pid = child.id();
    let previous = self.process.lock().replace(child);
    if let Some(previous) = previous {
      log::warn!("Reaping leftover MPV process {}", previous.id());
      reap(previous, true).await;
    }

    // Wait a bit for MPV to create the socket
    tokio::time::sleep(Duration::from_millis(500)).await;

    let ipc_conn = match MpvIpc::connect(&self.ipc_path, 10).await {
      Ok(conn) => Arc::new(conn),
      Err(e) => {
        self.stop().await;
        return Err(e.into());
      }
    };
    let closed = ipc_conn.closed();
    *self.ipc.lock() = Some(ipc_conn);
    self.watch_exit(closed.clone(), pid);

    log::info!("MPV client connected (pid {})", pid);
    Ok(closed)
  }

  async fn load(&self, opts: &LaunchOptions) -> Result<(), BackendError> {
    let loop_file = if opts.looping { "inf" } else { "no" };
    self
      .send(MpvCommand::set_property("loop-file", loop_file.into()))
      .await?;
    let osd_level: i64 = if opts.suppress_osd { 0 } else { 1 };
    self
      .send(MpvCommand::set_property("osd-level", osd_level.into()))
      .await?;
    let device = audio_device(opts.output).unwrap_or("auto");
    self
      .send(MpvCommand::set_property("audio-device", device.into()))
      .await?;

    match &opts.audio_source {
      Some(audio) => self.send(MpvCommand::change_list("audio-files", "set", audio)).await?,
      None => self.send(MpvCommand::change_list("audio-files", "clr", "")).await?,
    };

    match &opts.source {
      Some(url) => {
        log::info!("Loading file: {}", url);
        self.send(MpvCommand::loadfile(url)).await?;
      }
      None => {
        self.send(MpvCommand::new(vec!["stop".into()])).await?;
      }
    }
    Ok(())
  }

  async fn duration_us(&self) -> Result<i64, BackendError> {
    Ok(secs_to_micros(self.get_number("duration").await?))
  }

  async fn position_us(&self) -> Result<i64, BackendError> {
    Ok(secs_to_micros(self.get_number("time-pos").await?))
  }

  async fn is_paused(&self) -> Result<bool, BackendError> {
    match self.get_property("pause").await? {
      PropertyValue::Bool(b) => Ok(b),
      _ => Ok(true),
    }
  }

  async fn volume(&self) -> Result<f64, BackendError> {
    Ok(self.get_number("volume").await? / 100.0)
  }

  async fn play(&self) -> Result<(), BackendError> {
    self.send(MpvCommand::set_pause(false)).await?;
    Ok(())
  }

  async fn pause(&self) -> Result<(), BackendError> {
    self.send(MpvCommand::set_pause(true)).await?;
    Ok(())
  }

  async fn seek_us(&self, offset_us: i64) -> Result<(), BackendError> {
    self
      .send(MpvCommand::seek_relative(micros_to_secs(offset_us)))
      .await?;
    Ok(())
  }

  async fn set_position_us(&self, position_us: i64) -> Result<(), BackendError> {
    self
      .send(MpvCommand::seek_absolute(micros_to_secs(position_us)))
      .await?;
    Ok(())
  }

  async fn set_volume(&self, volume: f64) -> Result<(), BackendError> {
    self.send(MpvCommand::set_volume(volume * 100.0)).await?;
    Ok(())
  }

  async fn step_volume(&self, delta: f64) -> Result<(), BackendError> {
    self.send(MpvCommand::add("volume", delta * 100.0)).await?;
    Ok(())
  }

  async fn quit(&self) -> Result<(), BackendError> {
    let result = self.send(MpvCommand::quit()).await;
    self.stop().await;
    result.map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unit_conversions() {
    assert_eq!(secs_to_micros(1.5), 1_500_000);
    assert_eq!(secs_to_micros(-0.25), -250_000);
    assert_eq!(micros_to_secs(30_000_000), 30.0);
  }

  #[tokio::test]
  async fn test_commands_fail_without_process() {
    let client = MpvClient::new(None, Vec::new(), "/tmp/raspicast-test-unused.sock".into());
    assert!(matches!(client.play().await, Err(BackendError::NotConnected)));
    assert!(matches!(client.position_us().await, Err(BackendError::NotConnected)));
  }

  #[tokio::test]
  async fn test_relaunch_reaps_leftover_child() {
    let client = MpvClient::new(
      Some(PathBuf::from("/bin/true")),
      Vec::new(),
      "/tmp/raspicast-test-relaunch.sock".into(),
    );
    let leftover = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    let leftover_pid = leftover.id();
    *client.process.lock() = Some(leftover);

    let opts = LaunchOptions {
      source: None,
      audio_source: None,
      looping: false,
      output: crate::player::OutputMode::Both,
      suppress_osd: true,
    };
    // /bin/true never opens the IPC socket
    assert!(client.launch(&opts).await.is_err());

    let proc_entry = PathBuf::from(format!("/proc/{}", leftover_pid));
    assert!(!proc_entry.exists());
    assert!(client.process.lock().is_none());
  }
}
