//! Scripted in-memory backend for tests.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::backend::{LaunchOptions, PlayerBackend};
use crate::error::BackendError;

#[derive(Default)]
struct FakeState {
  closed: Option<CancellationToken>,
  crash_after_launch: bool,
  fail_launch: bool,
  fail_commands: bool,
  command_delay: Duration,
  position_us: i64,
  duration_us: i64,
  volume: f64,
  paused: bool,
  launches: usize,
  loaded: Vec<String>,
  loaded_audio: Vec<Option<String>>,
  volume_queries: usize,
  in_flight: usize,
  max_in_flight: usize,
}

/// A `PlayerBackend` that never leaves the process.
#[derive(Default)]
pub struct FakeBackend {
  state: Mutex<FakeState>,
}

impl FakeBackend {
  pub fn crash(&self) {
    if let Some(token) = self.state.lock().closed.take() {
      token.cancel();
    }
  }

  pub fn crash_after_launch(&self) {
    self.state.lock().crash_after_launch = true;
  }

  pub fn fail_launch(&self) {
    self.state.lock().fail_launch = true;
  }

  pub fn fail_commands(&self, fail: bool) {
    self.state.lock().fail_commands = fail;
  }

  /// Make every call take `delay` to complete.
  pub fn set_command_delay(&self, delay: Duration) {
    self.state.lock().command_delay = delay;
  }

  pub fn set_position_us(&self, position_us: i64) {
    self.state.lock().position_us = position_us;
  }

  pub fn set_duration_us(&self, duration_us: i64) {
    self.state.lock().duration_us = duration_us;
  }

  pub fn launches(&self) -> usize {
    self.state.lock().launches
  }

  pub fn loaded(&self) -> Vec<String> {
    self.state.lock().loaded.clone()
  }

  /// Audio tracks that accompanied each `loaded` source.
  pub fn loaded_audio(&self) -> Vec<Option<String>> {
    self.state.lock().loaded_audio.clone()
  }

  pub fn volume_queries(&self) -> usize {
    self.state.lock().volume_queries
  }

  /// Highest number of calls that were ever executing at once.
  pub fn max_in_flight(&self) -> usize {
    self.state.lock().max_in_flight
  }

  pub fn is_paused(&self) -> bool {
    self.state.lock().paused
  }

  async fn call<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> Result<T, BackendError> {
    let delay = {
      let mut state = self.state.lock();
      if state.closed.is_none() {
        return Err(BackendError::NotConnected);
      }
      state.in_flight += 1;
      state.max_in_flight = state.max_in_flight.max(state.in_flight);
      state.command_delay
    };

    tokio::time::sleep(delay).await;

    let mut state = self.state.lock();
    state.in_flight -= 1;
    if state.fail_commands {
      return Err(BackendError::CommandFailed("scripted failure".into()));
    }
    Ok(f(&mut state))
  }
}

#[async_trait]
impl PlayerBackend for FakeBackend {
  async fn launch(&self, _opts: &LaunchOptions) -> Result<CancellationToken, BackendError> {
    let mut state = self.state.lock();
    if state.fail_launch {
      return Err(BackendError::CommandFailed("cannot launch".into()));
    }
    state.launches += 1;
    state.volume = 1.0;
    state.paused = false;
    let token = CancellationToken::new();
    if state.crash_after_launch {
      token.cancel();
    } else {
      state.closed = Some(token.clone());
    }
    Ok(token)
  }

  async fn load(&self, opts: &LaunchOptions) -> Result<(), BackendError> {
    let source = opts.source.clone().unwrap_or_default();
    let audio = opts.audio_source.clone();
    self
      .call(|s| {
        s.loaded.push(source);
        s.loaded_audio.push(audio);
        s.paused = false;
      })
      .await
  }

  async fn duration_us(&self) -> Result<i64, BackendError> {
    self.call(|s| s.duration_us).await
  }

  async fn position_us(&self) -> Result<i64, BackendError> {
    self.call(|s| s.position_us).await
  }

  async fn is_paused(&self) -> Result<bool, BackendError> {
    self.call(|s| s.paused).await
  }

  async fn volume(&self) -> Result<f64, BackendError> {
    self
      .call(|s| {
        s.volume_queries += 1;
        s.volume
      })
      .await
  }

  async fn play(&self) -> Result<(), BackendError> {
    self.call(|s| s.paused = false).await
  }

  async fn pause(&self) -> Result<(), BackendError> {
    self.call(|s| s.paused = true).await
  }

  async fn seek_us(&self, offset_us: i64) -> Result<(), BackendError> {
    self.call(|s| s.position_us += offset_us).await
  }

  async fn set_position_us(&self, position_us: i64) -> Result<(), BackendError> {
    self.call(|s| s.position_us = position_us).await
  }

  async fn set_volume(&self, volume: f64) -> Result<(), BackendError> {
    self.call(|s| s.volume = volume).await
  }

  async fn step_volume(&self, delta: f64) -> Result<(), BackendError> {
    self.call(|s| s.volume = (s.volume + delta).max(0.0)).await
  }

  async fn quit(&self) -> Result<(), BackendError> {
    self.call(|_| ()).await?;
    self.crash();
    Ok(())
  }
}
