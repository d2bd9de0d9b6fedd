//! Ownership of exactly one external player process.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::backend::{LaunchOptions, PlayerBackend};
use super::types::PlaybackStatus;
use crate::error::{LaunchError, Unavailable};

const MICROS_PER_SECOND: f64 = 1_000_000.0;

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Convert a raw player time in microseconds to whole seconds.
/// Negative values are reported as zero.
pub fn whole_seconds(raw_us: i64) -> u64 {
  if raw_us <= 0 {
    return 0;
  }
  (raw_us as f64 / MICROS_PER_SECOND).round() as u64
}

fn to_micros(secs: i64) -> i64 {
  secs.saturating_mul(1_000_000)
}

/// A live player process. Dropped (and replaced) only when the process ends.
pub struct ProcessHandle {
  backend: Arc<dyn PlayerBackend>,
  running: Arc<AtomicBool>,
  closed: CancellationToken,
  generation: u64,
  settle_delay: Duration,
}

impl ProcessHandle {
  /// Start the player process and wait for it to settle.
  pub async fn spawn(
    backend: Arc<dyn PlayerBackend>,
    opts: &LaunchOptions,
    settle_delay: Duration,
  ) -> Result<Self, LaunchError> {
    let closed = backend.launch(opts).await?;
    settle(&closed, settle_delay).await?;

    let generation = GENERATION.fetch_add(1, Ordering::SeqCst);
    log::info!("Player process {} ready", generation);

    Ok(Self {
      backend,
      running: Arc::new(AtomicBool::new(true)),
      closed,
      generation,
      settle_delay,
    })
  }

  /// Swap the media on the live process without restarting it.
  pub async fn replace_source(&self, opts: &LaunchOptions) -> Result<(), LaunchError> {
    if !self.is_running() {
      return Err(LaunchError::NotRunning);
    }
    self.backend.load(opts).await?;
    settle(&self.closed, self.settle_delay).await
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::SeqCst) && !self.closed.is_cancelled()
  }

  /// Identity of this process instance.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Run `callback` once, after the process terminates for any reason.
  pub fn on_close<F, Fut>(&self, callback: F)
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let closed = self.closed.clone();
    let running = self.running.clone();
    let generation = self.generation;
    tokio::spawn(async move {
      closed.cancelled().await;
      running.store(false, Ordering::SeqCst);
      log::info!("Player process {} closed", generation);
      callback().await;
    });
  }

  fn ensure_running(&self) -> Result<&dyn PlayerBackend, Unavailable> {
    if self.is_running() {
      Ok(self.backend.as_ref())
    } else {
      Err(Unavailable("no player process is running".to_string()))
    }
  }

  pub async fn duration(&self) -> Result<u64, Unavailable> {
    let raw = self.ensure_running()?.duration_us().await?;
    Ok(whole_seconds(raw))
  }

  pub async fn position(&self) -> Result<u64, Unavailable> {
    let raw = self.ensure_running()?.position_us().await?;
    Ok(whole_seconds(raw))
  }

  /// Status as reported by the process itself.
  pub async fn playback_status(&self) -> Result<PlaybackStatus, Unavailable> {
    let paused = self.ensure_running()?.is_paused().await?;
    Ok(if paused {
      PlaybackStatus::Paused
    } else {
      PlaybackStatus::Playing
    })
  }

  pub async fn volume(&self) -> Result<f64, Unavailable> {
    Ok(self.ensure_running()?.volume().await?)
  }

  pub async fn play(&self) -> Result<(), Unavailable> {
    Ok(self.ensure_running()?.play().await?)
  }

  pub async fn pause(&self) -> Result<(), Unavailable> {
    Ok(self.ensure_running()?.pause().await?)
  }

  /// Seek by `offset` seconds relative to the current position.
  pub async fn seek(&self, offset: i64) -> Result<(), Unavailable> {
    Ok(self.ensure_running()?.seek_us(to_micros(offset)).await?)
  }

  pub async fn set_position(&self, position: u64) -> Result<(), Unavailable> {
    let position = i64::try_from(position).unwrap_or(i64::MAX);
    Ok(self.ensure_running()?.set_position_us(to_micros(position)).await?)
  }

  pub async fn set_volume(&self, volume: f64) -> Result<(), Unavailable> {
    Ok(self.ensure_running()?.set_volume(volume).await?)
  }

  pub async fn step_volume(&self, delta: f64) -> Result<(), Unavailable> {
    Ok(self.ensure_running()?.step_volume(delta).await?)
  }

  /// Ask the process to exit. The close notification still fires.
  pub async fn quit(&self) -> Result<(), Unavailable> {
    self.ensure_running()?.quit().await?;
    self.running.store(false, Ordering::SeqCst);
    Ok(())
  }
}

/// Fixed wait after a launch or source swap. The player acknowledges both
/// before it accepts playback commands, so commands issued earlier are lost.
async fn settle(closed: &CancellationToken, delay: Duration) -> Result<(), LaunchError> {
  tokio::select! {
    _ = tokio::time::sleep(delay) => Ok(()),
    _ = closed.cancelled() => Err(LaunchError::ExitedEarly),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::player::testing::FakeBackend;
  use crate::player::OutputMode;
  use tokio::sync::oneshot;

  fn opts(source: Option<&str>) -> LaunchOptions {
    LaunchOptions {
      source: source.map(str::to_string),
      audio_source: None,
      looping: false,
      output: OutputMode::Both,
      suppress_osd: true,
    }
  }

  #[test]
  fn test_whole_seconds_rounds_and_clamps() {
    assert_eq!(whole_seconds(0), 0);
    assert_eq!(whole_seconds(-3_000_000), 0);
    assert_eq!(whole_seconds(1_499_999), 1);
    assert_eq!(whole_seconds(1_500_000), 2);
    assert_eq!(whole_seconds(90_200_000), 90);
  }

  #[tokio::test(start_paused = true)]
  async fn test_spawn_waits_for_settle_delay() {
    let backend = Arc::new(FakeBackend::default());
    let start = tokio::time::Instant::now();
    let handle = ProcessHandle::spawn(backend.clone(), &opts(None), Duration::from_secs(5))
      .await
      .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(handle.is_running());
    assert_eq!(backend.launches(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_exit_during_settle_is_launch_error() {
    let backend = Arc::new(FakeBackend::default());
    backend.crash_after_launch();
    let result = ProcessHandle::spawn(backend, &opts(None), Duration::from_secs(5)).await;
    assert!(matches!(result, Err(LaunchError::ExitedEarly)));
  }

  #[tokio::test(start_paused = true)]
  async fn test_negative_position_reported_as_zero() {
    let backend = Arc::new(FakeBackend::default());
    backend.set_position_us(-2_000_000);
    let handle = ProcessHandle::spawn(backend.clone(), &opts(None), Duration::ZERO)
      .await
      .unwrap();
    assert_eq!(handle.position().await.unwrap(), 0);

    backend.set_position_us(41_600_000);
    assert_eq!(handle.position().await.unwrap(), 42);
  }

  #[tokio::test(start_paused = true)]
  async fn test_replace_source_reuses_process() {
    let backend = Arc::new(FakeBackend::default());
    let handle = ProcessHandle::spawn(backend.clone(), &opts(None), Duration::ZERO)
      .await
      .unwrap();
    handle.replace_source(&opts(Some("http://a"))).await.unwrap();
    handle.replace_source(&opts(Some("http://b"))).await.unwrap();

    assert_eq!(backend.launches(), 1);
    assert_eq!(backend.loaded(), vec!["http://a".to_string(), "http://b".to_string()]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_on_close_fires_once_and_stops_commands() {
    let backend = Arc::new(FakeBackend::default());
    let handle = ProcessHandle::spawn(backend.clone(), &opts(None), Duration::ZERO)
      .await
      .unwrap();

    let (tx, rx) = oneshot::channel();
    handle.on_close(move || async move {
      let _ = tx.send(());
    });

    backend.crash();
    rx.await.unwrap();

    assert!(!handle.is_running());
    assert!(handle.play().await.is_err());
    assert!(matches!(
      handle.replace_source(&opts(Some("http://c"))).await,
      Err(LaunchError::NotRunning)
    ));
  }
}
