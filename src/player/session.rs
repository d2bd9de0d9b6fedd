//! The playback session: canonical state plus the single serialization point
//! in front of the player process.
//!
//! Every call that reaches the process goes through `handle`, a tokio mutex
//! held for the whole command. State observers may read without awaiting via
//! the `state` lock, which is never held across an await.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};

use super::backend::{LaunchOptions, OutputMode, PlayerBackend};
use super::handle::ProcessHandle;
use super::types::{CastMeta, InitialState, PlaybackStatus};
use crate::error::{CastError, LaunchError, Unavailable};
use crate::resolver::{CastRequest, MetadataResolver};

/// Tunables taken from the application config.
#[derive(Debug, Clone)]
pub struct SessionConfig {
  /// Media shown while a cast is loading. `None` launches the player idle.
  pub placeholder: Option<String>,
  pub output: OutputMode,
  pub suppress_osd: bool,
  pub looping: bool,
  pub settle_delay: Duration,
  pub volume_step: f64,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      placeholder: None,
      output: OutputMode::Both,
      suppress_osd: true,
      looping: false,
      settle_delay: Duration::from_secs(5),
      volume_step: 0.1,
    }
  }
}

#[derive(Debug, Default)]
struct SessionState {
  status: PlaybackStatus,
  loading: bool,
  pending: bool,
  meta: Option<CastMeta>,
  /// Stale-tolerant: written on set, filled on first read, dropped when the
  /// process closes. Out-of-band volume changes are not observed.
  cached_volume: Option<f64>,
}

/// Clears a session flag when dropped.
struct FlagGuard<'a> {
  state: &'a RwLock<SessionState>,
  flag: fn(&mut SessionState) -> &mut bool,
}

impl<'a> FlagGuard<'a> {
  fn raise(state: &'a RwLock<SessionState>, flag: fn(&mut SessionState) -> &mut bool) -> Self {
    *flag(&mut state.write()) = true;
    Self { state, flag }
  }
}

impl Drop for FlagGuard<'_> {
  fn drop(&mut self) {
    *(self.flag)(&mut self.state.write()) = false;
  }
}

fn loading_flag(state: &mut SessionState) -> &mut bool {
  &mut state.loading
}

fn pending_flag(state: &mut SessionState) -> &mut bool {
  &mut state.pending
}

struct SessionInner {
  backend: Arc<dyn PlayerBackend>,
  resolver: Arc<dyn MetadataResolver>,
  config: SessionConfig,
  handle: Mutex<Option<ProcessHandle>>,
  state: RwLock<SessionState>,
  status_tx: broadcast::Sender<PlaybackStatus>,
}

/// The one shared playback session.
#[derive(Clone)]
pub struct PlaybackSession {
  inner: Arc<SessionInner>,
}

fn live(slot: &Option<ProcessHandle>) -> Result<&ProcessHandle, Unavailable> {
  slot
    .as_ref()
    .filter(|handle| handle.is_running())
    .ok_or_else(|| Unavailable("no player process is running".to_string()))
}

impl PlaybackSession {
  pub fn new(
    backend: Arc<dyn PlayerBackend>,
    resolver: Arc<dyn MetadataResolver>,
    config: SessionConfig,
  ) -> Self {
    let (status_tx, _) = broadcast::channel(64);
    Self {
      inner: Arc::new(SessionInner {
        backend,
        resolver,
        config,
        handle: Mutex::new(None),
        state: RwLock::new(SessionState::default()),
        status_tx,
      }),
    }
  }

  /// Stream of every status transition, in order.
  pub fn subscribe(&self) -> broadcast::Receiver<PlaybackStatus> {
    self.inner.status_tx.subscribe()
  }

  pub fn status(&self) -> PlaybackStatus {
    self.inner.state.read().status
  }

  pub fn is_pending(&self) -> bool {
    self.inner.state.read().pending
  }

  pub fn is_loading(&self) -> bool {
    self.inner.state.read().loading
  }

  pub fn meta(&self) -> Option<CastMeta> {
    self.inner.state.read().meta.clone()
  }

  /// Store and publish a transition. The send happens under the state lock
  /// so the broadcast order matches the store order.
  fn set_status(&self, status: PlaybackStatus) {
    let mut state = self.inner.state.write();
    state.status = status;
    if status == PlaybackStatus::Stopped {
      state.meta = None;
    }
    let _ = self.inner.status_tx.send(status);
    drop(state);
    log::info!("Playback status -> {:?}", status);
  }

  fn launch_options(
    &self,
    source: Option<String>,
    audio: Option<String>,
    looping: bool,
  ) -> LaunchOptions {
    LaunchOptions {
      source,
      audio_source: audio,
      looping,
      output: self.inner.config.output,
      suppress_osd: self.inner.config.suppress_osd,
    }
  }

  /// Load a new source: STOPPED, then the placeholder and the resolver run
  /// together, then the resolved media replaces the placeholder.
  ///
  /// A second cast while one is loading fails with `CastError::Busy`.
  pub async fn cast(&self, request: &CastRequest) -> Result<InitialState, CastError> {
    {
      let mut state = self.inner.state.write();
      if state.loading {
        return Err(CastError::Busy);
      }
      state.loading = true;
    }
    // Flag is already raised; the guard only lowers it on every exit path
    let _loading = FlagGuard {
      state: &self.inner.state,
      flag: loading_flag,
    };

    let mut slot = self.inner.handle.lock().await;
    self.set_status(PlaybackStatus::Stopped);

    match self.load_cast(&mut slot, request).await {
      Ok(meta) => {
        log::info!("Casting {:?}", meta.title);
        self.set_status(PlaybackStatus::Playing);
        Ok(self.snapshot(&slot).await)
      }
      Err(e) => {
        if self.status() != PlaybackStatus::Stopped {
          self.set_status(PlaybackStatus::Stopped);
        }
        Err(e)
      }
    }
  }

  /// Placeholder and resolver together, then the resolved source. Runs under
  /// the handle lock.
  async fn load_cast(
    &self,
    slot: &mut Option<ProcessHandle>,
    request: &CastRequest,
  ) -> Result<CastMeta, CastError> {
    let (ready, resolved) = tokio::join!(
      self.ensure_running(slot),
      self.inner.resolver.resolve(request)
    );
    ready?;
    let meta = resolved?;

    let handle = slot.as_ref().ok_or(LaunchError::NotRunning)?;
    self.inner.state.write().meta = Some(meta.clone());
    let opts = self.launch_options(
      Some(meta.source_url.clone()),
      meta.audio_url.clone(),
      self.inner.config.looping,
    );
    if let Err(e) = handle.replace_source(&opts).await {
      self.inner.state.write().meta = None;
      return Err(e.into());
    }
    Ok(meta)
  }

  /// Start the process with the placeholder if none is alive.
  async fn ensure_running(&self, slot: &mut Option<ProcessHandle>) -> Result<(), LaunchError> {
    if slot.as_ref().is_some_and(ProcessHandle::is_running) {
      return Ok(());
    }

    let opts = self.launch_options(self.inner.config.placeholder.clone(), None, true);
    let handle = ProcessHandle::spawn(
      self.inner.backend.clone(),
      &opts,
      self.inner.config.settle_delay,
    )
    .await?;

    let session: Weak<SessionInner> = Arc::downgrade(&self.inner);
    let generation = handle.generation();
    handle.on_close(move || async move {
      if let Some(inner) = session.upgrade() {
        PlaybackSession { inner }.process_closed(generation).await;
      }
    });

    *slot = Some(handle);
    Ok(())
  }

  /// Reset after the process terminated. Skipped when a newer process has
  /// already taken the slot; its cast broadcast STOPPED when it began.
  async fn process_closed(&self, generation: u64) {
    {
      let mut slot = self.inner.handle.lock().await;
      let superseded = slot
        .as_ref()
        .is_some_and(|handle| handle.generation() != generation);
      if superseded {
        log::debug!("Ignoring close of superseded process {}", generation);
        return;
      }
      *slot = None;

      let mut state = self.inner.state.write();
      state.pending = false;
      state.cached_volume = None;
    }
    self.set_status(PlaybackStatus::Stopped);
  }

  /// Current state; duration and volume are included unless STOPPED.
  pub async fn initial_state(&self) -> InitialState {
    let slot = self.inner.handle.lock().await;
    self.snapshot(&slot).await
  }

  async fn snapshot(&self, slot: &Option<ProcessHandle>) -> InitialState {
    let (is_pending, status, meta) = {
      let state = self.inner.state.read();
      (state.pending, state.status, state.meta.clone())
    };

    let (mut duration, mut volume) = (None, None);
    if status != PlaybackStatus::Stopped {
      if let Ok(handle) = live(slot) {
        duration = handle
          .duration()
          .await
          .map_err(|e| log::warn!("Duration unavailable: {}", e))
          .ok();
        volume = self
          .cached_or_query_volume(handle)
          .await
          .map_err(|e| log::warn!("Volume unavailable: {}", e))
          .ok();
      }
    }

    InitialState {
      is_pending,
      status,
      meta,
      duration,
      volume,
    }
  }

  pub async fn play(&self) -> Result<(), CastError> {
    let slot = self.inner.handle.lock().await;
    live(&slot)?.play().await?;
    self.set_status(PlaybackStatus::Playing);
    Ok(())
  }

  pub async fn pause(&self) -> Result<(), CastError> {
    let slot = self.inner.handle.lock().await;
    live(&slot)?.pause().await?;
    self.set_status(PlaybackStatus::Paused);
    Ok(())
  }

  pub async fn quit(&self) -> Result<(), CastError> {
    let mut slot = self.inner.handle.lock().await;
    live(&slot)?.quit().await?;
    *slot = None;
    self.set_status(PlaybackStatus::Stopped);
    Ok(())
  }

  /// Seek by `offset` seconds. Position polling is suppressed meanwhile.
  pub async fn seek(&self, offset: i64) -> Result<(), CastError> {
    let slot = self.inner.handle.lock().await;
    let handle = live(&slot)?;
    let _pending = FlagGuard::raise(&self.inner.state, pending_flag);
    handle.seek(offset).await?;
    Ok(())
  }

  /// Jump to an absolute position in seconds.
  pub async fn set_position(&self, position: u64) -> Result<u64, CastError> {
    let slot = self.inner.handle.lock().await;
    let handle = live(&slot)?;
    let _pending = FlagGuard::raise(&self.inner.state, pending_flag);
    handle.set_position(position).await?;
    Ok(position)
  }

  pub async fn position(&self) -> Result<u64, CastError> {
    let slot = self.inner.handle.lock().await;
    Ok(live(&slot)?.position().await?)
  }

  pub async fn duration(&self) -> Result<u64, CastError> {
    let slot = self.inner.handle.lock().await;
    Ok(live(&slot)?.duration().await?)
  }

  /// Position for a periodic poll, or `None` when this tick should be skipped:
  /// not PLAYING, a seek or cast in flight, or another command holding the
  /// player.
  pub async fn poll_position(&self) -> Option<u64> {
    {
      let state = self.inner.state.read();
      if state.status != PlaybackStatus::Playing || state.pending || state.loading {
        return None;
      }
    }

    let slot = self.inner.handle.try_lock().ok()?;
    let handle = live(&slot).ok()?;
    match handle.position().await {
      Ok(position) => Some(position),
      Err(e) => {
        log::debug!("Position poll failed: {}", e);
        None
      }
    }
  }

  pub async fn set_volume(&self, volume: f64) -> Result<f64, CastError> {
    if !volume.is_finite() || volume < 0.0 {
      return Err(CastError::InvalidPayload(format!("volume {}", volume)));
    }
    let slot = self.inner.handle.lock().await;
    live(&slot)?.set_volume(volume).await?;
    self.inner.state.write().cached_volume = Some(volume);
    Ok(volume)
  }

  /// Cached volume, or a query to the process when nothing is cached yet.
  pub async fn volume(&self) -> Result<f64, CastError> {
    if let Some(volume) = self.inner.state.read().cached_volume {
      return Ok(volume);
    }
    let slot = self.inner.handle.lock().await;
    Ok(self.cached_or_query_volume(live(&slot)?).await?)
  }

  async fn cached_or_query_volume(&self, handle: &ProcessHandle) -> Result<f64, Unavailable> {
    if let Some(volume) = self.inner.state.read().cached_volume {
      return Ok(volume);
    }
    let volume = handle.volume().await?;
    self.inner.state.write().cached_volume = Some(volume);
    Ok(volume)
  }

  /// Step the volume up or down by the configured amount and re-read it.
  pub async fn step_volume(&self, up: bool) -> Result<f64, CastError> {
    let step = self.inner.config.volume_step;
    let slot = self.inner.handle.lock().await;
    let handle = live(&slot)?;
    self.inner.state.write().cached_volume = None;
    handle.step_volume(if up { step } else { -step }).await?;
    Ok(self.cached_or_query_volume(handle).await?)
  }

  /// Quit the player if one is running. Used on shutdown.
  pub async fn shutdown(&self) {
    let running = {
      let slot = self.inner.handle.lock().await;
      live(&slot).is_ok()
    };
    if running {
      if let Err(e) = self.quit().await {
        log::warn!("Failed to quit player on shutdown: {}", e);
      }
    }
  }
}
