//! Observer registry: status fan-out, per-observer position polling and
//! command routing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::protocol::{ClientMessage, Command, ServerEvent};
use crate::error::CastError;
use crate::player::{PlaybackSession, PlaybackStatus};

/// Identity of one connected observer.
pub type ObserverId = Uuid;

/// Outbound queue of one observer.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

struct Observer {
  outbound: Outbound,
  polling: CancellationToken,
  poller: JoinHandle<()>,
}

/// Keeps every attached observer consistent with the shared session.
#[derive(Clone)]
pub struct NotificationHub {
  session: PlaybackSession,
  observers: Arc<RwLock<HashMap<ObserverId, Observer>>>,
  poll_interval: Duration,
}

impl NotificationHub {
  pub fn new(session: PlaybackSession, poll_interval: Duration) -> Self {
    Self {
      session,
      observers: Arc::new(RwLock::new(HashMap::new())),
      poll_interval,
    }
  }

  pub fn session(&self) -> &PlaybackSession {
    &self.session
  }

  pub fn observer_count(&self) -> usize {
    self.observers.read().len()
  }

  /// Forward every session transition to all attached observers, in order.
  /// The subscription is taken before this returns.
  pub fn start(&self) -> JoinHandle<()> {
    let mut status_rx = self.session.subscribe();
    let hub = self.clone();
    tokio::spawn(async move {
      loop {
        match status_rx.recv().await {
          Ok(status) => hub.broadcast_status(status),
          Err(RecvError::Lagged(skipped)) => {
            log::warn!("Status fan-out lagged, {} transitions dropped", skipped);
          }
          Err(RecvError::Closed) => break,
        }
      }
    })
  }

  /// Register an observer and start its position polling.
  pub fn attach(&self, outbound: Outbound) -> ObserverId {
    let id = Uuid::new_v4();
    let polling = CancellationToken::new();
    let poller = spawn_poller(
      self.session.clone(),
      outbound.clone(),
      polling.clone(),
      self.poll_interval,
    );

    self.observers.write().insert(
      id,
      Observer {
        outbound,
        polling,
        poller,
      },
    );
    log::info!("Observer {} attached ({} total)", id, self.observer_count());
    id
  }

  /// Stop polling for and forget an observer. Unknown ids are ignored.
  /// Once this returns no further `position` event is sent to it.
  pub async fn detach(&self, id: ObserverId) {
    let observer = self.observers.write().remove(&id);
    let Some(observer) = observer else {
      log::debug!("Detach of unknown observer {}", id);
      return;
    };

    observer.polling.cancel();
    if let Err(e) = observer.poller.await {
      log::warn!("Position poller of {} ended abnormally: {}", id, e);
    }
    log::info!("Observer {} detached ({} left)", id, self.observer_count());
  }

  /// Push a status notification to every attached observer.
  pub fn broadcast_status(&self, status: PlaybackStatus) {
    let event = ServerEvent::status(status);
    for observer in self.observers.read().values() {
      let _ = observer.outbound.send(event.clone());
    }
  }

  /// Run one observer command and produce the reply for that observer only.
  pub async fn route_command(&self, id: ObserverId, msg: ClientMessage) -> ServerEvent {
    let event = msg.event.clone();
    let started = Instant::now();

    let result = match Command::try_from(msg) {
      Ok(command) => self.execute(command).await,
      Err(e) => Err(e),
    };

    match result {
      Ok(reply) => {
        log::info!("{}ms - {} from {}", started.elapsed().as_millis(), event, id);
        reply
      }
      Err(e) => {
        log::error!("{} from {} failed: {}", event, id, e);
        ServerEvent::fail(&e)
      }
    }
  }

  async fn execute(&self, command: Command) -> Result<ServerEvent, CastError> {
    let session = &self.session;
    let reply = match command {
      Command::Cast(request) => ServerEvent::reply("initialState", session.cast(&request).await?),
      Command::Play => {
        session.play().await?;
        ServerEvent::reply("play", ())
      }
      Command::Pause => {
        session.pause().await?;
        ServerEvent::reply("pause", ())
      }
      Command::Quit => {
        session.quit().await?;
        ServerEvent::reply("quit", ())
      }
      Command::Seek(offset) => {
        session.seek(offset).await?;
        ServerEvent::reply("seek", serde_json::json!({ "isSeeking": false }))
      }
      Command::Position(Some(position)) => {
        ServerEvent::reply("position", session.set_position(position).await?)
      }
      Command::Position(None) => ServerEvent::reply("position", session.position().await?),
      Command::Volume(Some(volume)) => ServerEvent::reply("volume", session.set_volume(volume).await?),
      Command::Volume(None) => ServerEvent::reply("volume", session.volume().await?),
      Command::IncreaseVolume => ServerEvent::reply("volume", session.step_volume(true).await?),
      Command::DecreaseVolume => ServerEvent::reply("volume", session.step_volume(false).await?),
      Command::InitialState => ServerEvent::reply("initialState", session.initial_state().await),
      Command::Duration => ServerEvent::reply(
        "duration",
        serde_json::json!({ "duration": session.duration().await? }),
      ),
      Command::Status => {
        ServerEvent::reply("status", serde_json::json!({ "status": session.status() }))
      }
    };
    Ok(reply)
  }
}

fn spawn_poller(
  session: PlaybackSession,
  outbound: Outbound,
  cancel: CancellationToken,
  interval: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {}
      }

      let position = tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        position = session.poll_position() => position,
      };

      if let Some(position) = position {
        if cancel.is_cancelled() || outbound.send(ServerEvent::position(position)).is_err() {
          break;
        }
      }
    }
  })
}
