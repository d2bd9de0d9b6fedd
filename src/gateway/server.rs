//! WebSocket listener: one task per observer connection.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use super::hub::NotificationHub;
use super::protocol::{ClientMessage, ServerEvent};
use crate::error::CastError;

/// Accept observers until `shutdown` is cancelled.
pub async fn serve(
  listener: TcpListener,
  hub: NotificationHub,
  shutdown: CancellationToken,
) -> std::io::Result<()> {
  log::info!("Listening for observers on {}", listener.local_addr()?);

  loop {
    tokio::select! {
      _ = shutdown.cancelled() => {
        log::info!("Listener shutdown requested");
        break;
      }
      accepted = listener.accept() => {
        match accepted {
          Ok((stream, addr)) => {
            tokio::spawn(handle_connection(stream, addr, hub.clone(), shutdown.clone()));
          }
          Err(e) => log::error!("Failed to accept connection: {}", e),
        }
      }
    }
  }

  Ok(())
}

async fn handle_connection(
  stream: TcpStream,
  addr: SocketAddr,
  hub: NotificationHub,
  shutdown: CancellationToken,
) {
  let ws_stream = match accept_async(stream).await {
    Ok(ws) => ws,
    Err(e) => {
      log::warn!("WebSocket handshake with {} failed: {}", addr, e);
      return;
    }
  };
  let (mut write, mut read) = ws_stream.split();

  let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
  let id = hub.attach(outbound_tx.clone());
  log::info!("Observer {} connected from {}", id, addr);

  loop {
    tokio::select! {
      _ = shutdown.cancelled() => {
        let _ = write.close().await;
        break;
      }
      Some(event) = outbound_rx.recv() => {
        let text = match serde_json::to_string(&event) {
          Ok(text) => text,
          Err(e) => {
            log::error!("Failed to encode {} event: {}", event.event, e);
            continue;
          }
        };
        if let Err(e) = write.send(Message::Text(text.into())).await {
          log::warn!("Failed to send to observer {}: {}", id, e);
          break;
        }
      }
      msg = read.next() => {
        match msg {
          Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => {
              // Replies may arrive out of order; each command runs in its own task
              let hub = hub.clone();
              let reply_tx = outbound_tx.clone();
              tokio::spawn(async move {
                let reply = hub.route_command(id, msg).await;
                let _ = reply_tx.send(reply);
              });
            }
            Err(e) => {
              log::warn!("Malformed frame from {}: {}", id, e);
              let _ = outbound_tx.send(ServerEvent::fail(&CastError::InvalidPayload(e.to_string())));
            }
          },
          Some(Ok(Message::Close(_))) => {
            log::info!("Observer {} closed the connection", id);
            break;
          }
          Some(Err(e)) => {
            log::warn!("WebSocket error from {}: {}", id, e);
            break;
          }
          None => break,
          _ => {}
        }
      }
    }
  }

  hub.detach(id).await;
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::time::Duration;

  use super::*;
  use crate::player::testing::FakeBackend;
  use crate::player::{PlaybackSession, SessionConfig};
  use crate::resolver::testing::StaticResolver;
  use tokio_tungstenite::connect_async;

  async fn start_server() -> (String, NotificationHub, CancellationToken) {
    let session = PlaybackSession::new(
      Arc::new(FakeBackend::default()),
      Arc::new(StaticResolver::default()),
      SessionConfig::default(),
    );
    let hub = NotificationHub::new(session, Duration::from_secs(1));
    hub.start();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    tokio::spawn(serve(listener, hub.clone(), shutdown.clone()));
    (url, hub, shutdown)
  }

  async fn next_event<S>(read: &mut S) -> ServerEvent
  where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
  {
    loop {
      match read.next().await.unwrap().unwrap() {
        Message::Text(text) => return serde_json::from_str(&text).unwrap(),
        _ => continue,
      }
    }
  }

  #[tokio::test]
  async fn test_command_round_trip_over_websocket() {
    let (url, hub, shutdown) = start_server().await;
    let (ws, _) = connect_async(url.as_str()).await.unwrap();
    let (mut write, mut read) = ws.split();

    write
      .send(Message::Text(r#"{"event":"status"}"#.into()))
      .await
      .unwrap();
    let reply = next_event(&mut read).await;
    assert_eq!(reply.event, "status");
    assert_eq!(reply.data["status"], "STOPPED");

    write.send(Message::Text("not json".into())).await.unwrap();
    let reply = next_event(&mut read).await;
    assert_eq!(reply.event, "fail");
    assert_eq!(reply.data["error"], "INVALID_PAYLOAD");

    assert_eq!(hub.observer_count(), 1);
    shutdown.cancel();
  }

  #[tokio::test]
  async fn test_disconnect_detaches_observer() {
    let (url, hub, shutdown) = start_server().await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    ws.send(Message::Text(r#"{"event":"play"}"#.into())).await.unwrap();
    let reply = next_event(&mut ws).await;
    assert_eq!(reply.data["error"], "PLAYER_UNAVAILABLE");
    assert_eq!(hub.observer_count(), 1);

    ws.close(None).await.unwrap();
    for _ in 0..50 {
      if hub.observer_count() == 0 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(hub.observer_count(), 0);
    shutdown.cancel();
  }
}
