//! Async IPC connection to MPV over its Unix socket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::{MpvCommand, MpvMessage, MpvResponse};

/// How long a command may wait for its response.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum IpcError {
  #[error("Connection failed: {0}")]
  ConnectionFailed(String),
  #[error("Write failed: {0}")]
  WriteFailed(#[from] std::io::Error),
  #[error("Command timeout")]
  Timeout,
  #[error("Disconnected")]
  Disconnected,
}

/// Pending request waiting for response.
type PendingRequest = oneshot::Sender<MpvResponse>;

/// IPC connection state shared between writer and reader.
struct IpcState {
  pending: HashMap<i64, PendingRequest>,
}

/// Writer channel message.
enum WriteMessage {
  Command(Vec<u8>),
  Close,
}

/// MPV IPC connection.
pub struct MpvIpc {
  state: Arc<Mutex<IpcState>>,
  write_tx: async_channel::Sender<WriteMessage>,
  closed: CancellationToken,
  _reader_handle: JoinHandle<()>,
  _writer_handle: JoinHandle<()>,
}

impl MpvIpc {
  /// Connect to the MPV IPC socket, retrying while mpv creates it.
  pub async fn connect(path: &str, retry_count: u32) -> Result<Self, IpcError> {
    let mut last_error = None;

    for attempt in 0..retry_count {
      if attempt > 0 {
        tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
      }

      match Self::try_connect(path).await {
        Ok(ipc) => return Ok(ipc),
        Err(e) => {
          log::debug!("IPC connect attempt {} failed: {}", attempt + 1, e);
          last_error = Some(e);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| IpcError::ConnectionFailed("Unknown error".into())))
  }

  async fn try_connect(path: &str) -> Result<Self, IpcError> {
    use tokio::net::UnixStream;

    let stream = UnixStream::connect(path)
      .await
      .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;

    let (reader, writer) = tokio::io::split(stream);
    Ok(Self::setup(reader, writer))
  }

  /// Wire reader/writer tasks onto an already-open byte stream.
  pub(crate) fn setup<R, W>(reader: R, writer: W) -> Self
  where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
  {
    let state = Arc::new(Mutex::new(IpcState {
      pending: HashMap::new(),
    }));
    let closed = CancellationToken::new();

    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();

    let reader_state = state.clone();
    let reader_closed = closed.clone();
    let reader_handle = tokio::spawn(async move {
      Self::reader_loop(reader, reader_state.clone()).await;
      // Dropping the senders fails every in-flight request with Disconnected
      reader_state.lock().pending.clear();
      reader_closed.cancel();
    });

    let writer_handle = tokio::spawn(async move {
      Self::writer_loop(writer, write_rx).await;
    });

    Self {
      state,
      write_tx,
      closed,
      _reader_handle: reader_handle,
      _writer_handle: writer_handle,
    }
  }

  async fn reader_loop<R: tokio::io::AsyncRead + Unpin>(reader: R, state: Arc<Mutex<IpcState>>) {
    log::debug!("MPV IPC reader loop started");
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
      line.clear();
      match buf_reader.read_line(&mut line).await {
        Ok(0) => {
          log::info!("MPV IPC connection closed");
          break;
        }
        Ok(_) => {
          let trimmed = line.trim();
          if trimmed.is_empty() {
            continue;
          }

          match MpvMessage::parse(trimmed) {
            Ok(MpvMessage::Response(response)) => {
              let tx = state.lock().pending.remove(&response.request_id);
              if let Some(tx) = tx {
                let _ = tx.send(response);
              }
            }
            Ok(MpvMessage::Event(event)) => match event.reason.as_deref() {
              Some(reason) if event.event == "end-file" => {
                log::info!("MPV end-file: {}", reason);
              }
              _ => log::debug!("MPV event {}", event.event),
            },
            Err(e) => {
              log::warn!("Failed to parse MPV message: {} - {}", e, trimmed);
            }
          }
        }
        Err(e) => {
          log::error!("MPV IPC read error: {}", e);
          break;
        }
      }
    }
  }

  async fn writer_loop<W: tokio::io::AsyncWrite + Unpin>(
    mut writer: W,
    write_rx: async_channel::Receiver<WriteMessage>,
  ) {
    while let Ok(msg) = write_rx.recv().await {
      match msg {
        WriteMessage::Command(mut data) => {
          data.push(b'\n');
          if let Err(e) = writer.write_all(&data).await {
            log::error!("MPV IPC write error: {}", e);
            break;
          }
          if let Err(e) = writer.flush().await {
            log::error!("MPV IPC flush error: {}", e);
            break;
          }
        }
        WriteMessage::Close => {
          log::debug!("MPV IPC writer closing");
          break;
        }
      }
    }
  }

  /// Send a command to MPV and wait for its response.
  pub async fn send_command(&self, cmd: MpvCommand) -> Result<MpvResponse, IpcError> {
    if self.closed.is_cancelled() {
      return Err(IpcError::Disconnected);
    }

    let request_id = cmd.request_id;
    let (tx, rx) = oneshot::channel();
    self.state.lock().pending.insert(request_id, tx);

    let json = serde_json::to_string(&cmd).map_err(|e| IpcError::WriteFailed(e.into()))?;
    log::debug!("Sending MPV command: {}", json);

    self
      .write_tx
      .send(WriteMessage::Command(json.into_bytes()))
      .await
      .map_err(|_| IpcError::Disconnected)?;

    match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
      Ok(Ok(response)) => Ok(response),
      Ok(Err(_)) => Err(IpcError::Disconnected),
      Err(_) => {
        log::error!("MPV command timeout, request_id={}", request_id);
        self.state.lock().pending.remove(&request_id);
        Err(IpcError::Timeout)
      }
    }
  }

  /// Token cancelled once the socket reaches EOF, i.e. the mpv process is gone.
  pub fn closed(&self) -> CancellationToken {
    self.closed.clone()
  }

  /// Close the write side of the connection.
  pub fn close(&self) {
    let _ = self.write_tx.try_send(WriteMessage::Close);
  }
}
