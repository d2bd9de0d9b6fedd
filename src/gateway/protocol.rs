//! JSON envelopes exchanged with observers: `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CastError;
use crate::player::PlaybackStatus;
use crate::resolver::CastRequest;

/// A frame received from an observer.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
  pub event: String,
  #[serde(default)]
  pub data: Value,
}

/// A frame sent to an observer, either a reply or a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
  pub event: String,
  pub data: Value,
}

impl ServerEvent {
  pub fn reply(event: &str, data: impl Serialize) -> Self {
    Self {
      event: event.to_string(),
      data: serde_json::to_value(data).unwrap_or(Value::Null),
    }
  }

  pub fn status(status: PlaybackStatus) -> Self {
    Self::reply("status", serde_json::json!({ "status": status }))
  }

  pub fn position(position: u64) -> Self {
    Self::reply("position", position)
  }

  pub fn fail(error: &CastError) -> Self {
    Self::reply(
      "fail",
      serde_json::json!({ "error": error.code(), "message": error.to_string() }),
    )
  }
}

/// A validated observer command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  Cast(CastRequest),
  Play,
  Pause,
  Quit,
  /// Relative seek in seconds.
  Seek(i64),
  /// Absolute position in seconds, or `None` to read it.
  Position(Option<u64>),
  /// Linear volume, or `None` to read it.
  Volume(Option<f64>),
  IncreaseVolume,
  DecreaseVolume,
  InitialState,
  Duration,
  Status,
}

/// Accept JSON numbers and numeric strings; null means "absent".
fn number(data: &Value) -> Result<Option<f64>, CastError> {
  let parsed = match data {
    Value::Null => return Ok(None),
    Value::Number(n) => n.as_f64(),
    Value::String(s) if s.trim().is_empty() => return Ok(None),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  };
  match parsed {
    Some(n) if n.is_finite() => Ok(Some(n)),
    _ => Err(CastError::InvalidPayload(format!("expected a number, got {}", data))),
  }
}

fn required(event: &str, data: &Value) -> Result<f64, CastError> {
  number(data)?.ok_or_else(|| CastError::InvalidPayload(format!("{} requires a number", event)))
}

impl TryFrom<ClientMessage> for Command {
  type Error = CastError;

  fn try_from(msg: ClientMessage) -> Result<Self, Self::Error> {
    let command = match msg.event.as_str() {
      "cast" => Command::Cast(
        serde_json::from_value(msg.data)
          .map_err(|e| CastError::InvalidPayload(format!("cast: {}", e)))?,
      ),
      "play" => Command::Play,
      "pause" => Command::Pause,
      "quit" => Command::Quit,
      "seek" => Command::Seek(required("seek", &msg.data)?.round() as i64),
      "position" => Command::Position(number(&msg.data)?.map(|p| p.max(0.0).round() as u64)),
      "volume" => Command::Volume(number(&msg.data)?),
      "increaseVolume" => Command::IncreaseVolume,
      "decreaseVolume" => Command::DecreaseVolume,
      "initialState" => Command::InitialState,
      "duration" => Command::Duration,
      "status" => Command::Status,
      other => return Err(CastError::InvalidPayload(format!("unknown event {:?}", other))),
    };
    Ok(command)
  }
}
