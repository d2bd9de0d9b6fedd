//! Turning a cast request into a playable URL plus descriptive metadata.

mod youtube_dl;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ResolutionError;
use crate::player::CastMeta;

pub use youtube_dl::{find_youtube_dl, YoutubeDlResolver};

/// Payload of a `cast` command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CastRequest {
  /// Resolver selector, e.g. "youtubedl". Unknown kinds use youtube-dl.
  #[serde(rename = "type", default)]
  pub kind: String,
  /// Resolver-specific source identifier (page URL, video id, ...).
  pub data: String,
}

/// Resolves source identifiers into something the player can open.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
  async fn resolve(&self, request: &CastRequest) -> Result<CastMeta, ResolutionError>;
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cast_request_parsing() {
    let req: CastRequest =
      serde_json::from_str(r#"{"type":"youtubedl","data":"https://youtu.be/x"}"#).unwrap();
    assert_eq!(req.kind, "youtubedl");
    assert_eq!(req.data, "https://youtu.be/x");

    let untyped: CastRequest = serde_json::from_str(r#"{"data":"abc"}"#).unwrap();
    assert_eq!(untyped.kind, "");
  }
}
