//! Resolver backed by the `yt-dlp` / `youtube-dl` command-line tool.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{CastRequest, MetadataResolver};
use crate::error::ResolutionError;
use crate::player::CastMeta;

/// Subset of the `--dump-json` output we care about.
#[derive(Debug, Deserialize)]
struct VideoInfo {
  #[serde(default)]
  url: Option<String>,
  #[serde(default)]
  requested_formats: Vec<FormatInfo>,
  #[serde(default)]
  title: String,
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
  url: String,
}

/// Find a youtube-dl compatible executable on PATH.
pub fn find_youtube_dl() -> Option<PathBuf> {
  ["yt-dlp", "youtube-dl"]
    .into_iter()
    .find_map(|name| which::which(name).ok())
}

/// Runs youtube-dl once per request and reads its JSON description.
pub struct YoutubeDlResolver {
  binary: Option<PathBuf>,
  format: String,
}

impl YoutubeDlResolver {
  /// `binary` of `None` auto-detects on every call.
  pub fn new(binary: Option<PathBuf>, format: String) -> Self {
    Self { binary, format }
  }

  fn parse_info(stdout: &[u8]) -> Result<CastMeta, ResolutionError> {
    let info: VideoInfo = serde_json::from_slice(stdout)?;
    // Merged formats come as separate video and audio streams
    let (source_url, audio_url) = match info.url {
      Some(url) => (url, None),
      None => {
        let mut streams = info.requested_formats.into_iter().map(|f| f.url);
        let video = streams.next().ok_or_else(|| {
          ResolutionError::Unsupported("no playable url in resolver output".into())
        })?;
        (video, streams.next())
      }
    };

    Ok(CastMeta {
      title: info.title,
      description: info.description.unwrap_or_default(),
      thumbnail: info.thumbnail.unwrap_or_default(),
      source_url,
      audio_url,
    })
  }
}

#[async_trait]
impl MetadataResolver for YoutubeDlResolver {
  async fn resolve(&self, request: &CastRequest) -> Result<CastMeta, ResolutionError> {
    let binary = self
      .binary
      .clone()
      .or_else(find_youtube_dl)
      .ok_or(ResolutionError::NotFound)?;

    if !request.kind.is_empty() && request.kind != "youtubedl" {
      log::debug!("Unknown cast type {:?}, resolving with youtube-dl", request.kind);
    }
    log::info!("Resolving {} with {:?}", request.data, binary);

    let output = Command::new(&binary)
      .args(["--dump-json", "--no-playlist", "--format", self.format.as_str(), "--"])
      .arg(&request.data)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      log::warn!("Resolver exited with {}: {}", output.status, stderr.trim());
      return Err(ResolutionError::Unsupported(request.data.clone()));
    }

    Self::parse_info(&output.stdout)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_single_url() {
    let json = br#"{"url":"https://cdn/v.mp4","title":"T","description":"D","thumbnail":"https://cdn/t.jpg","id":"x"}"#;
    let meta = YoutubeDlResolver::parse_info(json).unwrap();
    assert_eq!(meta.source_url, "https://cdn/v.mp4");
    assert_eq!(meta.title, "T");
    assert_eq!(meta.description, "D");
    assert_eq!(meta.thumbnail, "https://cdn/t.jpg");
    assert!(meta.audio_url.is_none());
  }

  #[test]
  fn test_parse_falls_back_to_requested_formats() {
    let json = br#"{"title":"T","requested_formats":[{"url":"https://cdn/video"},{"url":"https://cdn/audio"}]}"#;
    let meta = YoutubeDlResolver::parse_info(json).unwrap();
    assert_eq!(meta.source_url, "https://cdn/video");
    assert_eq!(meta.audio_url.as_deref(), Some("https://cdn/audio"));
    assert_eq!(meta.description, "");
  }

  #[test]
  fn test_parse_without_url_is_unsupported() {
    let json = br#"{"title":"T"}"#;
    assert!(matches!(
      YoutubeDlResolver::parse_info(json),
      Err(ResolutionError::Unsupported(_))
    ));
  }

  #[test]
  fn test_parse_garbage_is_invalid_output() {
    assert!(matches!(
      YoutubeDlResolver::parse_info(b"ERROR: nope"),
      Err(ResolutionError::InvalidOutput(_))
    ));
  }

  #[tokio::test]
  async fn test_missing_binary_fails() {
    let resolver = YoutubeDlResolver::new(
      Some(PathBuf::from("/nonexistent/raspicast-youtube-dl")),
      "best".into(),
    );
    let request = CastRequest {
      kind: "youtubedl".into(),
      data: "https://example.com".into(),
    };
    assert!(matches!(
      resolver.resolve(&request).await,
      Err(ResolutionError::Io(_))
    ));
  }
}
