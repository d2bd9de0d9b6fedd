//! MPV process detection and spawning.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use thiserror::Error;

use crate::player::{LaunchOptions, OutputMode};

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPV executable not found")]
  NotFound,
  #[error("Failed to spawn MPV: {0}")]
  SpawnFailed(#[from] std::io::Error),
}

/// Find MPV executable in common locations.
pub fn find_mpv() -> Option<PathBuf> {
  if let Ok(path) = which::which("mpv") {
    return Some(path);
  }

  ["/usr/bin/mpv", "/usr/local/bin/mpv"]
    .into_iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

/// mpv `--audio-device` value for an output mode. `Both` leaves routing to mpv.
pub fn audio_device(output: OutputMode) -> Option<&'static str> {
  match output {
    OutputMode::Hdmi => Some("alsa/hdmi"),
    OutputMode::Local => Some("alsa/default"),
    OutputMode::Both => None,
  }
}

/// Command-line arguments for a launch, excluding the binary itself.
pub fn launch_args(ipc_path: &str, opts: &LaunchOptions, extra_args: &[String]) -> Vec<String> {
  let mut args = vec![
    format!("--input-ipc-server={}", ipc_path),
    "--idle=yes".to_string(),
    "--fullscreen".to_string(),
    "--keep-open=no".to_string(),
    "--no-terminal".to_string(),
  ];

  if opts.looping {
    args.push("--loop-file=inf".to_string());
  }
  if opts.suppress_osd {
    args.push("--osd-level=0".to_string());
  }
  if let Some(device) = audio_device(opts.output) {
    args.push(format!("--audio-device={}", device));
  }

  if let Some(audio) = &opts.audio_source {
    args.push(format!("--audio-file={}", audio));
  }

  args.extend(extra_args.iter().cloned());

  if let Some(source) = &opts.source {
    args.push("--".to_string());
    args.push(source.clone());
  }
  args
}

/// Spawn MPV process with IPC server enabled.
pub fn spawn_mpv(
  mpv_path: Option<&Path>,
  ipc_path: &str,
  opts: &LaunchOptions,
  extra_args: &[String],
) -> Result<Child, ProcessError> {
  let mpv_exe = mpv_path
    .map(Path::to_path_buf)
    .or_else(find_mpv)
    .ok_or(ProcessError::NotFound)?;

  let args = launch_args(ipc_path, opts, extra_args);
  log::info!("Spawning MPV: {:?} {:?}", mpv_exe, args);

  let child = Command::new(&mpv_exe)
    .args(&args)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()?;

  Ok(child)
}

/// Remove a stale IPC socket left behind by a previous process.
pub fn cleanup_ipc(ipc_path: &str) {
  let _ = std::fs::remove_file(ipc_path);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_launch_args_for_looping_placeholder() {
    let opts = LaunchOptions {
      source: Some("assets/loading-screen.mp4".to_string()),
      audio_source: None,
      looping: true,
      output: OutputMode::Hdmi,
      suppress_osd: true,
    };
    let args = launch_args("/tmp/test.sock", &opts, &["--vo=gpu".to_string()]);

    assert_eq!(args[0], "--input-ipc-server=/tmp/test.sock");
    assert!(args.contains(&"--loop-file=inf".to_string()));
    assert!(args.contains(&"--osd-level=0".to_string()));
    assert!(args.contains(&"--audio-device=alsa/hdmi".to_string()));
    assert!(args.contains(&"--vo=gpu".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("assets/loading-screen.mp4"));
  }

  #[test]
  fn test_idle_launch_has_no_source() {
    let opts = LaunchOptions {
      source: None,
      audio_source: None,
      looping: false,
      output: OutputMode::Both,
      suppress_osd: false,
    };
    let args = launch_args("/tmp/test.sock", &opts, &[]);

    assert!(!args.iter().any(|a| a == "--"));
    assert!(!args.iter().any(|a| a.starts_with("--audio-device")));
    assert!(!args.iter().any(|a| a.starts_with("--loop-file")));
  }

  #[test]
  fn test_separate_audio_track_is_passed() {
    let opts = LaunchOptions {
      source: Some("https://cdn/video".to_string()),
      audio_source: Some("https://cdn/audio".to_string()),
      looping: false,
      output: OutputMode::Both,
      suppress_osd: true,
    };
    let args = launch_args("/tmp/test.sock", &opts, &[]);
    assert!(args.contains(&"--audio-file=https://cdn/audio".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("https://cdn/video"));
  }
}
