use std::path::PathBuf;
use std::process::ExitCode;

use raspicast::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
  let path = std::env::args_os()
    .nth(1)
    .map(PathBuf::from)
    .or_else(AppConfig::default_path);

  let config = match &path {
    Some(path) => AppConfig::load(path),
    None => Ok(AppConfig::default()),
  };
  let config = match config {
    Ok(config) => config,
    Err(e) => {
      eprintln!("raspicast: {}", e);
      return ExitCode::FAILURE;
    }
  };

  let level = config.log_level().unwrap_or(log::LevelFilter::Info);
  if let Err(e) = simple_logger::SimpleLogger::new()
    .with_level(level)
    .with_utc_timestamps()
    .init()
  {
    eprintln!("raspicast: failed to build logger instance: {}", e);
    return ExitCode::FAILURE;
  }

  if let Some(path) = &path {
    log::info!("Using config {}", path.display());
  }

  match raspicast::run(config).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      log::error!("raspicast failed: {}", e);
      ExitCode::FAILURE
    }
  }
}
