use std::sync::Arc;

pub mod config;
pub mod error;
pub mod gateway;
pub mod mpv;
pub mod player;
pub mod resolver;
pub mod screen;

pub use config::AppConfig;
use gateway::NotificationHub;
use mpv::MpvClient;
use player::PlaybackSession;
use resolver::YoutubeDlResolver;
use screen::Screen;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Wire up the player, the hub and the WebSocket server, and run until Ctrl-C.
pub async fn run(config: AppConfig) -> std::io::Result<()> {
  let mpv_path = config.mpv_path();
  if mpv_path.is_none() && mpv::find_mpv().is_none() {
    log::warn!("MPV executable not found, casts will fail until it is installed");
  }
  if config.youtube_dl_path().is_none() && resolver::find_youtube_dl().is_none() {
    log::warn!("yt-dlp / youtube-dl not found, casts will fail until one is installed");
  }

  let backend = Arc::new(MpvClient::new(
    mpv_path,
    config.mpv_args.clone(),
    config.ipc_socket.clone(),
  ));
  let resolver = Arc::new(YoutubeDlResolver::new(
    config.youtube_dl_path(),
    config.youtube_dl_format.clone(),
  ));
  let session = PlaybackSession::new(backend.clone(), resolver, config.session_config());

  let hub = NotificationHub::new(session.clone(), config.poll_interval());
  let fanout = hub.start();

  let display = config
    .screen_enabled
    .then(|| screen::spawn_display(Screen::new(), session.subscribe()));

  let listener = TcpListener::bind(&config.listen_addr).await?;

  let shutdown = CancellationToken::new();
  let signal = shutdown.clone();
  tokio::spawn(async move {
    match tokio::signal::ctrl_c().await {
      Ok(()) => log::info!("Ctrl-C received, shutting down"),
      Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
    }
    signal.cancel();
  });

  gateway::serve(listener, hub, shutdown).await?;

  session.shutdown().await;
  backend.stop().await;
  fanout.abort();
  if let Some(display) = display {
    display.abort();
  }
  log::info!("Stopped");
  Ok(())
}
