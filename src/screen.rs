//! Local console output: cleared while something plays, shows the device's
//! LAN address otherwise so users know where to connect.

use std::io::Write;
use std::net::{IpAddr, UdpSocket};
use std::path::PathBuf;

use tokio::process::Command;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::player::PlaybackStatus;

/// Address of the interface used for outbound traffic. No packet is sent.
pub fn local_address() -> Option<IpAddr> {
  let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
  socket.connect("8.8.8.8:80").ok()?;
  socket.local_addr().ok().map(|addr| addr.ip())
}

/// Text shown on the idle screen.
pub fn banner_text(address: Option<IpAddr>) -> String {
  let address = address
    .map(|ip| ip.to_string().replace('.', " . "))
    .unwrap_or_else(|| "no network".to_string());
  format!("Cast IP Address\n{}", address)
}

pub struct Screen {
  figlet: Option<PathBuf>,
}

impl Screen {
  pub fn new() -> Self {
    Self {
      figlet: which::which("figlet").ok(),
    }
  }

  pub fn clear(&self) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "\x1B[2J\x1B[H");
    let _ = stdout.flush();
  }

  /// Clear and print the LAN address, large when figlet is installed.
  pub async fn print_address(&self) {
    self.clear();
    let text = banner_text(local_address());

    if let Some(figlet) = &self.figlet {
      match Command::new(figlet).args(["-c", "-w", "100"]).arg(&text).output().await {
        Ok(output) if output.status.success() => {
          let mut stdout = std::io::stdout();
          let _ = stdout.write_all(&output.stdout);
          let _ = stdout.flush();
          return;
        }
        Ok(output) => log::debug!("figlet exited with {}", output.status),
        Err(e) => log::debug!("Failed to run figlet: {}", e),
      }
    }
    println!("{}", text);
  }
}

impl Default for Screen {
  fn default() -> Self {
    Self::new()
  }
}

/// Follow session status: clear on PLAYING, show the address on STOPPED.
pub fn spawn_display(screen: Screen, mut status_rx: broadcast::Receiver<PlaybackStatus>) -> JoinHandle<()> {
  tokio::spawn(async move {
    screen.print_address().await;
    loop {
      match status_rx.recv().await {
        Ok(PlaybackStatus::Playing) => screen.clear(),
        Ok(PlaybackStatus::Stopped) => screen.print_address().await,
        Ok(PlaybackStatus::Paused) => {}
        Err(RecvError::Lagged(_)) => continue,
        Err(RecvError::Closed) => break,
      }
    }
  })
}
