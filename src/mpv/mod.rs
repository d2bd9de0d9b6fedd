//! MPV IPC module - spawns and controls an external MPV player via JSON IPC.
//!
//! Architecture:
//! - `process.rs` - MPV binary detection and process spawning
//! - `ipc.rs` - Async Unix socket connection, request/response matching
//! - `protocol.rs` - JSON command/response types and serialization
//! - `client.rs` - `MpvClient`, the `PlayerBackend` used in production

mod client;
mod ipc;
mod process;
mod protocol;

pub use client::MpvClient;
pub use ipc::IpcError;
pub use process::{find_mpv, ProcessError};
