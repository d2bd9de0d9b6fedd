//! Observer-facing side: WebSocket server, notification hub and wire format.

mod hub;
mod protocol;
mod server;

pub use hub::{NotificationHub, ObserverId, Outbound};
pub use protocol::{ClientMessage, Command, ServerEvent};
pub use server::serve;
