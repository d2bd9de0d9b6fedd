//! Playback control: the player process and the session state machine on top.
//!
//! - `backend.rs` - `PlayerBackend` trait implemented by concrete players
//! - `handle.rs` - `ProcessHandle`, one live process instance
//! - `session.rs` - `PlaybackSession`, canonical state and command serialization
//! - `types.rs` - status and metadata types shared with observers

mod backend;
mod handle;
mod session;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{LaunchOptions, OutputMode, PlayerBackend};
pub use handle::{whole_seconds, ProcessHandle};
pub use session::{PlaybackSession, SessionConfig};
pub use types::{CastMeta, InitialState, PlaybackStatus};
