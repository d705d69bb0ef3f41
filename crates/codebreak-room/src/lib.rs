//! Room lifecycle for Codebreak.
//!
//! Each room runs as an isolated tokio task (actor model) owning one
//! [`GameSession`](codebreak_game::GameSession). Commands arrive over a
//! bounded channel and are applied one at a time, so a room's state
//! transitions are strictly serialized while different rooms proceed in
//! parallel. Outbound traffic goes through per-player channels and never
//! happens inside the actor's critical path beyond an unbounded send.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — creates/destroys rooms, routes players, sweeps
//!   idle rooms
//! - [`RoomHandle`] — command a running room actor
//! - [`MatchmakingQueue`] — FIFO pairing of anonymous players, per mode
//! - [`RoomConfig`] — per-room rules and timing

mod config;
mod error;
mod matchmaking;
mod registry;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use matchmaking::{MatchmakingQueue, QueueEntry, QueueOutcome};
pub use registry::RoomRegistry;
pub use room::{PlayerSender, RoomHandle, RoomSnapshot};
