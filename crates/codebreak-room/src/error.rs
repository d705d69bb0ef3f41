//! Error types for the room layer.

use codebreak_game::GameError;
use codebreak_protocol::{PlayerId, RoomId};

/// Errors that can occur during room and matchmaking operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room has no free seat.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The player is already in a room.
    #[error("player {0} already in room {1}")]
    AlreadyInRoom(PlayerId, RoomId),

    /// The player addressed a room they are not in.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// The player is not in any room.
    #[error("player {0} is not in any room")]
    NoRoom(PlayerId),

    /// The player is already waiting in the matchmaking pool.
    #[error("player {0} is already queued")]
    AlreadyQueued(PlayerId),

    /// The room's command channel is closed or full — the actor is gone
    /// or wedged.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// A game-level rejection (validation or state error). No room state
    /// changed.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A room invariant was violated. Fatal to that room only: it is
    /// torn down and both clients notified.
    #[error("room {room_id} state is inconsistent: {detail}")]
    Inconsistent { room_id: RoomId, detail: String },
}
