//! Core protocol types for Codebreak's wire format.
//!
//! Everything in this module travels on the wire. The shapes are part of
//! the client contract: requests from the client are [`ClientMessage`]
//! variants, acknowledgments and pushed events from the server are
//! [`ServerMessage`] variants, and both directions are wrapped in an
//! [`Envelope`] carrying sequencing metadata.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a `PlayerId` can never be confused with a
/// [`RoomId`] in a signature. `#[serde(transparent)]` keeps the JSON
/// representation a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a room (one match between two players).
///
/// Room identifiers are drawn at random on creation, so they are opaque
/// and not guessable from earlier ids. Displayed as zero-padded hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{:016x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Game values
// ---------------------------------------------------------------------------

/// The feedback variant a room was created with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
pub enum GameMode {
    /// Full feedback: exact, misplaced, and out-of-place counts.
    #[default]
    Standard,

    /// Reduced feedback: only the total number of correct digits is
    /// exposed; positional detail is withheld.
    Hard,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// The evaluation of one guess against a secret.
///
/// In hard mode `misplaced` and `out_of_place` are zeroed in the value
/// sent to clients; `exact` and `total_correct` are always filled in,
/// and the server's win check runs on `exact`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
pub struct Feedback {
    /// Digits correct and in the correct position.
    pub exact: u8,
    /// Digits present in the secret but in the wrong position.
    pub misplaced: u8,
    /// Digits absent from the secret.
    pub out_of_place: u8,
    /// Digits present in the secret anywhere, counted with multiplicity
    /// bounded by the secret's own digit counts.
    pub total_correct: u8,
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Outcome {
    /// A player decoded the opponent's secret.
    Win { winner: PlayerId },
    /// The round limit was reached with no winner.
    Draw,
    /// A player abandoned the game (disconnect past the grace window,
    /// or an explicit leave mid-game). The remaining player wins.
    Forfeit { winner: PlayerId, deserter: PlayerId },
}

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// Machine-readable classification of a wire-level error.
///
/// Clients branch on the kind; `message` in [`ServerMessage::Error`] is
/// for logs and humans only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    RoomFull,
    RoomNotFound,
    AlreadyInRoom,
    NotInRoom,
    InvalidSecretFormat,
    SecretAlreadySet,
    InvalidGuess,
    NotYourTurn,
    GameNotInProgress,
    WrongPhase,
    AuthFailed,
    BadRequest,
    Internal,
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Requests a client can make.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON, e.g.
/// `{ "type": "SubmitGuess", "room_id": 7, "guess": "12345" }` — the
/// format client SDKs work with directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    // -- Connection lifecycle --
    /// First message on a fresh connection. `version` guards against
    /// incompatible clients; `token` is handed to the authenticator.
    Handshake { version: u32, token: Option<String> },

    /// First message on a connection resuming a dropped session within
    /// the grace window. The token was issued in `HandshakeAck`.
    Resume { reconnect_token: String },

    /// Keep-alive. `client_time` is echoed back for RTT calculation.
    Heartbeat { client_time: u64 },

    /// Clean goodbye, with a reason for the logs.
    Disconnect { reason: String },

    // -- Rooms and matchmaking --
    /// Create a private room and take the first seat in it.
    CreateRoom { mode: GameMode },

    /// Join an existing room by id.
    JoinRoom { room_id: RoomId },

    /// Enter the matchmaking pool for the given mode.
    Enqueue { mode: GameMode },

    /// Leave the matchmaking pool before being paired.
    CancelQueue,

    /// Leave the current room. Mid-game this forfeits.
    LeaveRoom { room_id: RoomId },

    // -- Game actions --
    /// Submit the secret the opponent must decode. Accepted exactly once
    /// per player per game.
    SubmitSecret { room_id: RoomId, secret: String },

    /// Submit a guess against the opponent's secret.
    SubmitGuess { room_id: RoomId, guess: String },

    /// Acknowledge a finished game's result. When both players have
    /// acknowledged, the room closes.
    AckResult { room_id: RoomId },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Acknowledgments and pushed events from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    // -- Connection lifecycle --
    /// Handshake accepted. `reconnect_token` lets the client resume this
    /// session after a dropped connection.
    HandshakeAck {
        player_id: PlayerId,
        reconnect_token: String,
        server_time: u64,
    },

    /// Keep-alive echo.
    HeartbeatAck { client_time: u64, server_time: u64 },

    // -- Room acknowledgments --
    /// A private room was created and the creator seated.
    RoomCreated { room_id: RoomId },

    /// The join request succeeded.
    RoomJoined { room_id: RoomId },

    /// Enqueued; pairing happens when another player of the same mode
    /// arrives.
    Queued,

    /// Removed from the matchmaking pool.
    QueueCancelled,

    /// The secret passed validation and is locked in.
    SecretAccepted { room_id: RoomId },

    /// The leave request was processed.
    LeftRoom { room_id: RoomId },

    // -- Pushed game events --
    /// The other seat was taken; the room moves to secret submission.
    OpponentJoined { room_id: RoomId, player: PlayerId },

    /// Both secrets are in; guessing begins.
    GameStarted { room_id: RoomId, turn_owner: PlayerId },

    /// A guess was evaluated. Sent to both players. `next_turn` is absent
    /// when this guess ended the game.
    GuessResolved {
        room_id: RoomId,
        player: PlayerId,
        guess: String,
        feedback: Feedback,
        next_turn: Option<PlayerId>,
    },

    /// Terminal result. `score` is the winner's unused guess turns
    /// (zero for a draw).
    GameFinished {
        room_id: RoomId,
        outcome: Outcome,
        score: u32,
    },

    /// The opponent's connection dropped; the game is held open for
    /// `grace_ms` before a forfeit is declared.
    OpponentDisconnected { room_id: RoomId, grace_ms: u64 },

    /// The opponent came back within the grace window.
    OpponentReconnected { room_id: RoomId },

    // -- Errors --
    /// A request was rejected or a room failed. Recoverable unless
    /// `kind` is `Internal`.
    Error { kind: ErrorKind, message: String },
}

// ---------------------------------------------------------------------------
// Envelope — the top-level wire format
// ---------------------------------------------------------------------------

/// The top-level wrapper: every message on the wire is an `Envelope`.
///
/// `seq` is a per-sender auto-incrementing counter used to detect missing
/// or reordered messages; `timestamp` is milliseconds since the sender's
/// epoch (server start for server messages).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: P,
}

// =========================================================================
// Tests
// =========================================================================
