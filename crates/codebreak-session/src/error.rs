//! Error types for the connection layer.

use codebreak_protocol::PlayerId;

/// Errors from connection lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The authenticator rejected the credential.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No link exists for this player.
    #[error("no connection record for player {0}")]
    UnknownPlayer(PlayerId),

    /// The presented resume token doesn't match anything the server
    /// issued. Stale token or a guessing attempt.
    #[error("invalid resume token")]
    InvalidToken,

    /// The grace window elapsed before the player came back.
    #[error("grace window elapsed for player {0}")]
    GraceExpired(PlayerId),

    /// The player already has a live connection.
    #[error("player {0} is already connected")]
    AlreadyConnected(PlayerId),
}
