//! Unified error type for the Codebreak server.

use codebreak_protocol::ProtocolError;
use codebreak_room::RoomError;
use codebreak_session::ConnectionError;
use codebreak_transport::TransportError;

/// Top-level error wrapping each layer's error type, so `?` composes
/// across the stack.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A connection-lifecycle error (auth, resume, grace expiry).
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A room or matchmaking error.
    #[error(transparent)]
    Room(#[from] RoomError),
}
