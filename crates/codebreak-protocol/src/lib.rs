//! Wire protocol for Codebreak.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Types** ([`Envelope`], [`ClientMessage`], [`ServerMessage`], etc.) —
//!   the message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! Every operation and pushed event is an explicit tagged variant. The
//! protocol layer carries no opaque payload bytes — a message either
//! deserializes into a known shape or is rejected at the boundary before
//! it can reach game logic.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientMessage, Envelope, ErrorKind, Feedback, GameMode, Outcome,
    PlayerId, RoomId, ServerMessage,
};
