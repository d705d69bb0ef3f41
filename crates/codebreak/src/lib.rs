//! # Codebreak
//!
//! Real-time session coordinator for a two-player turn-based
//! codebreaking game: secrets in, alternating guesses, structured
//! feedback until one player decodes the opponent's number or the round
//! limit lands a draw.
//!
//! The server ties the layers together: transport → protocol →
//! connections → rooms. Each room is an isolated actor task; the
//! registry, matchmaking pool, and connection manager are single-owner
//! structures behind mutexes in the shared server state, injected rather
//! than global so tests can build and tear down whole servers at will.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use codebreak::prelude::*;
//! use codebreak_protocol::PlayerId;
//!
//! struct NumericAuth;
//!
//! impl Authenticator for NumericAuth {
//!     async fn authenticate(
//!         &self,
//!         token: &str,
//!     ) -> Result<PlayerId, ConnectionError> {
//!         token
//!             .parse()
//!             .map(PlayerId)
//!             .map_err(|_| ConnectionError::AuthFailed("not a number".into()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ServerBuilder::new()
//!         .bind("0.0.0.0:8080")
//!         .build(NumericAuth)
//!         .await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod error;
mod handler;
mod server;

pub use error::ServerError;
pub use server::{CodebreakServer, PROTOCOL_VERSION, ServerBuilder};

/// The usual imports for building and running a server.
pub mod prelude {
    pub use crate::{
        CodebreakServer, PROTOCOL_VERSION, ServerBuilder, ServerError,
    };
    pub use codebreak_game::GameRules;
    pub use codebreak_notify::{
        MemorySink, Notification, NotificationSink, TracingSink,
    };
    pub use codebreak_protocol::{
        ClientMessage, Codec, Envelope, ErrorKind, Feedback, GameMode,
        JsonCodec, Outcome, PlayerId, RoomId, ServerMessage,
    };
    pub use codebreak_session::{Authenticator, ConnectionError};
}
