//! Game rules for Codebreak: feedback computation, code validation, and
//! the turn-based session state machine.
//!
//! Everything in this crate is synchronous and free of I/O. The room
//! layer drives a [`GameSession`] from its actor loop and broadcasts the
//! [`SessionEvent`]s it returns; nothing in here ever suspends, so a
//! room's transitions stay strictly serialized.
//!
//! # Key types
//!
//! - [`compute_feedback`] — evaluates a guess against a secret
//! - [`CodeRules`] / [`Code`] — format validation for secrets and guesses
//! - [`GameSession`] — the phase machine from first join to room close
//! - [`SessionEvent`] — what the room layer broadcasts after a transition

mod error;
mod feedback;
mod rules;
mod session;

pub use error::{CodeError, GameError};
pub use feedback::compute_feedback;
pub use rules::{Code, CodeRules, DEFAULT_CODE_LENGTH};
pub use session::{
    GameRules, GameSession, GuessRecord, Phase, SessionEvent,
};
