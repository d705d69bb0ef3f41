//! Error types for the game layer.

use codebreak_protocol::PlayerId;

use crate::session::Phase;

/// A secret or guess failed format validation.
///
/// Reported to the submitting client only; no game state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    /// The code has the wrong number of digits.
    #[error("expected {expected} digits, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// A character is not a decimal digit.
    #[error("character {found:?} at position {position} is not a digit")]
    NotADigit { position: usize, found: char },

    /// The rules require all-distinct digits and one repeats.
    #[error("digit {digit} appears more than once")]
    RepeatedDigit { digit: u8 },
}

/// Errors from [`GameSession`](crate::GameSession) operations.
///
/// Every variant is a rejection: the session state is unchanged when one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// The submitted secret failed format validation.
    #[error("invalid secret: {0}")]
    InvalidSecret(#[source] CodeError),

    /// The submitted guess failed format validation.
    #[error("invalid guess: {0}")]
    InvalidGuess(#[source] CodeError),

    /// The player already locked in a secret this game.
    #[error("player {0} already submitted a secret")]
    SecretAlreadySet(PlayerId),

    /// A guess arrived from the player who isn't the turn owner.
    #[error("it is not player {0}'s turn")]
    NotYourTurn(PlayerId),

    /// A secret arrived outside the submission phase.
    #[error("not accepting secrets in phase {0}")]
    NotAcceptingSecrets(Phase),

    /// A guess arrived while no game was in progress.
    #[error("no game in progress (phase {0})")]
    NotInProgress(Phase),

    /// A result acknowledgment arrived before the game finished.
    #[error("game is not finished (phase {0})")]
    NotFinished(Phase),

    /// The player holds no seat in this game.
    #[error("player {0} is not part of this game")]
    UnknownPlayer(PlayerId),

    /// The player is already seated.
    #[error("player {0} is already seated in this game")]
    AlreadySeated(PlayerId),

    /// Both seats are taken (or the game already started).
    #[error("game already has two players")]
    SeatsFull,

    /// An invariant the session relies on was violated. The room treats
    /// this as fatal to itself: teardown, never silent recovery.
    #[error("corrupt game state: {0}")]
    CorruptState(&'static str),
}
