//! The turn-based game session: a phase machine from first join to room
//! close.
//!
//! A `GameSession` is owned by exactly one room actor and mutated only
//! from that actor's command loop, so none of this needs locks. Every
//! operation either rejects (leaving state untouched) or applies a
//! transition and returns the [`SessionEvent`]s the room should
//! broadcast.

use std::time::SystemTime;

use codebreak_protocol::{Feedback, GameMode, Outcome, PlayerId};

use crate::{Code, CodeRules, GameError, compute_feedback};

// ---------------------------------------------------------------------------
// GameRules
// ---------------------------------------------------------------------------

/// Per-game configuration: code format, round limit, feedback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameRules {
    /// Format rules for secrets and guesses.
    pub code: CodeRules,

    /// Guesses each player gets before the game is a draw.
    pub max_rounds: u32,

    /// Feedback variant.
    pub mode: GameMode,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            code: CodeRules::default(),
            max_rounds: 10,
            mode: GameMode::Standard,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The lifecycle phase of a game session.
///
/// ```text
/// WaitingForPlayers → SubmittingSecrets → InProgress → Finished → Closed
/// ```
///
/// - **WaitingForPlayers**: fewer than two players seated.
/// - **SubmittingSecrets**: both seats taken; each player locks in one
///   secret.
/// - **InProgress**: alternating guesses, first-joined player first.
/// - **Finished**: terminal outcome reached; awaiting result
///   acknowledgments.
/// - **Closed**: both players acknowledged (or the room gave up waiting).
///   The room is eligible for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForPlayers,
    SubmittingSecrets,
    InProgress,
    Finished,
    Closed,
}

impl Phase {
    /// Returns `true` if the session is accepting a second player.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::WaitingForPlayers)
    }

    /// Returns `true` if a disconnect in this phase triggers the
    /// grace-then-forfeit path rather than plain room teardown.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::SubmittingSecrets | Self::InProgress)
    }

    /// Returns `true` once the game can no longer change outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Closed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitingForPlayers => write!(f, "WaitingForPlayers"),
            Self::SubmittingSecrets => write!(f, "SubmittingSecrets"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Finished => write!(f, "Finished"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session events and history
// ---------------------------------------------------------------------------

/// What a successful transition tells the room to broadcast.
///
/// Events carry player ids and rendered guess strings — everything the
/// room layer needs to build wire messages and notification intents
/// without reaching back into session internals.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A player took a seat.
    PlayerJoined { player: PlayerId },

    /// A secret passed validation and is locked in.
    SecretAccepted { player: PlayerId },

    /// Both secrets are set; guessing begins.
    Started { turn_owner: PlayerId },

    /// A guess was evaluated. `next_turn` is `None` when this guess
    /// ended the game.
    GuessResolved {
        player: PlayerId,
        guess: String,
        feedback: Feedback,
        next_turn: Option<PlayerId>,
    },

    /// The game reached a terminal outcome.
    Finished { outcome: Outcome, score: u32 },

    /// Both players acknowledged the result (or the session was closed
    /// without an opponent); the room can go away.
    Closed,
}

/// One resolved guess. Appended to the history and never mutated:
/// feedback is whatever the engine computed at submission time, not
/// re-evaluated later.
#[derive(Debug, Clone, PartialEq)]
pub struct GuessRecord {
    /// Seat index of the guesser (0 = first joined).
    pub seat: usize,
    /// The guesser.
    pub player: PlayerId,
    /// The validated guess.
    pub guess: Code,
    /// Feedback as it was shown to the players.
    pub feedback: Feedback,
    /// Submission wall-clock time.
    pub at: SystemTime,
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// One player's seat: identity, set-once secret, result acknowledgment.
#[derive(Debug, Clone)]
struct Seat {
    player: PlayerId,
    secret: Option<Code>,
    acked: bool,
}

/// The turn-based state machine for one match.
#[derive(Debug, Clone)]
pub struct GameSession {
    rules: GameRules,
    phase: Phase,
    /// At most two. Seat 0 is the room creator / first-joined player and
    /// owns the first turn.
    seats: Vec<Seat>,
    /// Seat index of the player allowed to guess next.
    turn: usize,
    history: Vec<GuessRecord>,
    outcome: Option<Outcome>,
}

impl GameSession {
    /// Creates an empty session waiting for its first player.
    pub fn new(rules: GameRules) -> Self {
        Self {
            rules,
            phase: Phase::WaitingForPlayers,
            seats: Vec::with_capacity(2),
            turn: 0,
            history: Vec::new(),
            outcome: None,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Resolved guesses in resolution order.
    pub fn history(&self) -> &[GuessRecord] {
        &self.history
    }

    /// Seated players in join order.
    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.seats.iter().map(|s| s.player)
    }

    pub fn player_count(&self) -> usize {
        self.seats.len()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.seat_of(player).is_some()
    }

    /// The player who may guess next, while a game is in progress.
    pub fn turn_owner(&self) -> Option<PlayerId> {
        match self.phase {
            Phase::InProgress => Some(self.seats[self.turn].player),
            _ => None,
        }
    }

    /// The player who owned the very first turn (seat 0), once both
    /// seats are taken. Used to replay a game to a reconnecting client.
    pub fn first_turn_owner(&self) -> Option<PlayerId> {
        (self.seats.len() == 2).then(|| self.seats[0].player)
    }

    /// The opponent of `player`, if both seats are taken.
    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        let seat = self.seat_of(player)?;
        self.seats.get(1 - seat).map(|s| s.player)
    }

    /// The final score once the game finished: the winner's unused guess
    /// turns, zero for a draw.
    pub fn final_score(&self) -> Option<u32> {
        self.outcome.map(|o| self.score_for(o))
    }

    fn seat_of(&self, player: PlayerId) -> Option<usize> {
        self.seats.iter().position(|s| s.player == player)
    }

    fn guesses_by(&self, seat: usize) -> u32 {
        self.history.iter().filter(|r| r.seat == seat).count() as u32
    }

    fn score_for(&self, outcome: Outcome) -> u32 {
        match outcome {
            Outcome::Win { winner } | Outcome::Forfeit { winner, .. } => {
                self.seat_of(winner)
                    .map(|seat| {
                        self.rules
                            .max_rounds
                            .saturating_sub(self.guesses_by(seat))
                    })
                    .unwrap_or(0)
            }
            Outcome::Draw => 0,
        }
    }

    // -- Transitions ------------------------------------------------------

    /// Seats a player. The second join moves the session to
    /// `SubmittingSecrets`.
    pub fn add_player(
        &mut self,
        player: PlayerId,
    ) -> Result<Vec<SessionEvent>, GameError> {
        if self.contains(player) {
            return Err(GameError::AlreadySeated(player));
        }
        if !self.phase.is_joinable() || self.seats.len() >= 2 {
            return Err(GameError::SeatsFull);
        }

        self.seats.push(Seat {
            player,
            secret: None,
            acked: false,
        });

        if self.seats.len() == 2 {
            self.phase = Phase::SubmittingSecrets;
        }

        Ok(vec![SessionEvent::PlayerJoined { player }])
    }

    /// Locks in a player's secret. Accepted exactly once per player;
    /// when the second secret lands the game starts and seat 0 owns the
    /// first turn.
    pub fn submit_secret(
        &mut self,
        player: PlayerId,
        raw: &str,
    ) -> Result<Vec<SessionEvent>, GameError> {
        let seat = self
            .seat_of(player)
            .ok_or(GameError::UnknownPlayer(player))?;

        if self.phase != Phase::SubmittingSecrets {
            return Err(GameError::NotAcceptingSecrets(self.phase));
        }
        if self.seats[seat].secret.is_some() {
            return Err(GameError::SecretAlreadySet(player));
        }

        let code =
            self.rules.code.parse(raw).map_err(GameError::InvalidSecret)?;
        self.seats[seat].secret = Some(code);

        let mut events = vec![SessionEvent::SecretAccepted { player }];

        if self.seats.iter().all(|s| s.secret.is_some()) {
            self.phase = Phase::InProgress;
            self.turn = 0;
            events.push(SessionEvent::Started {
                turn_owner: self.seats[0].player,
            });
        }

        Ok(events)
    }

    /// Evaluates a guess from the turn owner against the opponent's
    /// secret, appends it to the history, and flips the turn — or ends
    /// the game on a full exact match or on the round limit.
    pub fn submit_guess(
        &mut self,
        player: PlayerId,
        raw: &str,
    ) -> Result<Vec<SessionEvent>, GameError> {
        let seat = self
            .seat_of(player)
            .ok_or(GameError::UnknownPlayer(player))?;

        if self.phase != Phase::InProgress {
            return Err(GameError::NotInProgress(self.phase));
        }
        if seat != self.turn {
            return Err(GameError::NotYourTurn(player));
        }

        let guess =
            self.rules.code.parse(raw).map_err(GameError::InvalidGuess)?;

        let opponent = 1 - seat;
        let secret = self.seats[opponent]
            .secret
            .as_ref()
            .ok_or(GameError::CorruptState(
                "game in progress with a missing secret",
            ))?;

        let feedback = compute_feedback(&guess, secret, self.rules.mode);
        let won = usize::from(feedback.exact) == self.rules.code.length;

        self.history.push(GuessRecord {
            seat,
            player,
            guess: guess.clone(),
            feedback,
            at: SystemTime::now(),
        });

        if won {
            return Ok(self.finish(
                Outcome::Win { winner: player },
                Some(SessionEvent::GuessResolved {
                    player,
                    guess: guess.to_string(),
                    feedback,
                    next_turn: None,
                }),
            ));
        }

        let round_limit = self.rules.max_rounds as usize * 2;
        if round_limit > 0 && self.history.len() >= round_limit {
            return Ok(self.finish(
                Outcome::Draw,
                Some(SessionEvent::GuessResolved {
                    player,
                    guess: guess.to_string(),
                    feedback,
                    next_turn: None,
                }),
            ));
        }

        self.turn = opponent;
        Ok(vec![SessionEvent::GuessResolved {
            player,
            guess: guess.to_string(),
            feedback,
            next_turn: Some(self.seats[opponent].player),
        }])
    }

    /// Records a player's acknowledgment of the final result. When both
    /// players have acknowledged, the session closes. Repeat
    /// acknowledgments are no-ops.
    pub fn acknowledge_result(
        &mut self,
        player: PlayerId,
    ) -> Result<Vec<SessionEvent>, GameError> {
        let seat = self
            .seat_of(player)
            .ok_or(GameError::UnknownPlayer(player))?;

        if self.phase != Phase::Finished {
            return Err(GameError::NotFinished(self.phase));
        }
        if self.seats[seat].acked {
            return Ok(Vec::new());
        }

        self.seats[seat].acked = true;

        if self.seats.iter().all(|s| s.acked) {
            self.phase = Phase::Closed;
            return Ok(vec![SessionEvent::Closed]);
        }
        Ok(Vec::new())
    }

    /// Ends the game because `player` abandoned it — an unresolved
    /// disconnect past the grace window, or an explicit mid-game leave.
    ///
    /// In an active two-player game the opponent wins by forfeit. A lone
    /// player abandoning a waiting room just closes the session. After a
    /// terminal phase this is a no-op: leaving a finished game is not a
    /// forfeit.
    pub fn forfeit(
        &mut self,
        player: PlayerId,
    ) -> Result<Vec<SessionEvent>, GameError> {
        let seat = self
            .seat_of(player)
            .ok_or(GameError::UnknownPlayer(player))?;

        match self.phase {
            Phase::WaitingForPlayers => {
                self.phase = Phase::Closed;
                Ok(vec![SessionEvent::Closed])
            }
            Phase::SubmittingSecrets | Phase::InProgress => {
                let winner = self.seats[1 - seat].player;
                // The deserter will never acknowledge; count them as
                // done so the survivor's ack alone closes the room.
                self.seats[seat].acked = true;
                Ok(self.finish(
                    Outcome::Forfeit { winner, deserter: player },
                    None,
                ))
            }
            Phase::Finished | Phase::Closed => Ok(Vec::new()),
        }
    }

    fn finish(
        &mut self,
        outcome: Outcome,
        preceding: Option<SessionEvent>,
    ) -> Vec<SessionEvent> {
        self.phase = Phase::Finished;
        self.outcome = Some(outcome);
        let score = self.score_for(outcome);

        let mut events = Vec::with_capacity(2);
        if let Some(event) = preceding {
            events.push(event);
        }
        events.push(SessionEvent::Finished { outcome, score });
        events
    }
}

// =========================================================================
// Tests
// =========================================================================
