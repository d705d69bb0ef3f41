//! Room actor: an isolated tokio task that owns one game session.
//!
//! Each room runs in its own task and talks to the outside world through
//! an mpsc command channel, so all transitions on one room are applied in
//! arrival order with no shared mutable state. Broadcasting to players is
//! an unbounded-channel send; the per-connection writer tasks do the
//! actual network I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use codebreak_game::{GameError, GameSession, Phase, SessionEvent};
use codebreak_notify::{Notification, NotificationSink};
use codebreak_protocol::{
    ErrorKind, Outcome, PlayerId, RoomId, ServerMessage,
};
use tokio::sync::{mpsc, oneshot};

use crate::{RoomConfig, RoomError};

/// Channel sender delivering outbound wire messages to one player's
/// connection handler.
pub type PlayerSender = mpsc::UnboundedSender<ServerMessage>;

/// Commands sent to a room actor through its channel. Variants carrying
/// a `reply` are request/response; the rest are fire-and-forget.
pub(crate) enum RoomCommand {
    Join {
        player: PlayerId,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// Rebind a reconnecting player's outbound channel and replay the
    /// game so far to them.
    Resume {
        player: PlayerId,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    SubmitSecret {
        player: PlayerId,
        secret: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    SubmitGuess {
        player: PlayerId,
        guess: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    AckResult {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// The player's socket dropped; hold their seat for the grace
    /// window.
    Disconnected { player: PlayerId },
    /// The grace window elapsed without a resume; the game ends.
    Forfeit { player: PlayerId },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Shutdown,
}

/// A point-in-time view of room metadata, served by the actor.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub phase: Phase,
    /// Seated players in join order.
    pub players: Vec<PlayerId>,
    /// Players with a live outbound channel.
    pub connected: usize,
    /// Time since the last command that changed anything.
    pub idle_for: Duration,
    /// Whether the registry's sweep should reclaim this room.
    pub reclaimable: bool,
}

/// Handle to a running room actor. Cheap to clone — it wraps an
/// `mpsc::Sender`.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub async fn join(
        &self,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Join { player, sender, reply })
            .await?
    }

    pub async fn resume(
        &self,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Resume { player, sender, reply })
            .await?
    }

    pub async fn submit_secret(
        &self,
        player: PlayerId,
        secret: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SubmitSecret {
            player,
            secret,
            reply,
        })
        .await?
    }

    pub async fn submit_guess(
        &self,
        player: PlayerId,
        guess: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SubmitGuess {
            player,
            guess,
            reply,
        })
        .await?
    }

    pub async fn ack_result(
        &self,
        player: PlayerId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::AckResult { player, reply })
            .await?
    }

    pub async fn leave(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply }).await?
    }

    /// Fire-and-forget: the player's socket dropped.
    pub async fn disconnected(
        &self,
        player: PlayerId,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Disconnected { player })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Fire-and-forget: the player's grace window elapsed.
    pub async fn forfeit(
        &self,
        player: PlayerId,
    ) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Forfeit { player })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx.await.map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Sends a command carrying a reply channel and waits for the reply.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx.await.map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

/// The internal room actor state. Runs inside a tokio task.
struct RoomActor {
    room_id: RoomId,
    config: RoomConfig,
    session: GameSession,
    /// Live outbound channels, one per connected player. A seated player
    /// with no entry here is in their grace window.
    links: HashMap<PlayerId, PlayerSender>,
    notify: Arc<dyn NotificationSink>,
    last_activity: Instant,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop, processing commands until shutdown or a
    /// fatal inconsistency.
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join { player, sender, reply } => {
                    self.touch();
                    // Reply before dispatching so the caller's ack is
                    // queued ahead of any broadcast the join caused.
                    match self.handle_join(player, sender) {
                        Ok(events) => {
                            let _ = reply.send(Ok(()));
                            self.dispatch(&events);
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                RoomCommand::Resume { player, sender, reply } => {
                    self.touch();
                    match self.handle_resume(player, sender) {
                        Ok(()) => {
                            let _ = reply.send(Ok(()));
                            self.send_to_others(
                                player,
                                ServerMessage::OpponentReconnected {
                                    room_id: self.room_id,
                                },
                            );
                            self.replay_to(player);
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                RoomCommand::SubmitSecret { player, secret, reply } => {
                    self.touch();
                    match self.handle_secret(player, &secret) {
                        Ok(events) => {
                            let _ = reply.send(Ok(()));
                            self.dispatch(&events);
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                RoomCommand::SubmitGuess { player, guess, reply } => {
                    self.touch();
                    match self.handle_guess(player, &guess) {
                        Ok(events) => {
                            let _ = reply.send(Ok(()));
                            self.dispatch(&events);
                        }
                        Err(e) => {
                            let fatal = matches!(
                                e,
                                RoomError::Inconsistent { .. }
                            );
                            let _ = reply.send(Err(e));
                            if fatal {
                                self.teardown();
                                break;
                            }
                        }
                    }
                }
                RoomCommand::AckResult { player, reply } => {
                    self.touch();
                    match self.handle_ack(player) {
                        Ok(events) => {
                            let _ = reply.send(Ok(()));
                            self.dispatch(&events);
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                RoomCommand::Leave { player, reply } => {
                    self.touch();
                    match self.handle_leave(player) {
                        Ok(events) => {
                            let _ = reply.send(Ok(()));
                            self.dispatch(&events);
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                RoomCommand::Disconnected { player } => {
                    self.touch();
                    self.handle_disconnected(player);
                }
                RoomCommand::Forfeit { player } => {
                    self.touch();
                    self.handle_forfeit(player);
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_id = %self.room_id, "room shutting down");
                    break;
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn handle_join(
        &mut self,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<Vec<SessionEvent>, RoomError> {
        if !self.session.phase().is_joinable() {
            return Err(RoomError::RoomFull(self.room_id));
        }

        let events = match self.session.add_player(player) {
            Ok(events) => events,
            Err(GameError::AlreadySeated(p)) => {
                return Err(RoomError::AlreadyInRoom(p, self.room_id));
            }
            Err(GameError::SeatsFull) => {
                return Err(RoomError::RoomFull(self.room_id));
            }
            Err(e) => return Err(e.into()),
        };

        self.links.insert(player, sender);
        tracing::info!(
            room_id = %self.room_id,
            %player,
            players = self.session.player_count(),
            "player joined"
        );
        Ok(events)
    }

    /// Rebinds a returning player's outbound channel. The caller replays
    /// the game to them after replying.
    fn handle_resume(
        &mut self,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        if !self.session.contains(player) {
            return Err(RoomError::NotInRoom(player, self.room_id));
        }

        self.links.insert(player, sender);
        tracing::info!(room_id = %self.room_id, %player, "player resumed");
        Ok(())
    }

    fn handle_secret(
        &mut self,
        player: PlayerId,
        secret: &str,
    ) -> Result<Vec<SessionEvent>, RoomError> {
        Ok(self.session.submit_secret(player, secret)?)
    }

    fn handle_guess(
        &mut self,
        player: PlayerId,
        guess: &str,
    ) -> Result<Vec<SessionEvent>, RoomError> {
        match self.session.submit_guess(player, guess) {
            Ok(events) => Ok(events),
            Err(GameError::CorruptState(detail)) => {
                Err(RoomError::Inconsistent {
                    room_id: self.room_id,
                    detail: detail.into(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn handle_ack(
        &mut self,
        player: PlayerId,
    ) -> Result<Vec<SessionEvent>, RoomError> {
        Ok(self.session.acknowledge_result(player)?)
    }

    fn handle_leave(
        &mut self,
        player: PlayerId,
    ) -> Result<Vec<SessionEvent>, RoomError> {
        if !self.session.contains(player) {
            return Err(RoomError::NotInRoom(player, self.room_id));
        }

        // An explicit leave forfeits immediately; no grace window.
        let events = self.session.forfeit(player)?;
        self.links.remove(&player);
        tracing::info!(room_id = %self.room_id, %player, "player left");
        Ok(events)
    }

    fn handle_disconnected(&mut self, player: PlayerId) {
        if self.links.remove(&player).is_none() {
            return;
        }
        tracing::info!(
            room_id = %self.room_id,
            %player,
            "player dropped, holding seat for grace window"
        );

        if self.session.contains(player) && self.session.phase().is_active()
        {
            self.send_to_others(
                player,
                ServerMessage::OpponentDisconnected {
                    room_id: self.room_id,
                    grace_ms: self.config.reconnect_grace.as_millis() as u64,
                },
            );
        }
    }

    fn handle_forfeit(&mut self, player: PlayerId) {
        match self.session.forfeit(player) {
            Ok(events) => self.dispatch(&events),
            Err(e) => {
                tracing::debug!(
                    room_id = %self.room_id,
                    %player,
                    error = %e,
                    "forfeit ignored"
                );
            }
        }
    }

    /// Replays the game so far to a reconnecting player so their client
    /// can rebuild its state: the start event, every resolved guess, and
    /// the final result if there is one.
    fn replay_to(&self, player: PlayerId) {
        let Some(first_turn) = self.session.first_turn_owner() else {
            return;
        };
        if matches!(
            self.session.phase(),
            Phase::WaitingForPlayers | Phase::SubmittingSecrets
        ) {
            return;
        }

        self.send_to(
            player,
            ServerMessage::GameStarted {
                room_id: self.room_id,
                turn_owner: first_turn,
            },
        );

        let records = self.session.history();
        for (i, record) in records.iter().enumerate() {
            let last = i + 1 == records.len();
            let next_turn =
                if last && self.session.phase() != Phase::InProgress {
                    None
                } else {
                    self.session.opponent_of(record.player)
                };
            self.send_to(
                player,
                ServerMessage::GuessResolved {
                    room_id: self.room_id,
                    player: record.player,
                    guess: record.guess.to_string(),
                    feedback: record.feedback,
                    next_turn,
                },
            );
        }

        if let (Some(outcome), Some(score)) =
            (self.session.outcome(), self.session.final_score())
        {
            self.send_to(
                player,
                ServerMessage::GameFinished {
                    room_id: self.room_id,
                    outcome,
                    score,
                },
            );
        }
    }

    /// Translates session events into wire broadcasts and notification
    /// intents.
    fn dispatch(&self, events: &[SessionEvent]) {
        for event in events {
            match event {
                SessionEvent::PlayerJoined { player } => {
                    self.send_to_others(
                        *player,
                        ServerMessage::OpponentJoined {
                            room_id: self.room_id,
                            player: *player,
                        },
                    );
                }
                // The oneshot reply already acknowledged the secret to
                // its submitter; the opponent learns nothing until the
                // game starts.
                SessionEvent::SecretAccepted { .. } => {}
                SessionEvent::Started { turn_owner } => {
                    self.broadcast(ServerMessage::GameStarted {
                        room_id: self.room_id,
                        turn_owner: *turn_owner,
                    });
                    self.notify.deliver(
                        *turn_owner,
                        Notification::YourTurn { game_id: self.room_id },
                    );
                    tracing::info!(
                        room_id = %self.room_id,
                        turn_owner = %turn_owner,
                        "game started"
                    );
                }
                SessionEvent::GuessResolved {
                    player,
                    guess,
                    feedback,
                    next_turn,
                } => {
                    self.broadcast(ServerMessage::GuessResolved {
                        room_id: self.room_id,
                        player: *player,
                        guess: guess.clone(),
                        feedback: *feedback,
                        next_turn: *next_turn,
                    });
                    if let Some(next) = next_turn {
                        self.notify.deliver(
                            *next,
                            Notification::YourTurn {
                                game_id: self.room_id,
                            },
                        );
                    }
                }
                SessionEvent::Finished { outcome, score } => {
                    self.broadcast(ServerMessage::GameFinished {
                        room_id: self.room_id,
                        outcome: *outcome,
                        score: *score,
                    });
                    self.notify_result(*outcome, *score);
                    tracing::info!(
                        room_id = %self.room_id,
                        outcome = ?outcome,
                        "game finished"
                    );
                }
                SessionEvent::Closed => {
                    tracing::info!(
                        room_id = %self.room_id,
                        "room closed, awaiting sweep"
                    );
                }
            }
        }
    }

    /// Emits terminal notification intents: a result for both players,
    /// plus an achievement for a first-guess victory.
    fn notify_result(&self, outcome: Outcome, score: u32) {
        for player in self.session.players() {
            let won = matches!(
                outcome,
                Outcome::Win { winner } | Outcome::Forfeit { winner, .. }
                    if winner == player
            );
            let opponent_name = self
                .session
                .opponent_of(player)
                .map(|p| p.to_string())
                .unwrap_or_default();
            self.notify.deliver(
                player,
                Notification::GameResult { won, opponent_name, score },
            );
        }

        if let Outcome::Win { winner } = outcome {
            let winner_guesses = self
                .session
                .history()
                .iter()
                .filter(|r| r.player == winner)
                .count();
            if winner_guesses == 1 {
                self.notify.deliver(
                    winner,
                    Notification::Achievement {
                        name: "First Strike".into(),
                        description:
                            "Decoded the opponent's secret on the very first guess"
                                .into(),
                    },
                );
            }
        }
    }

    /// Something impossible happened. Tell everyone, then the caller
    /// breaks the loop and the registry reaps the dead handle.
    fn teardown(&self) {
        tracing::error!(room_id = %self.room_id, "tearing down inconsistent room");
        self.broadcast(ServerMessage::Error {
            kind: ErrorKind::Internal,
            message: format!("room {} was torn down", self.room_id),
        });
    }

    fn broadcast(&self, msg: ServerMessage) {
        for sender in self.links.values() {
            let _ = sender.send(msg.clone());
        }
    }

    fn send_to(&self, player: PlayerId, msg: ServerMessage) {
        if let Some(sender) = self.links.get(&player) {
            let _ = sender.send(msg);
        }
    }

    fn send_to_others(&self, except: PlayerId, msg: ServerMessage) {
        for (player, sender) in &self.links {
            if *player != except {
                let _ = sender.send(msg.clone());
            }
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        let idle_for = self.last_activity.elapsed();
        let reclaimable = match self.session.phase() {
            Phase::Closed => true,
            _ => {
                (self.links.is_empty()
                    && idle_for > self.config.reconnect_grace)
                    || idle_for > self.config.idle_timeout
            }
        };
        RoomSnapshot {
            room_id: self.room_id,
            phase: self.session.phase(),
            players: self.session.players().collect(),
            connected: self.links.len(),
            idle_for,
            reclaimable,
        }
    }
}

/// Spawns a new room actor task and returns a handle to it.
///
/// `channel_size` bounds the command channel: a wedged room applies
/// backpressure to callers instead of buffering without limit.
pub(crate) fn spawn_room(
    room_id: RoomId,
    config: RoomConfig,
    notify: Arc<dyn NotificationSink>,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let session = GameSession::new(config.rules);
    let actor = RoomActor {
        room_id,
        config,
        session,
        links: HashMap::new(),
        notify,
        last_activity: Instant::now(),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle { room_id, sender: tx }
}
