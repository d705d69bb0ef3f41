//! Matchmaking: a FIFO waiting pool that pairs two queued players.
//!
//! One lane per game mode, no skill matching. The queue itself is a
//! plain synchronous structure; the server owns it behind a mutex and
//! performs the actual room creation when `enqueue` hands back a pair.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use codebreak_protocol::{GameMode, PlayerId};

use crate::{PlayerSender, RoomError};

/// One waiting player. Transient — queue entries are never persisted.
pub struct QueueEntry {
    pub player: PlayerId,
    /// The player's outbound channel, carried along so the pairer can
    /// seat both players without another lookup.
    pub sender: PlayerSender,
    pub enqueued_at: Instant,
}

/// Result of an enqueue.
pub enum QueueOutcome {
    /// Waiting for an opponent of the same mode.
    Pending,
    /// Two players ready to be paired, in enqueue order (oldest first).
    Paired(QueueEntry, QueueEntry),
}

/// FIFO waiting pool, partitioned by game mode.
#[derive(Default)]
pub struct MatchmakingQueue {
    lanes: HashMap<GameMode, VecDeque<QueueEntry>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player to the lane for `mode`. As soon as the lane holds
    /// two entries the two oldest are popped and returned for pairing.
    ///
    /// # Errors
    /// [`RoomError::AlreadyQueued`] if the player is waiting in any lane.
    pub fn enqueue(
        &mut self,
        player: PlayerId,
        mode: GameMode,
        sender: PlayerSender,
    ) -> Result<QueueOutcome, RoomError> {
        if self.is_queued(player) {
            return Err(RoomError::AlreadyQueued(player));
        }

        let lane = self.lanes.entry(mode).or_default();
        lane.push_back(QueueEntry {
            player,
            sender,
            enqueued_at: Instant::now(),
        });
        tracing::debug!(%player, %mode, waiting = lane.len(), "player queued");

        if lane.len() >= 2 {
            let first = lane.pop_front().expect("lane has two entries");
            let second = lane.pop_front().expect("lane has two entries");
            tracing::info!(
                first = %first.player,
                second = %second.player,
                %mode,
                "matchmaking pair formed"
            );
            return Ok(QueueOutcome::Paired(first, second));
        }

        Ok(QueueOutcome::Pending)
    }

    /// Removes a player from whatever lane they wait in. Used both for
    /// an explicit cancel and for the silent dequeue when a waiting
    /// player disconnects. Returns whether they were queued.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        for lane in self.lanes.values_mut() {
            if let Some(pos) =
                lane.iter().position(|e| e.player == player)
            {
                lane.remove(pos);
                tracing::debug!(%player, "player dequeued");
                return true;
            }
        }
        false
    }

    /// Whether the player is waiting in any lane.
    pub fn is_queued(&self, player: PlayerId) -> bool {
        self.lanes
            .values()
            .any(|lane| lane.iter().any(|e| e.player == player))
    }

    /// Number of players waiting in the lane for `mode`.
    pub fn waiting(&self, mode: GameMode) -> usize {
        self.lanes.get(&mode).map_or(0, VecDeque::len)
    }
}

// =========================================================================
// Tests
// =========================================================================
