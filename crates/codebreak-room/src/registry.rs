//! Room registry: creates, tracks, and routes players to room actors.

use std::collections::HashMap;
use std::sync::Arc;

use codebreak_notify::NotificationSink;
use codebreak_protocol::{PlayerId, RoomId};
use rand::Rng;

use crate::room::spawn_room;
use crate::{PlayerSender, RoomConfig, RoomError, RoomHandle, RoomSnapshot};

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Tracks every active room and which player is in which room.
///
/// Owned by the server behind a single mutex; the registry itself holds
/// no locks. Room identifiers are random, so they are collision-resistant
/// and not enumerable; the astronomically unlikely collision is retried.
pub struct RoomRegistry {
    /// Active rooms, keyed by room ID.
    rooms: HashMap<RoomId, RoomHandle>,

    /// Which room each player is in. A player is in at most ONE room at
    /// a time (key invariant).
    player_rooms: HashMap<PlayerId, RoomId>,

    /// Injected notification boundary, handed to every spawned room.
    notify: Arc<dyn NotificationSink>,
}

impl RoomRegistry {
    /// Creates an empty registry delivering notification intents to
    /// `notify`.
    pub fn new(notify: Arc<dyn NotificationSink>) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            notify,
        }
    }

    /// Creates a new room and returns its ID.
    pub fn create(&mut self, config: RoomConfig) -> RoomId {
        let room_id = self.fresh_room_id();
        let handle = spawn_room(
            room_id,
            config,
            Arc::clone(&self.notify),
            DEFAULT_CHANNEL_SIZE,
        );
        self.rooms.insert(room_id, handle);
        tracing::info!(%room_id, "room created");
        room_id
    }

    fn fresh_room_id(&self) -> RoomId {
        let mut rng = rand::rng();
        loop {
            let candidate = RoomId(rng.random());
            if !self.rooms.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Adds a player to a room, enforcing the one-room-at-a-time
    /// invariant. The seat check-and-set happens inside the room actor,
    /// so two racing joins for the last seat resolve to exactly one
    /// success.
    pub async fn join(
        &mut self,
        player: PlayerId,
        room_id: RoomId,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        if let Some(current) = self.player_rooms.get(&player) {
            return Err(RoomError::AlreadyInRoom(player, *current));
        }

        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        handle.join(player, sender).await?;
        self.player_rooms.insert(player, room_id);
        Ok(())
    }

    /// Rebinds a reconnecting player to the room they never left. The
    /// room replays the game so far to them and tells the opponent.
    pub async fn resume(
        &self,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<RoomId, RoomError> {
        let room_id = self
            .player_rooms
            .get(&player)
            .copied()
            .ok_or(RoomError::NoRoom(player))?;

        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        handle.resume(player, sender).await?;
        Ok(room_id)
    }

    /// Removes a player from their current room. Mid-game this is an
    /// immediate forfeit — no grace window for a deliberate exit.
    pub async fn leave(
        &mut self,
        player: PlayerId,
    ) -> Result<RoomId, RoomError> {
        let room_id = self
            .player_rooms
            .get(&player)
            .copied()
            .ok_or(RoomError::NoRoom(player))?;

        if let Some(handle) = self.rooms.get(&room_id) {
            handle.leave(player).await?;
        }

        self.player_rooms.remove(&player);
        Ok(room_id)
    }

    /// Routes a secret submission to the player's room.
    pub async fn submit_secret(
        &self,
        player: PlayerId,
        room_id: RoomId,
        secret: String,
    ) -> Result<(), RoomError> {
        self.addressed_handle(player, room_id)?
            .submit_secret(player, secret)
            .await
    }

    /// Routes a guess to the player's room.
    pub async fn submit_guess(
        &self,
        player: PlayerId,
        room_id: RoomId,
        guess: String,
    ) -> Result<(), RoomError> {
        self.addressed_handle(player, room_id)?
            .submit_guess(player, guess)
            .await
    }

    /// Routes a result acknowledgment to the player's room.
    pub async fn ack_result(
        &self,
        player: PlayerId,
        room_id: RoomId,
    ) -> Result<(), RoomError> {
        self.addressed_handle(player, room_id)?.ack_result(player).await
    }

    /// Tells the player's room their socket dropped. No-op when the
    /// player isn't in a room.
    pub async fn disconnected(&self, player: PlayerId) {
        if let Some(handle) = self.handle_of(player) {
            let _ = handle.disconnected(player).await;
        }
    }

    /// Forfeits the player's game after their grace window elapsed, and
    /// unbinds them. Their opponent stays bound until the room closes.
    pub async fn forfeit(&mut self, player: PlayerId) {
        if let Some(handle) = self.handle_of(player) {
            let _ = handle.forfeit(player).await;
        }
        self.player_rooms.remove(&player);
    }

    /// Returns a snapshot of a specific room.
    pub async fn snapshot(
        &self,
        room_id: RoomId,
    ) -> Result<RoomSnapshot, RoomError> {
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;
        handle.snapshot().await
    }

    /// Shuts down a room and unbinds everyone who was in it.
    pub async fn destroy(
        &mut self,
        room_id: RoomId,
    ) -> Result<(), RoomError> {
        let handle = self
            .rooms
            .remove(&room_id)
            .ok_or(RoomError::NotFound(room_id))?;

        let _ = handle.shutdown().await;
        self.player_rooms.retain(|_, rid| *rid != room_id);

        tracing::info!(%room_id, "room destroyed");
        Ok(())
    }

    /// Reclaims rooms that reported themselves reclaimable (closed,
    /// abandoned past the grace window, or idle past the timeout) and
    /// rooms whose actor is gone. Returns the removed ids.
    pub async fn sweep_idle(&mut self) -> Vec<RoomId> {
        let mut reclaim = Vec::new();
        for (room_id, handle) in &self.rooms {
            match handle.snapshot().await {
                Ok(snapshot) if snapshot.reclaimable => {
                    reclaim.push(*room_id);
                }
                Ok(_) => {}
                // Dead actor (torn down after an inconsistency).
                Err(_) => reclaim.push(*room_id),
            }
        }

        for room_id in &reclaim {
            if let Some(handle) = self.rooms.remove(room_id) {
                let _ = handle.shutdown().await;
            }
            self.player_rooms.retain(|_, rid| rid != room_id);
            tracing::info!(%room_id, "room reclaimed");
        }

        reclaim
    }

    /// The room a player is currently in, if any.
    pub fn room_of(&self, player: &PlayerId) -> Option<RoomId> {
        self.player_rooms.get(player).copied()
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Resolves an operation addressed to a specific room, verifying the
    /// player is actually bound to that room.
    fn addressed_handle(
        &self,
        player: PlayerId,
        room_id: RoomId,
    ) -> Result<&RoomHandle, RoomError> {
        let bound = self
            .player_rooms
            .get(&player)
            .copied()
            .ok_or(RoomError::NoRoom(player))?;
        if bound != room_id {
            return Err(RoomError::NotInRoom(player, room_id));
        }
        self.rooms.get(&room_id).ok_or(RoomError::NotFound(room_id))
    }

    fn handle_of(&self, player: PlayerId) -> Option<&RoomHandle> {
        let room_id = self.player_rooms.get(&player)?;
        self.rooms.get(room_id)
    }
}
