//! Notification intents and the delivery boundary.
//!
//! The core emits well-formed, typed notification payloads and stops
//! there: channels, templating, and persistence of notification records
//! belong to an external dispatcher. [`NotificationSink`] is the seam —
//! the server and room actors call [`deliver`](NotificationSink::deliver)
//! fire-and-forget, and whatever implementation was injected takes it
//! from there.
//!
//! [`TracingSink`] (the default) just logs intents; [`MemorySink`]
//! collects them for assertions in tests.

use std::sync::Mutex;

use codebreak_protocol::{PlayerId, RoomId};
use serde::{Deserialize, Serialize};

/// A notification the core wants delivered to a player.
///
/// Names are the `PlayerId` display form; resolving them to real display
/// names is the dispatcher's job (it owns the account store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// A private room was created; the payload is shareable with the
    /// intended opponent.
    GameInvite { inviter_name: String, room_id: RoomId },

    /// Matchmaking paired this player with an opponent.
    MatchFound { opponent_name: String, game_id: RoomId },

    /// It's this player's turn to guess.
    YourTurn { game_id: RoomId },

    /// Terminal result of a game.
    GameResult {
        won: bool,
        opponent_name: String,
        score: u32,
    },

    /// Something noteworthy happened, e.g. a first-guess victory.
    Achievement { name: String, description: String },
}

/// Where notification intents go. Implementations must not block: the
/// caller is a room actor or connection handler.
pub trait NotificationSink: Send + Sync + 'static {
    /// Hands an intent to the dispatcher. Fire-and-forget; delivery
    /// failures are the dispatcher's problem, not the game's.
    fn deliver(&self, recipient: PlayerId, notification: Notification);
}

/// Default sink: logs every intent through `tracing`. Useful until a
/// real dispatcher is wired up, and harmless in development.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, recipient: PlayerId, notification: Notification) {
        tracing::info!(%recipient, ?notification, "notification intent");
    }
}

/// Test sink: collects every intent for later assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(PlayerId, Notification)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in delivery order.
    pub fn delivered(&self) -> Vec<(PlayerId, Notification)> {
        self.delivered.lock().expect("sink poisoned").clone()
    }

    /// Intents delivered to one player, in delivery order.
    pub fn delivered_to(&self, player: PlayerId) -> Vec<Notification> {
        self.delivered
            .lock()
            .expect("sink poisoned")
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, n)| n.clone())
            .collect()
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, recipient: PlayerId, notification: Notification) {
        self.delivered
            .lock()
            .expect("sink poisoned")
            .push((recipient, notification));
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_delivery_order() {
        let sink = MemorySink::new();
        sink.deliver(
            PlayerId(1),
            Notification::YourTurn { game_id: RoomId(7) },
        );
        sink.deliver(
            PlayerId(2),
            Notification::GameResult {
                won: true,
                opponent_name: "P-1".into(),
                score: 3,
            },
        );

        let all = sink.delivered();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, PlayerId(1));
        assert_eq!(all[1].0, PlayerId(2));
    }

    #[test]
    fn test_memory_sink_filters_by_recipient() {
        let sink = MemorySink::new();
        sink.deliver(
            PlayerId(1),
            Notification::YourTurn { game_id: RoomId(1) },
        );
        sink.deliver(
            PlayerId(2),
            Notification::YourTurn { game_id: RoomId(1) },
        );
        sink.deliver(
            PlayerId(1),
            Notification::YourTurn { game_id: RoomId(2) },
        );

        assert_eq!(sink.delivered_to(PlayerId(1)).len(), 2);
        assert_eq!(sink.delivered_to(PlayerId(2)).len(), 1);
    }

    #[test]
    fn test_notification_serializes_with_type_tag() {
        let n = Notification::MatchFound {
            opponent_name: "P-9".into(),
            game_id: RoomId(9),
        };
        let json: serde_json::Value = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "MatchFound");
        assert_eq!(json["opponent_name"], "P-9");
    }
}
