//! Room configuration.

use std::time::Duration;

use codebreak_game::GameRules;

/// Configuration for one room instance.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Game rules (code format, round limit, feedback mode).
    pub rules: GameRules,

    /// How long a dropped player is waited for before their disconnect
    /// becomes a forfeit. Mirrors the connection layer's grace window.
    pub reconnect_grace: Duration,

    /// How long a room may sit with no activity before the registry
    /// reclaims it — the backstop for finished games nobody acknowledged
    /// and waiting rooms nobody joined.
    pub idle_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            rules: GameRules::default(),
            reconnect_grace: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}
