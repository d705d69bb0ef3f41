//! Link types: the server's record of one player's connection.

use std::time::{Duration, Instant};

use codebreak_protocol::PlayerId;

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Timing configuration for connection handling.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long a dropped player may take to resume before the link
    /// expires and any active game is forfeited. `Duration::ZERO`
    /// disables reconnection.
    pub reconnect_grace: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// LinkState
// ---------------------------------------------------------------------------

/// Where a player's link is in its lifecycle.
///
/// ```text
///   Connected ──(drop)──→ Disconnected ──(grace elapses)──→ Expired
///       ↑                      │
///       └───────(resume)───────┘
/// ```
///
/// `Instant` rather than wall-clock time: the grace window must be
/// immune to system clock adjustments.
#[derive(Debug, Clone)]
pub enum LinkState {
    /// Live connection bound to this player.
    Connected,

    /// Connection dropped at `since`; the player may resume until the
    /// grace window elapses.
    Disconnected { since: Instant },

    /// Grace window elapsed. The link is dead and will be swept; the
    /// player must authenticate afresh.
    Expired,
}

// ---------------------------------------------------------------------------
// PlayerLink
// ---------------------------------------------------------------------------

/// One player's connection record.
#[derive(Debug, Clone)]
pub struct PlayerLink {
    /// Whose link this is.
    pub player_id: PlayerId,

    /// Current lifecycle state.
    pub state: LinkState,

    /// Secret issued at handshake time. Presenting it on a fresh
    /// connection resumes this link instead of re-authenticating — a
    /// network blip shouldn't cost anyone a game in progress.
    /// 32 hex characters, 128 bits of randomness.
    pub resume_token: String,
}
