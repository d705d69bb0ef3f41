//! The connection manager: every player link the server knows about.
//!
//! Responsibilities:
//! - create links when players authenticate
//! - flip links to Disconnected when sockets drop, starting the grace
//!   window
//! - validate resume tokens and restore links within the window
//! - expire links whose window elapsed, and sweep the dead ones
//!
//! Expiring and sweeping are separate steps on purpose: the server
//! reacts to the expirations first (forfeit the player's room, drop
//! them from the matchmaking pool) and only then deletes the records.

use std::collections::HashMap;
use std::time::Instant;

use codebreak_protocol::PlayerId;
use rand::Rng;

use crate::{ConnectionConfig, ConnectionError, LinkState, PlayerLink};

/// Tracks every connected (or recently dropped) player.
pub struct ConnectionManager {
    /// One link per player.
    links: HashMap<PlayerId, PlayerLink>,

    /// Resume token → player index, kept in sync with `links` so a
    /// resuming client is resolved without scanning.
    tokens: HashMap<String, PlayerId>,

    config: ConnectionConfig,
}

impl ConnectionManager {
    /// Creates an empty manager with the given timing config.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            links: HashMap::new(),
            tokens: HashMap::new(),
            config,
        }
    }

    /// Registers a freshly authenticated player and issues their resume
    /// token.
    ///
    /// # Errors
    /// [`ConnectionError::AlreadyConnected`] if the player already holds
    /// a live link. A leftover Disconnected/Expired link is replaced
    /// (its old token is revoked).
    pub fn register(
        &mut self,
        player_id: PlayerId,
    ) -> Result<&PlayerLink, ConnectionError> {
        if let Some(existing) = self.links.get(&player_id) {
            if matches!(existing.state, LinkState::Connected) {
                return Err(ConnectionError::AlreadyConnected(player_id));
            }
            self.tokens.remove(&existing.resume_token);
        }

        let token = generate_token();
        self.tokens.insert(token.clone(), player_id);
        self.links.insert(
            player_id,
            PlayerLink {
                player_id,
                state: LinkState::Connected,
                resume_token: token,
            },
        );

        tracing::info!(%player_id, "player connected");
        Ok(&self.links[&player_id])
    }

    /// Marks a player's link as dropped, starting the grace window.
    /// The link (and its token) survives until the window elapses.
    pub fn disconnect(
        &mut self,
        player_id: PlayerId,
    ) -> Result<(), ConnectionError> {
        let link = self
            .links
            .get_mut(&player_id)
            .ok_or(ConnectionError::UnknownPlayer(player_id))?;

        link.state = LinkState::Disconnected { since: Instant::now() };
        tracing::info!(%player_id, "player dropped, grace window started");
        Ok(())
    }

    /// Restores a dropped link from its resume token.
    ///
    /// # Errors
    /// - [`ConnectionError::InvalidToken`] — token not recognized
    /// - [`ConnectionError::GraceExpired`] — window elapsed
    /// - [`ConnectionError::AlreadyConnected`] — the link never dropped
    pub fn resume(
        &mut self,
        token: &str,
    ) -> Result<&PlayerLink, ConnectionError> {
        let player_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or(ConnectionError::InvalidToken)?;

        let link = self
            .links
            .get_mut(&player_id)
            .ok_or(ConnectionError::InvalidToken)?;

        match link.state {
            LinkState::Disconnected { since } => {
                if since.elapsed() > self.config.reconnect_grace {
                    link.state = LinkState::Expired;
                    return Err(ConnectionError::GraceExpired(player_id));
                }
                link.state = LinkState::Connected;
                tracing::info!(%player_id, "player resumed within grace window");
                Ok(&self.links[&player_id])
            }
            LinkState::Connected => {
                Err(ConnectionError::AlreadyConnected(player_id))
            }
            LinkState::Expired => {
                Err(ConnectionError::GraceExpired(player_id))
            }
        }
    }

    /// Expires every dropped link whose grace window elapsed and returns
    /// the affected players — the server forfeits their rooms.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace = self.config.reconnect_grace;
        let mut expired = Vec::new();

        for link in self.links.values_mut() {
            if let LinkState::Disconnected { since } = link.state {
                if since.elapsed() > grace {
                    link.state = LinkState::Expired;
                    expired.push(link.player_id);
                    tracing::info!(
                        player_id = %link.player_id,
                        "link expired, grace window elapsed"
                    );
                }
            }
        }

        expired
    }

    /// Deletes expired links and revokes their tokens. Call after the
    /// expirations from [`expire_stale`](Self::expire_stale) have been
    /// acted on.
    pub fn cleanup_expired(&mut self) {
        self.links.retain(|_, link| {
            if matches!(link.state, LinkState::Expired) {
                self.tokens.remove(&link.resume_token);
                false
            } else {
                true
            }
        });
    }

    /// Looks up a player's link.
    pub fn get(&self, player_id: &PlayerId) -> Option<&PlayerLink> {
        self.links.get(player_id)
    }

    /// Number of tracked links, in any state.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Random 32-character hex string: 128 bits, unguessable in practice.
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Grace-window behavior is time-dependent; rather than sleeping,
    //! tests pick a window of zero (everything expires instantly) or an
    //! hour (nothing expires during the test).

    use std::time::Duration;

    use super::*;

    fn instant_expiry() -> ConnectionManager {
        ConnectionManager::new(ConnectionConfig {
            reconnect_grace: Duration::ZERO,
        })
    }

    fn long_grace() -> ConnectionManager {
        ConnectionManager::new(ConnectionConfig {
            reconnect_grace: Duration::from_secs(3600),
        })
    }

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    // =====================================================================
    // register()
    // =====================================================================

    #[test]
    fn test_register_new_player_returns_connected_link() {
        let mut mgr = long_grace();

        let link = mgr.register(pid(1)).expect("should succeed");

        assert!(matches!(link.state, LinkState::Connected));
        assert_eq!(link.player_id, pid(1));
        assert_eq!(link.resume_token.len(), 32);
    }

    #[test]
    fn test_register_each_player_gets_unique_token() {
        let mut mgr = long_grace();

        let token1 = mgr.register(pid(1)).unwrap().resume_token.clone();
        let token2 = mgr.register(pid(2)).unwrap().resume_token.clone();

        assert_ne!(token1, token2, "tokens must be unique per player");
    }

    #[test]
    fn test_register_already_connected_rejected() {
        let mut mgr = long_grace();
        mgr.register(pid(1)).unwrap();

        let result = mgr.register(pid(1));

        assert!(matches!(
            result,
            Err(ConnectionError::AlreadyConnected(p)) if p == pid(1)
        ));
    }

    #[test]
    fn test_register_replaces_dropped_link_and_revokes_old_token() {
        let mut mgr = long_grace();
        let old_token = mgr.register(pid(1)).unwrap().resume_token.clone();
        mgr.disconnect(pid(1)).unwrap();

        let link = mgr.register(pid(1)).expect("fresh auth replaces link");
        assert!(matches!(link.state, LinkState::Connected));

        assert!(matches!(
            mgr.resume(&old_token),
            Err(ConnectionError::InvalidToken)
        ));
    }

    // =====================================================================
    // disconnect() / resume()
    // =====================================================================

    #[test]
    fn test_disconnect_unknown_player_rejected() {
        let mut mgr = long_grace();
        let result = mgr.disconnect(pid(99));
        assert!(matches!(
            result,
            Err(ConnectionError::UnknownPlayer(p)) if p == pid(99)
        ));
    }

    #[test]
    fn test_disconnect_preserves_resume_token() {
        let mut mgr = long_grace();
        let token = mgr.register(pid(1)).unwrap().resume_token.clone();

        mgr.disconnect(pid(1)).unwrap();

        assert_eq!(mgr.get(&pid(1)).unwrap().resume_token, token);
    }

    #[test]
    fn test_resume_within_grace_restores_link() {
        let mut mgr = long_grace();
        let token = mgr.register(pid(1)).unwrap().resume_token.clone();
        mgr.disconnect(pid(1)).unwrap();

        let link = mgr.resume(&token).expect("should resume");

        assert!(matches!(link.state, LinkState::Connected));
        assert_eq!(link.player_id, pid(1));
    }

    #[test]
    fn test_resume_unknown_token_rejected() {
        let mut mgr = long_grace();
        mgr.register(pid(1)).unwrap();
        mgr.disconnect(pid(1)).unwrap();

        assert!(matches!(
            mgr.resume("not-a-real-token"),
            Err(ConnectionError::InvalidToken)
        ));
    }

    #[test]
    fn test_resume_after_grace_rejected() {
        let mut mgr = instant_expiry();
        let token = mgr.register(pid(1)).unwrap().resume_token.clone();
        mgr.disconnect(pid(1)).unwrap();

        assert!(matches!(
            mgr.resume(&token),
            Err(ConnectionError::GraceExpired(p)) if p == pid(1)
        ));
    }

    #[test]
    fn test_resume_while_connected_rejected() {
        let mut mgr = long_grace();
        let token = mgr.register(pid(1)).unwrap().resume_token.clone();

        assert!(matches!(
            mgr.resume(&token),
            Err(ConnectionError::AlreadyConnected(p)) if p == pid(1)
        ));
    }

    // =====================================================================
    // expire_stale() / cleanup_expired()
    // =====================================================================

    #[test]
    fn test_expire_stale_only_touches_dropped_links() {
        let mut mgr = instant_expiry();
        mgr.register(pid(1)).unwrap();
        mgr.register(pid(2)).unwrap();
        mgr.disconnect(pid(1)).unwrap();

        let expired = mgr.expire_stale();

        assert_eq!(expired, vec![pid(1)]);
        assert!(matches!(
            mgr.get(&pid(2)).unwrap().state,
            LinkState::Connected
        ));
    }

    #[test]
    fn test_expire_stale_respects_grace_window() {
        let mut mgr = long_grace();
        mgr.register(pid(1)).unwrap();
        mgr.disconnect(pid(1)).unwrap();

        assert!(mgr.expire_stale().is_empty());
    }

    #[test]
    fn test_cleanup_expired_removes_links_and_tokens() {
        let mut mgr = instant_expiry();
        let token = mgr.register(pid(1)).unwrap().resume_token.clone();
        mgr.register(pid(2)).unwrap();
        mgr.disconnect(pid(1)).unwrap();
        mgr.expire_stale();

        mgr.cleanup_expired();

        assert_eq!(mgr.len(), 1);
        assert!(mgr.get(&pid(1)).is_none());
        assert!(mgr.get(&pid(2)).is_some());
        assert!(matches!(
            mgr.resume(&token),
            Err(ConnectionError::InvalidToken)
        ));
    }

    // =====================================================================
    // Full lifecycle
    // =====================================================================

    #[test]
    fn test_full_lifecycle_drop_and_resume() {
        let mut mgr = long_grace();

        let token = mgr.register(pid(1)).unwrap().resume_token.clone();
        mgr.disconnect(pid(1)).unwrap();
        assert!(matches!(
            mgr.get(&pid(1)).unwrap().state,
            LinkState::Disconnected { .. }
        ));

        mgr.resume(&token).unwrap();
        assert!(matches!(
            mgr.get(&pid(1)).unwrap().state,
            LinkState::Connected
        ));
    }

    #[test]
    fn test_full_lifecycle_drop_expire_sweep() {
        let mut mgr = instant_expiry();

        mgr.register(pid(1)).unwrap();
        mgr.disconnect(pid(1)).unwrap();
        assert_eq!(mgr.expire_stale(), vec![pid(1)]);
        mgr.cleanup_expired();
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_lifecycles_are_independent_between_players() {
        let mut mgr = long_grace();

        let token1 = mgr.register(pid(1)).unwrap().resume_token.clone();
        mgr.register(pid(2)).unwrap();

        mgr.disconnect(pid(1)).unwrap();
        mgr.resume(&token1).unwrap();

        assert!(matches!(
            mgr.get(&pid(2)).unwrap().state,
            LinkState::Connected
        ));
    }
}
