//! Server builder, shared state, accept loop, and the maintenance sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use codebreak_game::GameRules;
use codebreak_notify::{NotificationSink, TracingSink};
use codebreak_protocol::{Codec, GameMode, JsonCodec};
use codebreak_room::{MatchmakingQueue, RoomConfig, RoomRegistry};
use codebreak_session::{
    Authenticator, ConnectionConfig, ConnectionManager,
};
use codebreak_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::ServerError;
use crate::handler::handle_connection;

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state, one `Arc` handed to every connection task.
///
/// The registry, matchmaking pool, and connection manager are the only
/// cross-connection mutable structures; each sits behind its own mutex
/// and is locked for the duration of one operation, never across
/// network I/O.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) connections: Mutex<ConnectionManager>,
    pub(crate) rooms: Mutex<RoomRegistry>,
    pub(crate) queue: Mutex<MatchmakingQueue>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) notify: Arc<dyn NotificationSink>,
    pub(crate) rules: GameRules,
    pub(crate) reconnect_grace: Duration,
    pub(crate) idle_timeout: Duration,
    /// Server epoch for wire timestamps.
    pub(crate) started: Instant,
}

impl<A: Authenticator, C: Codec> ServerState<A, C> {
    /// Milliseconds since the server started.
    pub(crate) fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Room configuration for a newly created room of the given mode.
    pub(crate) fn room_config(&self, mode: GameMode) -> RoomConfig {
        RoomConfig {
            rules: GameRules { mode, ..self.rules },
            reconnect_grace: self.reconnect_grace,
            idle_timeout: self.idle_timeout,
        }
    }
}

/// Builder for configuring and starting a Codebreak server.
pub struct ServerBuilder {
    bind_addr: String,
    rules: GameRules,
    reconnect_grace: Duration,
    idle_timeout: Duration,
    sweep_interval: Duration,
    notify: Arc<dyn NotificationSink>,
}

impl ServerBuilder {
    /// Creates a builder with default settings: localhost bind, 5-digit
    /// codes, 10 rounds, 30-second grace window.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            rules: GameRules::default(),
            reconnect_grace: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(1),
            notify: Arc::new(TracingSink),
        }
    }

    /// Sets the address to bind to. Port 0 picks a free one.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the default game rules for new rooms (the room's mode still
    /// comes from the create/enqueue request).
    pub fn rules(mut self, rules: GameRules) -> Self {
        self.rules = rules;
        self
    }

    /// Sets how long a dropped player may take to resume.
    pub fn reconnect_grace(mut self, grace: Duration) -> Self {
        self.reconnect_grace = grace;
        self
    }

    /// Sets the idle backstop after which abandoned rooms are reclaimed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets how often the maintenance sweep runs (grace expiry, room
    /// reclamation).
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Installs a notification sink. Defaults to [`TracingSink`].
    pub fn notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notify = sink;
        self
    }

    /// Binds the transport and assembles the server with the given
    /// authenticator. Uses `JsonCodec` and the WebSocket transport.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<CodebreakServer<A, JsonCodec>, ServerError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            connections: Mutex::new(ConnectionManager::new(
                ConnectionConfig {
                    reconnect_grace: self.reconnect_grace,
                },
            )),
            rooms: Mutex::new(RoomRegistry::new(Arc::clone(&self.notify))),
            queue: Mutex::new(MatchmakingQueue::new()),
            auth,
            codec: JsonCodec,
            notify: self.notify,
            rules: self.rules,
            reconnect_grace: self.reconnect_grace,
            idle_timeout: self.idle_timeout,
            started: Instant::now(),
        });

        Ok(CodebreakServer {
            transport,
            state,
            sweep_interval: self.sweep_interval,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Codebreak server. Call [`run`](Self::run) to start
/// accepting connections.
pub struct CodebreakServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
    sweep_interval: Duration,
}

impl<A, C> CodebreakServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the maintenance sweep and the accept loop until the process
    /// is terminated.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!("Codebreak server running");

        let sweep_state = Arc::clone(&self.state);
        let sweep_interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                maintenance_sweep(&sweep_state).await;
            }
        });

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// One maintenance pass: expire links whose grace window elapsed, turn
/// those expirations into queue removals and room forfeits, then reclaim
/// dead rooms. Locks are taken one at a time, never nested.
async fn maintenance_sweep<A: Authenticator, C: Codec>(
    state: &Arc<ServerState<A, C>>,
) {
    let expired = state.connections.lock().await.expire_stale();

    for player in &expired {
        state.queue.lock().await.remove(*player);
        state.rooms.lock().await.forfeit(*player).await;
    }

    state.connections.lock().await.cleanup_expired();

    let reclaimed = state.rooms.lock().await.sweep_idle().await;
    if !(expired.is_empty() && reclaimed.is_empty()) {
        tracing::debug!(
            expired = expired.len(),
            reclaimed = reclaimed.len(),
            "maintenance sweep"
        );
    }
}
