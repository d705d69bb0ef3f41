//! Per-connection handler: handshake, message routing, and the outbound
//! pump.
//!
//! Each accepted connection gets its own task running
//! [`handle_connection`], plus a writer task draining the player's
//! outbound channel to the socket. Room actors and this handler both
//! push into that channel, so broadcasts never touch a room's critical
//! path with network I/O.
//!
//! Flow:
//!   1. Receive `Handshake` (fresh session) or `Resume` (within grace)
//!   2. Authenticate / validate resume token → `PlayerId`
//!   3. Send `HandshakeAck` with the resume token
//!   4. Loop: decode envelopes → dispatch operations

use std::sync::Arc;
use std::time::Duration;

use codebreak_notify::Notification;
use codebreak_protocol::{
    ClientMessage, Codec, Envelope, ErrorKind, GameMode, PlayerId,
    ProtocolError, ServerMessage,
};
use codebreak_room::{PlayerSender, QueueEntry, QueueOutcome, RoomError};
use codebreak_session::Authenticator;
use codebreak_transport::{Connection, WebSocketConnection};

use crate::ServerError;
use crate::server::{PROTOCOL_VERSION, ServerState};

/// How long a fresh connection gets to produce its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle read timeout; heartbeats (~5 s apart) keep a healthy client well
/// under it.
const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Drop guard that runs disconnect bookkeeping when the handler exits,
/// however it exits. `Drop` is synchronous, so the async cleanup is
/// spawned fire-and-forget.
struct SessionGuard<A: Authenticator, C: Codec> {
    player_id: PlayerId,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for SessionGuard<A, C> {
    fn drop(&mut self) {
        let player_id = self.player_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let _ = state.connections.lock().await.disconnect(player_id);
            state.queue.lock().await.remove(player_id);
            state.rooms.lock().await.disconnected(player_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), ServerError>
where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // All outbound traffic — acks, errors, and room broadcasts alike —
    // funnels through this channel into one writer task, which owns the
    // sequence counter.
    let (outbound, outbound_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(pump_outbound(
        conn.clone(),
        Arc::clone(&state),
        outbound_rx,
    ));

    let (player_id, resumed) =
        perform_handshake(&conn, &state, &outbound).await?;

    tracing::info!(%conn_id, %player_id, "player connected");

    if resumed {
        let result = state
            .rooms
            .lock()
            .await
            .resume(player_id, outbound.clone())
            .await;
        match result {
            Ok(room_id) => {
                tracing::info!(%player_id, %room_id, "rebound to room");
            }
            // Resuming into the lobby (no room) is fine.
            Err(RoomError::NoRoom(_)) => {}
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "room rebind failed");
                send_room_error(&outbound, &e);
            }
        }
    }

    let _guard = SessionGuard {
        player_id,
        state: Arc::clone(&state),
    };

    loop {
        let data =
            match tokio::time::timeout(READ_TIMEOUT, conn.recv()).await {
                Ok(Ok(Some(data))) => data,
                Ok(Ok(None)) => {
                    tracing::info!(%player_id, "connection closed cleanly");
                    break;
                }
                Ok(Err(e)) => {
                    tracing::debug!(%player_id, error = %e, "recv error");
                    break;
                }
                Err(_) => {
                    tracing::info!(%player_id, "connection timed out");
                    break;
                }
            };

        let envelope: Envelope<ClientMessage> =
            match state.codec.decode(&data) {
                Ok(env) => env,
                Err(e) => {
                    tracing::debug!(
                        %player_id, error = %e, "failed to decode envelope"
                    );
                    send(
                        &outbound,
                        ServerMessage::Error {
                            kind: ErrorKind::BadRequest,
                            message: "malformed envelope".into(),
                        },
                    );
                    continue;
                }
            };

        let close =
            handle_message(&state, player_id, envelope.payload, &outbound)
                .await;
        if close {
            break;
        }
    }

    // _guard drops here → disconnect bookkeeping fires.
    Ok(())
}

/// Performs the opening exchange: a `Handshake` (authenticate, register,
/// issue a resume token) or a `Resume` (validate the token, restore the
/// link). Returns the player and whether this was a resume.
async fn perform_handshake<A, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<A, C>>,
    outbound: &PlayerSender,
) -> Result<(PlayerId, bool), ServerError>
where
    A: Authenticator,
    C: Codec,
{
    let data =
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(ProtocolError::InvalidMessage(
                    "connection closed before handshake".into(),
                )
                .into());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ProtocolError::InvalidMessage(
                    "handshake timed out".into(),
                )
                .into());
            }
        };

    let envelope: Envelope<ClientMessage> = state.codec.decode(&data)?;

    match envelope.payload {
        ClientMessage::Handshake { version, token } => {
            if version != PROTOCOL_VERSION {
                send(
                    outbound,
                    ServerMessage::Error {
                        kind: ErrorKind::BadRequest,
                        message: format!(
                            "version mismatch: expected {PROTOCOL_VERSION}, got {version}"
                        ),
                    },
                );
                return Err(ProtocolError::InvalidMessage(
                    "protocol version mismatch".into(),
                )
                .into());
            }

            let token_str = token.as_deref().unwrap_or("");
            let player_id = match state.auth.authenticate(token_str).await
            {
                Ok(pid) => pid,
                Err(e) => {
                    send(
                        outbound,
                        ServerMessage::Error {
                            kind: ErrorKind::AuthFailed,
                            message: "unauthorized".into(),
                        },
                    );
                    return Err(e.into());
                }
            };

            let resume_token = {
                let mut connections = state.connections.lock().await;
                match connections.register(player_id) {
                    Ok(link) => link.resume_token.clone(),
                    Err(e) => {
                        send(
                            outbound,
                            ServerMessage::Error {
                                kind: ErrorKind::BadRequest,
                                message: e.to_string(),
                            },
                        );
                        return Err(e.into());
                    }
                }
            };

            send(
                outbound,
                ServerMessage::HandshakeAck {
                    player_id,
                    reconnect_token: resume_token,
                    server_time: state.now_ms(),
                },
            );
            Ok((player_id, false))
        }

        ClientMessage::Resume { reconnect_token } => {
            let (player_id, resume_token) = {
                let mut connections = state.connections.lock().await;
                match connections.resume(&reconnect_token) {
                    Ok(link) => {
                        (link.player_id, link.resume_token.clone())
                    }
                    Err(e) => {
                        send(
                            outbound,
                            ServerMessage::Error {
                                kind: ErrorKind::AuthFailed,
                                message: e.to_string(),
                            },
                        );
                        return Err(e.into());
                    }
                }
            };

            send(
                outbound,
                ServerMessage::HandshakeAck {
                    player_id,
                    reconnect_token: resume_token,
                    server_time: state.now_ms(),
                },
            );
            Ok((player_id, true))
        }

        _ => {
            send(
                outbound,
                ServerMessage::Error {
                    kind: ErrorKind::BadRequest,
                    message: "expected Handshake or Resume".into(),
                },
            );
            Err(ProtocolError::InvalidMessage(
                "first message must be a handshake".into(),
            )
            .into())
        }
    }
}

/// Dispatches one client operation. Returns `true` when the connection
/// should close.
async fn handle_message<A, C>(
    state: &Arc<ServerState<A, C>>,
    player_id: PlayerId,
    msg: ClientMessage,
    outbound: &PlayerSender,
) -> bool
where
    A: Authenticator,
    C: Codec,
{
    match msg {
        ClientMessage::Heartbeat { client_time } => {
            send(
                outbound,
                ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: state.now_ms(),
                },
            );
        }

        ClientMessage::Handshake { .. } | ClientMessage::Resume { .. } => {
            send(
                outbound,
                ServerMessage::Error {
                    kind: ErrorKind::BadRequest,
                    message: "already connected".into(),
                },
            );
        }

        ClientMessage::CreateRoom { mode } => {
            // Creating a room supersedes any matchmaking wait.
            state.queue.lock().await.remove(player_id);

            let result = {
                let mut rooms = state.rooms.lock().await;
                if let Some(current) = rooms.room_of(&player_id) {
                    Err(RoomError::AlreadyInRoom(player_id, current))
                } else {
                    let room_id = rooms.create(state.room_config(mode));
                    rooms
                        .join(player_id, room_id, outbound.clone())
                        .await
                        .map(|_| room_id)
                }
            };

            match result {
                Ok(room_id) => {
                    send(outbound, ServerMessage::RoomCreated { room_id });
                    state.notify.deliver(
                        player_id,
                        Notification::GameInvite {
                            inviter_name: player_id.to_string(),
                            room_id,
                        },
                    );
                }
                Err(e) => send_room_error(outbound, &e),
            }
        }

        ClientMessage::JoinRoom { room_id } => {
            state.queue.lock().await.remove(player_id);

            let result = state
                .rooms
                .lock()
                .await
                .join(player_id, room_id, outbound.clone())
                .await;
            match result {
                Ok(()) => {
                    send(outbound, ServerMessage::RoomJoined { room_id });
                }
                Err(e) => send_room_error(outbound, &e),
            }
        }

        ClientMessage::Enqueue { mode } => {
            if let Some(current) =
                state.rooms.lock().await.room_of(&player_id)
            {
                send_room_error(
                    outbound,
                    &RoomError::AlreadyInRoom(player_id, current),
                );
                return false;
            }

            let outcome = state.queue.lock().await.enqueue(
                player_id,
                mode,
                outbound.clone(),
            );
            match outcome {
                Ok(QueueOutcome::Pending) => {
                    send(outbound, ServerMessage::Queued);
                }
                Ok(QueueOutcome::Paired(first, second)) => {
                    send(outbound, ServerMessage::Queued);
                    pair_players(state, mode, first, second).await;
                }
                Err(e) => send_room_error(outbound, &e),
            }
        }

        ClientMessage::CancelQueue => {
            state.queue.lock().await.remove(player_id);
            send(outbound, ServerMessage::QueueCancelled);
        }

        ClientMessage::SubmitSecret { room_id, secret } => {
            let result = state
                .rooms
                .lock()
                .await
                .submit_secret(player_id, room_id, secret)
                .await;
            match result {
                Ok(()) => {
                    send(
                        outbound,
                        ServerMessage::SecretAccepted { room_id },
                    );
                }
                Err(e) => send_room_error(outbound, &e),
            }
        }

        ClientMessage::SubmitGuess { room_id, guess } => {
            // Success is acknowledged by the GuessResolved broadcast the
            // room sends to both players.
            let result = state
                .rooms
                .lock()
                .await
                .submit_guess(player_id, room_id, guess)
                .await;
            if let Err(e) = result {
                send_room_error(outbound, &e);
            }
        }

        ClientMessage::AckResult { room_id } => {
            let result = state
                .rooms
                .lock()
                .await
                .ack_result(player_id, room_id)
                .await;
            if let Err(e) = result {
                send_room_error(outbound, &e);
            }
        }

        ClientMessage::LeaveRoom { room_id } => {
            let result = {
                let mut rooms = state.rooms.lock().await;
                match rooms.room_of(&player_id) {
                    Some(current) if current == room_id => {
                        rooms.leave(player_id).await.map(|_| ())
                    }
                    _ => Err(RoomError::NotInRoom(player_id, room_id)),
                }
            };
            match result {
                Ok(()) => {
                    send(outbound, ServerMessage::LeftRoom { room_id });
                }
                Err(e) => send_room_error(outbound, &e),
            }
        }

        ClientMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            return true;
        }
    }

    false
}

/// Seats a freshly paired couple in a new room, in enqueue order, and
/// emits the match-found intents.
async fn pair_players<A, C>(
    state: &Arc<ServerState<A, C>>,
    mode: GameMode,
    first: QueueEntry,
    second: QueueEntry,
) where
    A: Authenticator,
    C: Codec,
{
    let (first_player, second_player) = (first.player, second.player);

    let mut rooms = state.rooms.lock().await;
    let room_id = rooms.create(state.room_config(mode));

    for entry in [first, second] {
        match rooms.join(entry.player, room_id, entry.sender.clone()).await
        {
            Ok(()) => {
                let _ = entry
                    .sender
                    .send(ServerMessage::RoomJoined { room_id });
            }
            Err(e) => {
                // The partner keeps the room and waits for a new
                // opponent; the failed seat is told why.
                tracing::warn!(
                    player = %entry.player,
                    error = %e,
                    "failed to seat paired player"
                );
                send_room_error(&entry.sender, &e);
            }
        }
    }
    drop(rooms);

    state.notify.deliver(
        first_player,
        Notification::MatchFound {
            opponent_name: second_player.to_string(),
            game_id: room_id,
        },
    );
    state.notify.deliver(
        second_player,
        Notification::MatchFound {
            opponent_name: first_player.to_string(),
            game_id: room_id,
        },
    );
}

/// Forwards outbound messages to the socket, owning the envelope
/// sequence counter. Exits when the channel closes (handler done) or the
/// socket rejects a write.
async fn pump_outbound<A, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, C>>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<ServerMessage>,
) where
    A: Authenticator,
    C: Codec,
{
    let mut seq: u64 = 1;
    while let Some(msg) = rx.recv().await {
        let envelope = Envelope {
            seq,
            timestamp: state.now_ms(),
            payload: msg,
        };
        seq += 1;

        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode outbound message");
                continue;
            }
        };
        if conn.send(&bytes).await.is_err() {
            break;
        }
    }
}

fn send(outbound: &PlayerSender, msg: ServerMessage) {
    let _ = outbound.send(msg);
}

fn send_room_error(outbound: &PlayerSender, e: &RoomError) {
    send(
        outbound,
        ServerMessage::Error {
            kind: room_error_kind(e),
            message: e.to_string(),
        },
    );
}

/// Maps a room-layer rejection onto the wire error taxonomy.
fn room_error_kind(e: &RoomError) -> ErrorKind {
    use codebreak_game::GameError;

    match e {
        RoomError::NotFound(_) => ErrorKind::RoomNotFound,
        RoomError::RoomFull(_) => ErrorKind::RoomFull,
        RoomError::AlreadyInRoom(..) => ErrorKind::AlreadyInRoom,
        RoomError::NotInRoom(..) | RoomError::NoRoom(_) => {
            ErrorKind::NotInRoom
        }
        RoomError::AlreadyQueued(_) => ErrorKind::BadRequest,
        RoomError::Unavailable(_) | RoomError::Inconsistent { .. } => {
            ErrorKind::Internal
        }
        RoomError::Game(game) => match game {
            GameError::InvalidSecret(_) => ErrorKind::InvalidSecretFormat,
            GameError::SecretAlreadySet(_) => ErrorKind::SecretAlreadySet,
            GameError::InvalidGuess(_) => ErrorKind::InvalidGuess,
            GameError::NotYourTurn(_) => ErrorKind::NotYourTurn,
            GameError::NotInProgress(_) => ErrorKind::GameNotInProgress,
            GameError::NotAcceptingSecrets(_)
            | GameError::NotFinished(_) => ErrorKind::WrongPhase,
            GameError::UnknownPlayer(_) => ErrorKind::NotInRoom,
            GameError::AlreadySeated(_) => ErrorKind::AlreadyInRoom,
            GameError::SeatsFull => ErrorKind::RoomFull,
            GameError::CorruptState(_) => ErrorKind::Internal,
        },
    }
}
