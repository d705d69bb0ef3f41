//! End-to-end tests: real WebSocket clients against a full server.

use std::time::Duration;

use codebreak::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Test authenticator and helpers
// =========================================================================

/// Accepts any numeric token as a PlayerId.
struct TestAuth;

impl Authenticator for TestAuth {
    async fn authenticate(
        &self,
        token: &str,
    ) -> Result<PlayerId, ConnectionError> {
        token
            .parse()
            .map(PlayerId)
            .map_err(|_| ConnectionError::AuthFailed("not a number".into()))
    }
}

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server from the given builder on a random port and returns
/// the address.
async fn start_with(builder: ServerBuilder) -> String {
    let server = builder
        .bind("127.0.0.1:0")
        .build(TestAuth)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn start_server() -> String {
    start_with(ServerBuilder::new()).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn encode(msg: &ClientMessage) -> Message {
    let envelope = Envelope { seq: 0, timestamp: 0, payload: msg.clone() };
    Message::Binary(serde_json::to_vec(&envelope).expect("encode").into())
}

async fn send(ws: &mut ClientWs, msg: ClientMessage) {
    ws.send(encode(&msg)).await.expect("send");
}

/// Receives the next server message, failing the test after 5 seconds.
async fn recv(ws: &mut ClientWs) -> ServerMessage {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a server message")
        .expect("stream ended")
        .expect("websocket error");
    let envelope: Envelope<ServerMessage> =
        serde_json::from_slice(&msg.into_data()).expect("decode");
    envelope.payload
}

/// Receives messages until one matches `pred`, skipping the rest.
async fn recv_until(
    ws: &mut ClientWs,
    pred: impl Fn(&ServerMessage) -> bool,
) -> ServerMessage {
    for _ in 0..16 {
        let msg = recv(ws).await;
        if pred(&msg) {
            return msg;
        }
    }
    panic!("expected message never arrived");
}

/// Sends a handshake and returns the assigned id and resume token.
async fn handshake(ws: &mut ClientWs, id: u64) -> (PlayerId, String) {
    send(
        ws,
        ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
            token: Some(id.to_string()),
        },
    )
    .await;
    match recv(ws).await {
        ServerMessage::HandshakeAck {
            player_id, reconnect_token, ..
        } => (player_id, reconnect_token),
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

/// Two connected players in one room: p1 created it, p2 joined, both
/// handshook as ids 1 and 2. Drains the join traffic.
async fn setup_room(addr: &str, mode: GameMode) -> (ClientWs, ClientWs, RoomId) {
    let mut p1 = connect(addr).await;
    let mut p2 = connect(addr).await;
    handshake(&mut p1, 1).await;
    handshake(&mut p2, 2).await;

    send(&mut p1, ClientMessage::CreateRoom { mode }).await;
    let room_id = match recv(&mut p1).await {
        ServerMessage::RoomCreated { room_id } => room_id,
        other => panic!("expected RoomCreated, got {other:?}"),
    };

    send(&mut p2, ClientMessage::JoinRoom { room_id }).await;
    assert!(matches!(recv(&mut p2).await, ServerMessage::RoomJoined { .. }));
    assert!(matches!(
        recv(&mut p1).await,
        ServerMessage::OpponentJoined { player, .. } if player == PlayerId(2)
    ));

    (p1, p2, room_id)
}

/// Room with both secrets in: p1 holds "12345", p2 holds "67890".
/// Drains acks and the GameStarted broadcast; p1 owns the first turn.
async fn setup_game(addr: &str, mode: GameMode) -> (ClientWs, ClientWs, RoomId) {
    let (mut p1, mut p2, room_id) = setup_room(addr, mode).await;

    send(
        &mut p1,
        ClientMessage::SubmitSecret { room_id, secret: "12345".into() },
    )
    .await;
    assert!(matches!(
        recv(&mut p1).await,
        ServerMessage::SecretAccepted { .. }
    ));

    send(
        &mut p2,
        ClientMessage::SubmitSecret { room_id, secret: "67890".into() },
    )
    .await;
    assert!(matches!(
        recv(&mut p2).await,
        ServerMessage::SecretAccepted { .. }
    ));

    for ws in [&mut p1, &mut p2] {
        assert!(matches!(
            recv(ws).await,
            ServerMessage::GameStarted { turn_owner, .. }
                if turn_owner == PlayerId(1)
        ));
    }

    (p1, p2, room_id)
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_success() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let (player_id, token) = handshake(&mut ws, 42).await;
    assert_eq!(player_id, PlayerId(42));
    assert_eq!(token.len(), 32);
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        ClientMessage::Handshake { version: 999, token: Some("1".into()) },
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::BadRequest);
            assert!(message.contains("version"));
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_auth_failure() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        ClientMessage::Handshake {
            version: PROTOCOL_VERSION,
            token: Some("not-a-number".into()),
        },
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::AuthFailed);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_message_must_be_handshake() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, ClientMessage::CancelQueue).await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::BadRequest);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test]
async fn test_join_unknown_room_fails() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, 1).await;

    send(&mut ws, ClientMessage::JoinRoom { room_id: RoomId(12345) }).await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::RoomNotFound);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_secret_rejected_then_accepted() {
    let addr = start_server().await;
    let (mut p1, _p2, room_id) =
        setup_room(&addr, GameMode::Standard).await;

    send(
        &mut p1,
        ClientMessage::SubmitSecret { room_id, secret: "12ab5".into() },
    )
    .await;
    match recv(&mut p1).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::InvalidSecretFormat);
        }
        other => panic!("expected Error, got {other:?}"),
    }

    send(
        &mut p1,
        ClientMessage::SubmitSecret { room_id, secret: "12345".into() },
    )
    .await;
    assert!(matches!(
        recv(&mut p1).await,
        ServerMessage::SecretAccepted { .. }
    ));

    // Resubmission is rejected now that one is locked in.
    send(
        &mut p1,
        ClientMessage::SubmitSecret { room_id, secret: "99999".into() },
    )
    .await;
    match recv(&mut p1).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::SecretAlreadySet);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

// =========================================================================
// Full games
// =========================================================================

#[tokio::test]
async fn test_full_game_standard_mode() {
    let addr = start_server().await;
    let (mut p1, mut p2, room_id) =
        setup_game(&addr, GameMode::Standard).await;

    // P1 probes; everyone sees the feedback and the turn flips.
    send(
        &mut p1,
        ClientMessage::SubmitGuess { room_id, guess: "11111".into() },
    )
    .await;
    for ws in [&mut p1, &mut p2] {
        match recv(ws).await {
            ServerMessage::GuessResolved {
                player,
                guess,
                feedback,
                next_turn,
                ..
            } => {
                assert_eq!(player, PlayerId(1));
                assert_eq!(guess, "11111");
                // "11111" against "67890": no digit present.
                assert_eq!(feedback.exact, 0);
                assert_eq!(feedback.total_correct, 0);
                assert_eq!(feedback.out_of_place, 5);
                assert_eq!(next_turn, Some(PlayerId(2)));
            }
            other => panic!("expected GuessResolved, got {other:?}"),
        }
    }

    // P2 decodes p1's secret outright.
    send(
        &mut p2,
        ClientMessage::SubmitGuess { room_id, guess: "12345".into() },
    )
    .await;
    for ws in [&mut p1, &mut p2] {
        match recv(ws).await {
            ServerMessage::GuessResolved { feedback, next_turn, .. } => {
                assert_eq!(feedback.exact, 5);
                assert_eq!(next_turn, None);
            }
            other => panic!("expected GuessResolved, got {other:?}"),
        }
        match recv(ws).await {
            ServerMessage::GameFinished { outcome, score, .. } => {
                assert_eq!(outcome, Outcome::Win { winner: PlayerId(2) });
                assert_eq!(score, 9);
            }
            other => panic!("expected GameFinished, got {other:?}"),
        }
    }

    // Both acknowledge; the room closes quietly.
    send(&mut p1, ClientMessage::AckResult { room_id }).await;
    send(&mut p2, ClientMessage::AckResult { room_id }).await;
}

#[tokio::test]
async fn test_hard_mode_redacts_positional_feedback() {
    let addr = start_server().await;
    let (mut p1, mut p2, room_id) =
        setup_game(&addr, GameMode::Hard).await;

    // All five digits present, none placed — hard mode reveals only the
    // total.
    send(
        &mut p1,
        ClientMessage::SubmitGuess { room_id, guess: "78906".into() },
    )
    .await;
    for ws in [&mut p1, &mut p2] {
        match recv(ws).await {
            ServerMessage::GuessResolved { feedback, .. } => {
                assert_eq!(feedback.total_correct, 5);
                assert_eq!(feedback.misplaced, 0);
                assert_eq!(feedback.out_of_place, 0);
            }
            other => panic!("expected GuessResolved, got {other:?}"),
        }
    }

    // Win detection still runs on the hidden exact count.
    send(
        &mut p2,
        ClientMessage::SubmitGuess { room_id, guess: "11111".into() },
    )
    .await;
    for ws in [&mut p1, &mut p2] {
        let _ = recv(ws).await;
    }
    send(
        &mut p1,
        ClientMessage::SubmitGuess { room_id, guess: "67890".into() },
    )
    .await;
    for ws in [&mut p1, &mut p2] {
        let _ = recv(ws).await; // GuessResolved
        match recv(ws).await {
            ServerMessage::GameFinished { outcome, .. } => {
                assert_eq!(outcome, Outcome::Win { winner: PlayerId(1) });
            }
            other => panic!("expected GameFinished, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_out_of_turn_guess_rejected() {
    let addr = start_server().await;
    let (_p1, mut p2, room_id) =
        setup_game(&addr, GameMode::Standard).await;

    send(
        &mut p2,
        ClientMessage::SubmitGuess { room_id, guess: "11111".into() },
    )
    .await;

    match recv(&mut p2).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::NotYourTurn);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_leave_room_forfeits_to_opponent() {
    let addr = start_server().await;
    let (mut p1, mut p2, room_id) =
        setup_game(&addr, GameMode::Standard).await;

    send(&mut p1, ClientMessage::LeaveRoom { room_id }).await;
    assert!(matches!(recv(&mut p1).await, ServerMessage::LeftRoom { .. }));

    match recv(&mut p2).await {
        ServerMessage::GameFinished { outcome, .. } => {
            assert_eq!(
                outcome,
                Outcome::Forfeit {
                    winner: PlayerId(2),
                    deserter: PlayerId(1),
                }
            );
        }
        other => panic!("expected GameFinished, got {other:?}"),
    }
}

// =========================================================================
// Matchmaking
// =========================================================================

#[tokio::test]
async fn test_matchmaking_pairs_two_players_in_order() {
    let addr = start_server().await;
    let mut p1 = connect(&addr).await;
    let mut p2 = connect(&addr).await;
    handshake(&mut p1, 1).await;
    handshake(&mut p2, 2).await;

    send(&mut p1, ClientMessage::Enqueue { mode: GameMode::Standard }).await;
    assert!(matches!(recv(&mut p1).await, ServerMessage::Queued));

    send(&mut p2, ClientMessage::Enqueue { mode: GameMode::Standard }).await;
    assert!(matches!(recv(&mut p2).await, ServerMessage::Queued));

    // Both land in the same room; the first-enqueued player was seated
    // first and hears about the second joining.
    let room1 = match recv(&mut p1).await {
        ServerMessage::RoomJoined { room_id } => room_id,
        other => panic!("expected RoomJoined, got {other:?}"),
    };
    assert!(matches!(
        recv(&mut p1).await,
        ServerMessage::OpponentJoined { player, .. }
            if player == PlayerId(2)
    ));
    let room2 = match recv(&mut p2).await {
        ServerMessage::RoomJoined { room_id } => room_id,
        other => panic!("expected RoomJoined, got {other:?}"),
    };
    assert_eq!(room1, room2);

    // The pair plays: first-enqueued player owns the first turn.
    send(
        &mut p1,
        ClientMessage::SubmitSecret { room_id: room1, secret: "11111".into() },
    )
    .await;
    assert!(matches!(
        recv(&mut p1).await,
        ServerMessage::SecretAccepted { .. }
    ));
    send(
        &mut p2,
        ClientMessage::SubmitSecret { room_id: room2, secret: "22222".into() },
    )
    .await;
    assert!(matches!(
        recv(&mut p2).await,
        ServerMessage::SecretAccepted { .. }
    ));
    for ws in [&mut p1, &mut p2] {
        assert!(matches!(
            recv(ws).await,
            ServerMessage::GameStarted { turn_owner, .. }
                if turn_owner == PlayerId(1)
        ));
    }
}

#[tokio::test]
async fn test_lone_queued_player_stays_pending() {
    let addr = start_server().await;
    let mut p1 = connect(&addr).await;
    handshake(&mut p1, 1).await;

    send(&mut p1, ClientMessage::Enqueue { mode: GameMode::Hard }).await;
    assert!(matches!(recv(&mut p1).await, ServerMessage::Queued));

    send(&mut p1, ClientMessage::CancelQueue).await;
    assert!(matches!(recv(&mut p1).await, ServerMessage::QueueCancelled));
}

// =========================================================================
// Disconnect, forfeit, resume
// =========================================================================

#[tokio::test]
async fn test_disconnect_without_resume_forfeits() {
    // Zero grace and a fast sweep: dropping the socket forfeits almost
    // immediately.
    let addr = start_with(
        ServerBuilder::new()
            .reconnect_grace(Duration::ZERO)
            .sweep_interval(Duration::from_millis(50)),
    )
    .await;
    let (p1, mut p2, _room_id) =
        setup_game(&addr, GameMode::Standard).await;

    drop(p1);

    let finished = recv_until(&mut p2, |m| {
        matches!(m, ServerMessage::GameFinished { .. })
    })
    .await;
    match finished {
        ServerMessage::GameFinished { outcome, .. } => {
            assert_eq!(
                outcome,
                Outcome::Forfeit {
                    winner: PlayerId(2),
                    deserter: PlayerId(1),
                }
            );
        }
        other => panic!("expected GameFinished, got {other:?}"),
    }
}

#[tokio::test]
async fn test_resume_within_grace_restores_game() {
    let addr = start_with(
        ServerBuilder::new()
            .reconnect_grace(Duration::from_secs(10))
            .sweep_interval(Duration::from_millis(50)),
    )
    .await;
    let mut p1 = connect(&addr).await;
    let mut p2 = connect(&addr).await;
    let (_, token1) = handshake(&mut p1, 1).await;
    handshake(&mut p2, 2).await;

    send(&mut p1, ClientMessage::CreateRoom { mode: GameMode::Standard })
        .await;
    let room_id = match recv(&mut p1).await {
        ServerMessage::RoomCreated { room_id } => room_id,
        other => panic!("expected RoomCreated, got {other:?}"),
    };
    send(&mut p2, ClientMessage::JoinRoom { room_id }).await;
    let _ = recv(&mut p2).await; // RoomJoined
    let _ = recv(&mut p1).await; // OpponentJoined

    send(
        &mut p1,
        ClientMessage::SubmitSecret { room_id, secret: "12345".into() },
    )
    .await;
    let _ = recv(&mut p1).await; // SecretAccepted
    send(
        &mut p2,
        ClientMessage::SubmitSecret { room_id, secret: "67890".into() },
    )
    .await;
    let _ = recv(&mut p2).await; // SecretAccepted
    let _ = recv(&mut p1).await; // GameStarted
    let _ = recv(&mut p2).await; // GameStarted

    send(
        &mut p1,
        ClientMessage::SubmitGuess { room_id, guess: "11111".into() },
    )
    .await;
    let _ = recv(&mut p1).await; // GuessResolved
    let _ = recv(&mut p2).await; // GuessResolved

    // P1's connection dies mid-game.
    drop(p1);
    assert!(matches!(
        recv_until(&mut p2, |m| matches!(
            m,
            ServerMessage::OpponentDisconnected { .. }
        ))
        .await,
        ServerMessage::OpponentDisconnected { grace_ms: 10_000, .. }
    ));

    // P1 comes back on a fresh socket with the resume token and gets
    // the game replayed: same start, same history, same turn owner.
    let mut p1b = connect(&addr).await;
    send(&mut p1b, ClientMessage::Resume { reconnect_token: token1 }).await;
    match recv(&mut p1b).await {
        ServerMessage::HandshakeAck { player_id, .. } => {
            assert_eq!(player_id, PlayerId(1));
        }
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
    assert!(matches!(
        recv(&mut p1b).await,
        ServerMessage::GameStarted { turn_owner, .. }
            if turn_owner == PlayerId(1)
    ));
    match recv(&mut p1b).await {
        ServerMessage::GuessResolved { player, guess, next_turn, .. } => {
            assert_eq!(player, PlayerId(1));
            assert_eq!(guess, "11111");
            assert_eq!(next_turn, Some(PlayerId(2)));
        }
        other => panic!("expected GuessResolved, got {other:?}"),
    }

    assert!(matches!(
        recv_until(&mut p2, |m| matches!(
            m,
            ServerMessage::OpponentReconnected { .. }
        ))
        .await,
        ServerMessage::OpponentReconnected { .. }
    ));

    // The game picks up where it stood: p2's turn.
    send(
        &mut p2,
        ClientMessage::SubmitGuess { room_id, guess: "12345".into() },
    )
    .await;
    for ws in [&mut p1b, &mut p2] {
        let _ = recv(ws).await; // GuessResolved (winning)
        match recv(ws).await {
            ServerMessage::GameFinished { outcome, .. } => {
                assert_eq!(outcome, Outcome::Win { winner: PlayerId(2) });
            }
            other => panic!("expected GameFinished, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_resume_with_bad_token_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        ClientMessage::Resume { reconnect_token: "bogus".into() },
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::Error { kind, .. } => {
            assert_eq!(kind, ErrorKind::AuthFailed);
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

// =========================================================================
// Heartbeat
// =========================================================================

#[tokio::test]
async fn test_heartbeat_echoes_client_time() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, 1).await;

    send(&mut ws, ClientMessage::Heartbeat { client_time: 777 }).await;

    match recv(&mut ws).await {
        ServerMessage::HeartbeatAck { client_time, .. } => {
            assert_eq!(client_time, 777);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}
