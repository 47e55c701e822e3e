//! End-to-end client flows against an in-process server.
//!
//! Every test drives a real [`SocketPush`] through the Engine.IO/Socket.IO
//! framing; the server side is scripted with [`MemoryPeer`].

use serde_json::{json, Value};
use socketpush_client::protocol::{DeliveryStatus, Frequency, Schedule, SocketPacket};
use socketpush_client::{
    ChannelKey, ClientConfig, ClientError, ConnectionState, ErrorKind, Identity, MemoryConnector,
    MemoryPeer, OutgoingMessage, SocketPush,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

// ============================================================================
// Helpers
// ============================================================================

fn config() -> ClientConfig {
    ClientConfig::new("http://localhost:8000", "app1")
}

fn client_with(config: ClientConfig) -> (SocketPush, mpsc::UnboundedReceiver<MemoryPeer>) {
    let (connector, peers) = MemoryConnector::new();
    let client = SocketPush::with_connector(config, Arc::new(connector)).unwrap();
    (client, peers)
}

/// Accept the next connection and acknowledge its registration with `ack`.
fn serve_register(
    mut peers: mpsc::UnboundedReceiver<MemoryPeer>,
    ack: Value,
) -> tokio::task::JoinHandle<(MemoryPeer, Value)> {
    tokio::spawn(async move {
        let mut peer = peers.recv().await.unwrap();
        assert!(peer.accept().await);
        let (id, channel, payload) = peer.expect_event().await.unwrap();
        assert_eq!(channel, "register");
        peer.ack(id.unwrap(), ack);
        (peer, payload)
    })
}

async fn connected(identity: Identity) -> (SocketPush, MemoryPeer) {
    let (client, peers) = client_with(config());
    let server = serve_register(peers, json!({"success": true}));
    client.connect(identity).await.unwrap();
    let (peer, _) = server.await.unwrap();
    (client, peer)
}

/// Answer the next client request with `ack`, returning its channel and payload.
async fn answer(peer: &mut MemoryPeer, ack: Value) -> (String, Value) {
    let (id, channel, payload) = peer.expect_event().await.unwrap();
    peer.ack(id.expect("request should ask for an ack"), ack);
    (channel, payload)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn test_connect_registers_identity() {
    let (client, peers) = client_with(config());
    let server = serve_register(peers, json!({"success": true}));

    let response = timeout(
        Duration::from_millis(200),
        client.connect(Identity::new("alice").with_token("tok")),
    )
    .await
    .expect("connect should finish quickly")
    .unwrap();

    assert!(response.success);
    assert_eq!(client.state(), ConnectionState::Connected);

    let (peer, payload) = server.await.unwrap();
    assert_eq!(
        payload,
        json!({"app_uuid": "app1", "alias": "alice", "token": "tok"})
    );
    assert_eq!(
        peer.url(),
        "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
    );
}

#[tokio::test]
async fn test_connect_times_out_without_ack() {
    let (client, mut peers) =
        client_with(config().with_ack_timeout(Duration::from_millis(50)));
    let server = tokio::spawn(async move {
        let mut peer = peers.recv().await.unwrap();
        assert!(peer.accept().await);
        let (_, channel, _) = peer.expect_event().await.unwrap();
        assert_eq!(channel, "register");
        // Client gives up and says goodbye.
        peer.recv_packet().await
    });

    let err = client.connect(Identity::new("alice")).await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout { ref channel, .. } if channel == "register"));
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(client.state(), ConnectionState::Error(_)));
    assert!(client.last_error().is_some());

    assert!(matches!(
        server.await.unwrap(),
        Some(SocketPacket::Disconnect { .. }) | None
    ));
}

#[tokio::test]
async fn test_connect_refused_ends_in_error() {
    let client =
        SocketPush::with_connector(config(), Arc::new(MemoryConnector::refusing("ECONNREFUSED")))
            .unwrap();

    let err = client.connect(Identity::new("alice")).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(ref reason) if reason == "ECONNREFUSED"));
    assert_eq!(
        client.state(),
        ConnectionState::Error("transport error: ECONNREFUSED".into())
    );
}

#[tokio::test]
async fn test_connect_times_out_when_handshake_stalls() {
    let (client, mut peers) =
        client_with(config().with_connect_timeout(Duration::from_millis(50)));
    let server = tokio::spawn(async move {
        // Never answer the handshake.
        let mut peer = peers.recv().await.unwrap();
        peer.recv_frame().await
    });

    let err = client.connect(Identity::new("alice")).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectTimeout { timeout_ms: 50 }));
    assert!(matches!(client.state(), ConnectionState::Error(_)));

    // The abandoned attempt is torn down.
    assert!(timeout(Duration::from_secs(1), server).await.is_ok());
}

#[tokio::test]
async fn test_registration_rejected() {
    let (client, peers) = client_with(config());
    let _server = serve_register(peers, json!({"success": false, "message": "alias taken"}));

    let err = client.connect(Identity::new("alice")).await.unwrap_err();
    assert!(
        matches!(err, ClientError::ServerRejected { ref message, .. } if message == "alias taken")
    );
    assert_eq!(
        client.state(),
        ConnectionState::Error("server rejected 'register': alias taken".into())
    );
}

#[tokio::test]
async fn test_connect_rejected_while_connected() {
    let (client, _peer) = connected(Identity::new("alice")).await;

    let err = client.connect(Identity::new("alice")).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidState { .. }));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_reconnect_after_error() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = SocketPush::with_connector(
        config().with_ack_timeout(Duration::from_millis(50)),
        Arc::new(connector),
    )
    .unwrap();

    let (first_tx, first_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(async move {
        // First attempt: registration is never acknowledged.
        let mut first = peers.recv().await.unwrap();
        assert!(first.accept().await);
        first.expect_event().await.unwrap();
        let _ = first_rx.await;

        let mut second = peers.recv().await.unwrap();
        assert!(second.accept().await);
        let (id, _, _) = second.expect_event().await.unwrap();
        second.ack(id.unwrap(), json!({"success": true}));
        (first, second)
    });

    assert!(client.connect(Identity::new("alice")).await.is_err());
    assert!(matches!(client.state(), ConnectionState::Error(_)));
    first_tx.send(()).unwrap();

    client.connect(Identity::new("alice")).await.unwrap();
    assert!(client.is_connected());
    let _peers = server.await.unwrap();
}

#[tokio::test]
async fn test_server_close_moves_to_disconnected() {
    let (client, peer) = connected(Identity::new("alice")).await;
    let mut state = client.subscribe_state();

    peer.close();
    timeout(
        Duration::from_secs(1),
        state.wait_for(|state| *state == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();

    let err = client.join("lobby").await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected { .. }));
}

#[tokio::test]
async fn test_disconnect_cancels_pending_requests() {
    let (client, mut peer) = connected(Identity::new("alice")).await;
    let client = Arc::new(client);

    let pending = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.join("lobby").await })
    };
    let (_, channel, _) = peer.expect_event().await.unwrap();
    assert_eq!(channel, "join");

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
}

#[tokio::test]
async fn test_disconnect_during_connect_then_reconnect() {
    let (client, mut peers) = client_with(config());
    let client = Arc::new(client);

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.connect(Identity::new("alice")).await })
    };

    // First connection: registration arrives but is never answered.
    let mut stalled = peers.recv().await.unwrap();
    assert!(stalled.accept().await);
    let (_, channel, _) = stalled.expect_event().await.unwrap();
    assert_eq!(channel, "register");
    assert_eq!(client.state(), ConnectionState::Connecting);

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let server = serve_register(peers, json!({"success": true}));
    let response = timeout(
        Duration::from_secs(1),
        client.connect(Identity::new("alice")),
    )
    .await
    .expect("second connect should not wait on the first")
    .unwrap();
    assert!(response.success);

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));

    // The abandoned attempt must leave the new connection alone.
    settle().await;
    assert_eq!(client.state(), ConnectionState::Connected);
    let (mut peer, _) = server.await.unwrap();
    let join = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.join("lobby").await })
    };
    let (channel, _) = answer(&mut peer, json!({"success": true})).await;
    assert_eq!(channel, "join");
    assert!(join.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_dropping_client_releases_connection_and_callbacks() {
    let (client, mut peer) = connected(Identity::new("alice")).await;
    let (tx, mut seen) = mpsc::unbounded_channel::<String>();
    client.on_status(move |update| {
        let _ = tx.send(update.user);
    });

    drop(client);

    assert!(matches!(
        peer.recv_packet().await,
        Some(SocketPacket::Disconnect { .. }) | None
    ));
    peer.emit("status", json!({"isOnline": true, "user": "bob"}));

    // The callback was released, not merely silenced.
    let next = timeout(Duration::from_secs(1), seen.recv())
        .await
        .expect("callback should be dropped with the client");
    assert_eq!(next, None);
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_commands_rejected_while_disconnected() {
    let (client, mut peers) = client_with(config());

    assert!(matches!(
        client.join("lobby").await,
        Err(ClientError::NotConnected { .. })
    ));
    assert!(matches!(
        client.message(OutgoingMessage::new("hi").in_room("r1")).await,
        Err(ClientError::NotConnected { .. })
    ));
    assert!(matches!(
        client.trigger_room("ping", "r1", json!({})).await,
        Err(ClientError::NotConnected { .. })
    ));
    assert!(client.get_online_users().is_err());

    // Nothing was even dialled.
    assert!(peers.try_recv().is_err());
}

#[tokio::test]
async fn test_join_and_leave_payloads() {
    let (client, mut peer) = connected(Identity::new("alice")).await;

    let (joined, (channel, payload)) =
        tokio::join!(client.join("lobby"), answer(&mut peer, json!({"success": true})));
    assert!(joined.unwrap().success);
    assert_eq!(channel, "join");
    assert_eq!(payload, json!({"room": "lobby", "app_uuid": "app1"}));

    let (left, (channel, payload)) =
        tokio::join!(client.leave("lobby"), answer(&mut peer, json!({})));
    assert!(left.is_ok());
    assert_eq!(channel, "leave");
    assert_eq!(payload, json!({"room": "lobby", "app_uuid": "app1"}));
}

#[tokio::test]
async fn test_identity_app_scope_overrides_config() {
    let (client, mut peer) = connected(Identity::new("alice").with_app("app2")).await;
    assert_eq!(client.app_uuid(), "app2");

    let (_, (_, payload)) =
        tokio::join!(client.join("lobby"), answer(&mut peer, json!({"success": true})));
    assert_eq!(payload["app_uuid"], "app2");
}

#[tokio::test]
async fn test_trigger_payloads() {
    let (client, mut peer) = connected(Identity::new("alice")).await;

    let (result, (channel, payload)) = tokio::join!(
        client.trigger("orderShipped", "bob", json!({"order": 7})),
        answer(&mut peer, json!({"success": true}))
    );
    result.unwrap();
    assert_eq!(channel, "event");
    assert_eq!(
        payload,
        json!({"event": "orderShipped", "alias": "bob", "payload": {"order": 7}, "app_uuid": "app1"})
    );

    let schedule = Schedule::at("2030-01-01T09:00:00Z")
        .every("1d".parse::<Frequency>().unwrap())
        .until("2030-02-01T09:00:00Z");
    let (result, (channel, payload)) = tokio::join!(
        client.trigger_room_scheduled("standup", "team", json!({"topic": "daily"}), &schedule),
        answer(&mut peer, json!({"success": true}))
    );
    result.unwrap();
    assert_eq!(channel, "roomevents");
    assert_eq!(payload["room"], "team");
    assert_eq!(
        payload["payload"],
        json!({
            "topic": "daily",
            "scheduled_at": "2030-01-01T09:00:00Z",
            "frequency": "1d",
            "repeat_until": "2030-02-01T09:00:00Z"
        })
    );
}

#[tokio::test]
async fn test_rejected_command_keeps_connection() {
    let (client, mut peer) = connected(Identity::new("alice")).await;

    let (result, _) = tokio::join!(
        client.join("vip"),
        answer(&mut peer, json!({"success": false, "message": "room is private"}))
    );
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerRejection);
    assert!(err.is_recoverable());
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_message_generates_client_msg_id() {
    let (client, mut peer) = connected(Identity::new("alice")).await;

    let (id, (channel, payload)) = tokio::join!(
        client.message(OutgoingMessage::new("hi").in_room("r1").for_alias("alice")),
        answer(&mut peer, json!({"success": true}))
    );
    let id = id.unwrap();
    assert_eq!(channel, "message");
    assert_eq!(payload["clientMsgId"], id.as_str());
    assert_eq!(payload["message"], "hi");
    assert_eq!(payload["encrypted"], false);
    assert_eq!(payload["room"], "r1");
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let err = client.message(OutgoingMessage::new("hi")).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));
}

// ============================================================================
// Listeners
// ============================================================================

#[tokio::test]
async fn test_delivery_receipt_reaches_callback_once() {
    let (client, mut peer) = connected(Identity::new("alice")).await;
    let (tx, mut receipts) = mpsc::unbounded_channel();
    client.on_delivery_receipt(move |receipt| {
        let _ = tx.send(receipt);
    });

    let (id, _) = tokio::join!(
        client.message(OutgoingMessage::new("hi").in_room("r1").for_alias("alice")),
        answer(&mut peer, json!({"success": true}))
    );
    let id = id.unwrap();

    peer.emit(
        "delivery-receipt",
        json!({"alias": "bob", "status": "delivered", "clientMsgId": id, "serverEvtId": "evt-1"}),
    );

    let receipt = receipts.recv().await.unwrap();
    assert_eq!(receipt.status, DeliveryStatus::Delivered);
    assert_eq!(receipt.client_msg_id.as_deref(), Some(id.as_str()));
    settle().await;
    assert!(receipts.try_recv().is_err());
}

#[tokio::test]
async fn test_rebinding_status_replaces_callback() {
    let (client, peer) = connected(Identity::new("alice")).await;
    let (tx, mut seen) = mpsc::unbounded_channel();

    let first = tx.clone();
    client.on_status(move |_| {
        let _ = first.send("cb1");
    });
    client.on_status(move |_| {
        let _ = tx.send("cb2");
    });

    peer.emit("status", json!({"isOnline": true, "user": "bob"}));
    peer.emit("status", json!({"isOnline": false, "user": "bob"}));

    assert_eq!(seen.recv().await, Some("cb2"));
    assert_eq!(seen.recv().await, Some("cb2"));
    settle().await;
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_no_callbacks_after_disconnect() {
    let (client, peer) = connected(Identity::new("alice")).await;
    let (tx, mut seen) = mpsc::unbounded_channel::<&str>();

    let status = tx.clone();
    client.on_status(move |_| {
        let _ = status.send("status");
    });
    client.on_event("orderShipped", move |_| {
        let _ = tx.send("event");
    });

    client.disconnect();
    assert!(!client.is_listening(&ChannelKey::Status));

    peer.emit("status", json!({"isOnline": true, "user": "bob"}));
    peer.emit("orderShipped", json!({"payload": {}}));
    settle().await;
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_online_users_snapshot_requested_on_bind() {
    let (client, mut peer) = connected(Identity::new("alice")).await;
    let (tx, mut lists) = mpsc::unbounded_channel();

    client.on_online_users(move |users| {
        let _ = tx.send(users);
    });

    let (id, channel, payload) = peer.expect_event().await.unwrap();
    assert_eq!(id, None);
    assert_eq!(channel, "getOnlineUsers");
    assert_eq!(payload, json!({"app_uuid": "app1"}));

    peer.emit("onlineUsers", json!(["alice", "bob"]));
    peer.emit("onlineUsers", json!([{"alias": "alice"}]));

    let snapshot = lists.recv().await.unwrap();
    assert_eq!(snapshot.aliases().collect::<Vec<_>>(), vec!["alice", "bob"]);
    let pushed = lists.recv().await.unwrap();
    assert_eq!(pushed.len(), 1);
}

#[tokio::test]
async fn test_online_users_bound_before_connect_gets_snapshot() {
    let (client, peers) = client_with(config());
    let (tx, mut lists) = mpsc::unbounded_channel();
    client.on_online_users(move |users| {
        let _ = tx.send(users);
    });

    let server = serve_register(peers, json!({"success": true}));
    client.connect(Identity::new("alice")).await.unwrap();
    let (mut peer, _) = server.await.unwrap();

    let (id, channel, payload) = timeout(Duration::from_secs(1), peer.expect_event())
        .await
        .expect("snapshot should be requested after connecting")
        .unwrap();
    assert_eq!(id, None);
    assert_eq!(channel, "getOnlineUsers");
    assert_eq!(payload, json!({"app_uuid": "app1"}));

    peer.emit("onlineUsers", json!(["alice"]));
    let snapshot = lists.recv().await.unwrap();
    assert_eq!(snapshot.aliases().collect::<Vec<_>>(), vec!["alice"]);
}

#[tokio::test]
async fn test_incoming_message_acknowledged() {
    let (client, mut peer) = connected(Identity::new("alice")).await;
    let (tx, mut messages) = mpsc::unbounded_channel();
    client.on_message(move |message| {
        let _ = tx.send(message);
    });

    peer.emit_with_ack(
        "receiveMessage",
        json!({"message": "hello", "encrypted": true, "sender": "bob"}),
        11,
    );

    let message = messages.recv().await.unwrap();
    assert_eq!(message.message, "hello");
    assert!(message.encrypted);

    match peer.recv_packet().await.unwrap() {
        SocketPacket::Ack { id, args, .. } => {
            assert_eq!(id, 11);
            assert_eq!(args, vec![json!({"status": "delivered"})]);
        }
        other => panic!("expected delivery ack, got {other:?}"),
    }
}
