//! # SocketPush Client
//!
//! Async client for the SocketPush notification and presence service.
//!
//! A [`SocketPush`] owns one logical connection to a server. It registers an
//! alias within an app scope, issues acknowledged commands (room
//! membership, targeted events, chat messages) and routes server pushes to
//! typed listeners.
//!
//! ## Layers
//!
//! - [`TransportHandle`]: one socket and its Engine.IO/Socket.IO framing
//! - [`AckBroker`]: request/acknowledgment correlation with timeouts
//! - [`StateMachine`]: `Disconnected -> Connecting -> Connected | Error`
//! - [`ListenerRegistry`]: one callback per inbound channel, last writer wins
//! - [`SocketPush`]: the command façade tying them together
//! - [`PushNotifier`]: HTTP sender for device push notifications
//!
//! ## Example
//!
//! ```rust
//! use socketpush_client::{ClientConfig, Identity, MemoryConnector, SocketPush};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> socketpush_client::Result<()> {
//! let (connector, mut peers) = MemoryConnector::new();
//! let client = SocketPush::with_connector(
//!     ClientConfig::new("http://localhost:8000", "app1"),
//!     Arc::new(connector),
//! )?;
//!
//! // Play the server side in process.
//! tokio::spawn(async move {
//!     let mut peer = peers.recv().await.unwrap();
//!     peer.accept().await;
//!     let (id, _, _) = peer.expect_event().await.unwrap();
//!     peer.ack(id.unwrap(), serde_json::json!({"success": true}));
//!     while peer.recv_frame().await.is_some() {}
//! });
//!
//! client.connect(Identity::new("alice")).await?;
//! assert!(client.is_connected());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod broker;
mod client;
mod config;
mod error;
mod push;
mod registry;
mod state;
pub mod transport;

pub use broker::AckBroker;
pub use client::{Identity, OutgoingMessage, SocketPush};
pub use config::{ClientConfig, ConfigOverrides, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS};
pub use error::{ClientError, ErrorKind, Result};
pub use push::{Notification, NotificationAction, PushNotifier, PushOutcome, DEFAULT_PUSH_API};
pub use registry::{ChannelKey, ListenerRegistry};
pub use state::{ConnectionState, StateMachine};
pub use transport::{
    Connector, InboundEvent, MemoryConnector, MemoryPeer, Transport, TransportHandle,
    TransportSignal, TransportStatus, WebSocketConnector,
};

pub use socketpush_protocol as protocol;
