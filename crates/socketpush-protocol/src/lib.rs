//! # SocketPush Protocol
//!
//! Wire protocol definitions for the SocketPush notification and presence
//! service.
//!
//! The service speaks Socket.IO v5 on top of Engine.IO v4 over a WebSocket.
//! This crate contains no I/O: it encodes and decodes text frames and defines
//! the typed payload carried on every named channel.
//!
//! ## Example
//!
//! ```rust
//! use socketpush_protocol::{EnginePacket, SocketPacket};
//!
//! let frame = EnginePacket::Message(SocketPacket::event_with_ack(
//!     "join",
//!     serde_json::json!({"room": "lobby", "app_uuid": "app1"}),
//!     7,
//! ))
//! .encode()
//! .unwrap();
//! assert_eq!(frame, r#"427["join",{"app_uuid":"app1","room":"lobby"}]"#);
//!
//! let decoded = EnginePacket::decode("431[{\"success\":true}]").unwrap();
//! assert!(matches!(
//!     decoded,
//!     EnginePacket::Message(SocketPacket::Ack { id: 1, .. })
//! ));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod packet;
pub mod payload;
mod schedule;

pub use error::{ProtocolError, Result};
pub use packet::{EnginePacket, Handshake, SocketPacket};
pub use payload::{
    channel, AckResponse, CustomEvent, DeliveryConfirmation, DeliveryReceipt, DeliveryStatus,
    EventRequest, IncomingMessage, MessageRequest, OnlineUser, OnlineUsers, OnlineUsersQuery,
    RegisterRequest, RoomEventRequest, RoomRequest, StatusUpdate,
};
pub use schedule::{Frequency, FrequencyUnit, Schedule};

/// Engine.IO protocol revision spoken by this crate.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Namespace used when a packet carries none.
pub const DEFAULT_NAMESPACE: &str = "/";

/// HTTP path the Socket.IO server is mounted on by default.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";
