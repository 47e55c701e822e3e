//! Typed payloads carried on each named channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel (event) names used on the wire.
pub mod channel {
    /// Identity registration (request/ack).
    pub const REGISTER: &str = "register";
    /// Alias-targeted event (request/ack).
    pub const EVENT: &str = "event";
    /// Room-targeted event (request/ack).
    pub const ROOM_EVENTS: &str = "roomevents";
    /// Room join (request/ack).
    pub const JOIN: &str = "join";
    /// Room leave (request/ack).
    pub const LEAVE: &str = "leave";
    /// Chat message (request/ack).
    pub const MESSAGE: &str = "message";
    /// Online-users snapshot request (fire-and-forget).
    pub const GET_ONLINE_USERS: &str = "getOnlineUsers";
    /// Presence change of a single user (inbound).
    pub const STATUS: &str = "status";
    /// Online-users list (inbound).
    pub const ONLINE_USERS: &str = "onlineUsers";
    /// Incoming chat message, acknowledged on delivery (inbound).
    pub const RECEIVE_MESSAGE: &str = "receiveMessage";
    /// Delivery receipt for a sent message (inbound).
    pub const DELIVERY_RECEIPT: &str = "delivery-receipt";
}

/// Identity registration sent on `register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// App scope.
    pub app_uuid: String,
    /// Client-chosen display name.
    pub alias: String,
    /// Push token obtained out of band.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Free-form client metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Event addressed to an alias, sent on `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRequest {
    /// Name of the event delivered to the target.
    pub event: String,
    /// Target alias.
    pub alias: String,
    /// Event payload.
    pub payload: Value,
    /// App scope.
    pub app_uuid: String,
}

/// Event addressed to a room, sent on `roomevents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEventRequest {
    /// Name of the event delivered to room members.
    pub event: String,
    /// Target room.
    pub room: String,
    /// Event payload.
    pub payload: Value,
    /// App scope.
    pub app_uuid: String,
}

/// Room membership change, sent on `join` and `leave`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRequest {
    /// Room name.
    pub room: String,
    /// App scope.
    pub app_uuid: String,
}

/// Chat message, sent on `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Message text.
    pub message: String,
    /// Whether `message` is end-to-end encrypted ciphertext.
    pub encrypted: bool,
    /// Target room, for room messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Target alias, for direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// App scope.
    pub app_uuid: String,
    /// Client-generated id echoed back in delivery receipts.
    #[serde(
        rename = "clientMsgId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_msg_id: Option<String>,
}

/// Online-users snapshot request, sent on `getOnlineUsers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUsersQuery {
    /// App scope.
    pub app_uuid: String,
}

/// Acknowledgment body returned by the server for request/ack channels.
///
/// A missing `success` flag counts as success; only an explicit `false`
/// is a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    /// Whether the server accepted the request.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Server-supplied detail, usually the rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl AckResponse {
    /// A bare successful acknowledgment.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// A rejection carrying the server's reason.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    /// Reads an acknowledgment from raw ack arguments.
    ///
    /// Only the first argument is inspected. Anything that is not an object
    /// with the expected shape is treated as a plain success.
    #[must_use]
    pub fn from_args(args: &[Value]) -> Self {
        match args.first() {
            Some(value @ Value::Object(_)) => {
                serde_json::from_value(value.clone()).unwrap_or_else(|_| Self::ok())
            }
            _ => Self::ok(),
        }
    }
}

/// Presence change of one user, received on `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Whether the user just came online.
    #[serde(rename = "isOnline")]
    pub is_online: bool,
    /// Alias of the user.
    pub user: String,
}

/// One entry of the online-users list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OnlineUser {
    /// Alias of the online user.
    pub alias: String,
}

/// Online-users list, received on `onlineUsers`.
///
/// Servers send either `[{"alias": ..}]`, a bare list of aliases, or the list
/// wrapped as `{"users": [..]}`; all three decode to the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OnlineUsersWire")]
pub struct OnlineUsers(pub Vec<OnlineUser>);

impl OnlineUsers {
    /// Aliases in server order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|user| user.alias.as_str())
    }

    /// Number of online users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OnlineUserEntry {
    Alias(String),
    User(OnlineUser),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OnlineUsersWire {
    List(Vec<OnlineUserEntry>),
    Wrapped { users: Vec<OnlineUserEntry> },
}

impl From<OnlineUsersWire> for OnlineUsers {
    fn from(wire: OnlineUsersWire) -> Self {
        let entries = match wire {
            OnlineUsersWire::List(entries) | OnlineUsersWire::Wrapped { users: entries } => {
                entries
            }
        };
        OnlineUsers(
            entries
                .into_iter()
                .map(|entry| match entry {
                    OnlineUserEntry::Alias(alias) => OnlineUser { alias },
                    OnlineUserEntry::User(user) => user,
                })
                .collect(),
        )
    }
}

/// Incoming chat message, received on `receiveMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Message text (ciphertext when `encrypted`).
    #[serde(alias = "text")]
    pub message: String,
    /// Whether `message` is ciphertext.
    #[serde(default)]
    pub encrypted: bool,
    /// Alias of the sender.
    pub sender: String,
    /// Room the message was sent to, for room messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// Delivery state reported in a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Reached the recipient's client.
    Delivered,
    /// Seen by the recipient.
    Read,
    /// Could not be delivered.
    Failed,
    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Read => write!(f, "read"),
            DeliveryStatus::Failed => write!(f, "failed"),
            DeliveryStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Receipt for a previously sent message, received on `delivery-receipt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Alias the message was delivered to.
    pub alias: String,
    /// Delivery state.
    pub status: DeliveryStatus,
    /// Id the sender attached to the message.
    #[serde(
        rename = "clientMsgId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_msg_id: Option<String>,
    /// Server-side event id.
    #[serde(
        rename = "serverEvtId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub server_evt_id: Option<String>,
}

/// Acknowledgment body this client returns for an incoming message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfirmation {
    /// Always [`DeliveryStatus::Delivered`] when sent by this client.
    pub status: DeliveryStatus,
}

impl DeliveryConfirmation {
    /// Confirmation that a message reached this client.
    #[must_use]
    pub fn delivered() -> Self {
        Self {
            status: DeliveryStatus::Delivered,
        }
    }
}

/// Application-defined event, received on any custom channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    /// Event payload as sent by the trigger.
    #[serde(default)]
    pub payload: Value,
    /// Whether the event was broadcast to a room rather than an alias.
    #[serde(rename = "isRoom", alias = "isRoomScoped", default)]
    pub is_room: bool,
}
