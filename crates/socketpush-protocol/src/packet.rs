//! Engine.IO and Socket.IO text packet codec.

use crate::{ProtocolError, Result, DEFAULT_NAMESPACE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine.IO open handshake, sent by the server as the first frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the server offers to upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Interval between server pings, in milliseconds.
    pub ping_interval: u64,
    /// Grace period after a ping before the session is dead, in milliseconds.
    pub ping_timeout: u64,
    /// Maximum number of bytes per frame accepted by the server.
    #[serde(default)]
    pub max_payload: u64,
}

/// A single Engine.IO frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    /// Session opened (`0`).
    Open(Handshake),
    /// Session closed (`1`).
    Close,
    /// Keep-alive probe (`2`).
    Ping(Option<String>),
    /// Keep-alive answer (`3`).
    Pong(Option<String>),
    /// Socket.IO payload (`4`).
    Message(SocketPacket),
    /// Transport upgrade (`5`).
    Upgrade,
    /// No-op (`6`).
    Noop,
}

impl EnginePacket {
    /// Encodes the frame as text.
    ///
    /// # Errors
    ///
    /// Returns an error if a JSON body cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        let frame = match self {
            EnginePacket::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data.as_deref().unwrap_or_default()),
            EnginePacket::Pong(data) => format!("3{}", data.as_deref().unwrap_or_default()),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()?),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        };
        Ok(frame)
    }

    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is empty, has an unknown type, or carries
    /// an invalid body.
    pub fn decode(text: &str) -> Result<Self> {
        let Some(kind) = text.chars().next() else {
            return Err(ProtocolError::Malformed("empty frame".into()));
        };
        let body = &text[kind.len_utf8()..];

        let packet = match kind {
            '0' => EnginePacket::Open(serde_json::from_str(body)?),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(non_empty(body)),
            '3' => EnginePacket::Pong(non_empty(body)),
            '4' => EnginePacket::Message(SocketPacket::decode(body)?),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        };
        Ok(packet)
    }
}

fn non_empty(body: &str) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// A Socket.IO packet, carried inside an Engine.IO message frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect request or confirmation (`0`).
    Connect {
        /// Target namespace.
        namespace: String,
        /// Auth data (client) or session data (server).
        data: Option<Value>,
    },
    /// Namespace disconnect (`1`).
    Disconnect {
        /// Target namespace.
        namespace: String,
    },
    /// Named event (`2`), optionally requesting an acknowledgment.
    Event {
        /// Target namespace.
        namespace: String,
        /// Acknowledgment id, present when the sender wants an ack.
        id: Option<u64>,
        /// Event (channel) name.
        event: String,
        /// Event arguments.
        args: Vec<Value>,
    },
    /// Acknowledgment of an earlier event (`3`).
    Ack {
        /// Target namespace.
        namespace: String,
        /// Id of the event being acknowledged.
        id: u64,
        /// Acknowledgment arguments.
        args: Vec<Value>,
    },
    /// Namespace connect refused (`4`).
    ConnectError {
        /// Target namespace.
        namespace: String,
        /// Error details sent by the server.
        data: Value,
    },
}

impl SocketPacket {
    /// Connect request for the default namespace.
    #[must_use]
    pub fn connect() -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }

    /// Fire-and-forget event on the default namespace.
    #[must_use]
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            id: None,
            event: event.into(),
            args: vec![payload],
        }
    }

    /// Event on the default namespace that asks for acknowledgment `id`.
    #[must_use]
    pub fn event_with_ack(event: impl Into<String>, payload: Value, id: u64) -> Self {
        SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            id: Some(id),
            event: event.into(),
            args: vec![payload],
        }
    }

    /// Acknowledgment of server event `id` on the default namespace.
    #[must_use]
    pub fn ack(id: u64, payload: Value) -> Self {
        SocketPacket::Ack {
            namespace: DEFAULT_NAMESPACE.to_string(),
            id,
            args: vec![payload],
        }
    }

    /// Namespace this packet is addressed to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    fn type_char(&self) -> char {
        match self {
            SocketPacket::Connect { .. } => '0',
            SocketPacket::Disconnect { .. } => '1',
            SocketPacket::Event { .. } => '2',
            SocketPacket::Ack { .. } => '3',
            SocketPacket::ConnectError { .. } => '4',
        }
    }

    /// Encodes the packet as text.
    ///
    /// Format: `<type>[<namespace>,][<ack id>][<json>]`, with the default
    /// namespace omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if a JSON body cannot be serialized.
    pub fn encode(&self) -> Result<String> {
        let mut out = String::new();
        out.push(self.type_char());

        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }

        match self {
            SocketPacket::Connect { data, .. } => {
                if let Some(data) = data {
                    out.push_str(&serde_json::to_string(data)?);
                }
            }
            SocketPacket::Disconnect { .. } => {}
            SocketPacket::Event {
                id, event, args, ..
            } => {
                if let Some(id) = id {
                    out.push_str(&id.to_string());
                }
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(event.clone()));
                items.extend(args.iter().cloned());
                out.push_str(&serde_json::to_string(&items)?);
            }
            SocketPacket::Ack { id, args, .. } => {
                out.push_str(&id.to_string());
                out.push_str(&serde_json::to_string(args)?);
            }
            SocketPacket::ConnectError { data, .. } => {
                out.push_str(&serde_json::to_string(data)?);
            }
        }

        Ok(out)
    }

    /// Decodes a packet from the text following the Engine.IO `4` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the packet is malformed, binary, or of an unknown
    /// type.
    pub fn decode(text: &str) -> Result<Self> {
        let Some(kind) = text.chars().next() else {
            return Err(ProtocolError::Malformed("empty packet".into()));
        };
        if matches!(kind, '5' | '6') {
            return Err(ProtocolError::UnsupportedBinary);
        }
        let mut rest = &text[kind.len_utf8()..];

        let namespace = if rest.starts_with('/') {
            if let Some(idx) = rest.find(',') {
                let namespace = rest[..idx].to_string();
                rest = &rest[idx + 1..];
                namespace
            } else {
                let namespace = rest.to_string();
                rest = "";
                namespace
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|_| ProtocolError::Malformed("ack id out of range".into()))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let Some(Value::Array(mut items)) = data else {
                    return Err(ProtocolError::Malformed(
                        "event body must be a JSON array".into(),
                    ));
                };
                if items.is_empty() {
                    return Err(ProtocolError::Malformed("event without a name".into()));
                }
                let Value::String(event) = items.remove(0) else {
                    return Err(ProtocolError::Malformed(
                        "event name must be a string".into(),
                    ));
                };
                Ok(SocketPacket::Event {
                    namespace,
                    id,
                    event,
                    args: items,
                })
            }
            '3' => {
                let id = id.ok_or_else(|| ProtocolError::Malformed("ack without id".into()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    None => Vec::new(),
                    Some(_) => {
                        return Err(ProtocolError::Malformed(
                            "ack body must be a JSON array".into(),
                        ))
                    }
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    id,
                    args,
                })
            }
            '4' => Ok(SocketPacket::ConnectError {
                namespace,
                data: data.unwrap_or(Value::Null),
            }),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_handshake() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let packet = EnginePacket::decode(frame).unwrap();

        let EnginePacket::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.sid, "abc");
        assert_eq!(handshake.ping_interval, 25000);
        assert_eq!(handshake.ping_timeout, 20000);
    }

    #[test]
    fn test_ping_pong_frames() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(None));
        assert_eq!(
            EnginePacket::decode("2probe").unwrap(),
            EnginePacket::Ping(Some("probe".into()))
        );
        assert_eq!(EnginePacket::Pong(None).encode().unwrap(), "3");
    }

    #[test]
    fn test_encode_connect() {
        let frame = EnginePacket::Message(SocketPacket::connect())
            .encode()
            .unwrap();
        assert_eq!(frame, "40");
    }

    #[test]
    fn test_encode_event_without_ack() {
        let packet = SocketPacket::event("status", json!({"isOnline": true}));
        assert_eq!(packet.encode().unwrap(), r#"2["status",{"isOnline":true}]"#);
    }

    #[test]
    fn test_encode_ack_reply() {
        let packet = SocketPacket::ack(12, json!({"status": "delivered"}));
        assert_eq!(packet.encode().unwrap(), r#"312[{"status":"delivered"}]"#);
    }

    #[test]
    fn test_decode_event_with_ack_id() {
        let packet = SocketPacket::decode(r#"25["receiveMessage",{"message":"hi"}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/".into(),
                id: Some(5),
                event: "receiveMessage".into(),
                args: vec![json!({"message": "hi"})],
            }
        );
    }

    #[test]
    fn test_decode_custom_namespace() {
        let packet = SocketPacket::decode(r#"2/admin,3["ping",1,2]"#).unwrap();
        let SocketPacket::Event {
            namespace, id, args, ..
        } = packet
        else {
            panic!("expected event");
        };
        assert_eq!(namespace, "/admin");
        assert_eq!(id, Some(3));
        assert_eq!(args, vec![json!(1), json!(2)]);

        let encoded = SocketPacket::Disconnect {
            namespace: "/admin".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(encoded, "1/admin,");
    }

    #[test]
    fn test_decode_ack_without_args() {
        let packet = SocketPacket::decode("37").unwrap();
        assert_eq!(
            packet,
            SocketPacket::Ack {
                namespace: "/".into(),
                id: 7,
                args: vec![],
            }
        );
    }

    #[test]
    fn test_decode_connect_error() {
        let packet = SocketPacket::decode(r#"4{"message":"Not authorized"}"#).unwrap();
        assert!(matches!(packet, SocketPacket::ConnectError { .. }));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            EnginePacket::decode(""),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            EnginePacket::decode("9"),
            Err(ProtocolError::UnknownPacketType('9'))
        ));
        assert!(matches!(
            SocketPacket::decode(r#"51-["upload",{"_placeholder":true,"num":0}]"#),
            Err(ProtocolError::UnsupportedBinary)
        ));
        assert!(SocketPacket::decode("3").is_err());
        assert!(SocketPacket::decode(r#"2{"event":"x"}"#).is_err());
        assert!(SocketPacket::decode("2[]").is_err());
        assert!(SocketPacket::decode("2[42]").is_err());
        assert!(SocketPacket::decode("299999999999999999999999[\"x\"]").is_err());
    }
}
