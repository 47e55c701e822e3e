//! In-process transport.
//!
//! [`MemoryConnector`] hands every opened connection's server end to the
//! owner as a [`MemoryPeer`], which can script the server side of the
//! protocol: handshake, acknowledgments and pushed events.

use super::{Connector, Transport};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use socketpush_protocol::{EnginePacket, Handshake, SocketPacket};
use tokio::sync::mpsc;

/// Connector whose connections terminate in this process.
#[derive(Debug)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Option<String>,
}

impl MemoryConnector {
    /// Create a connector and the receiver of server ends it produces.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers, refuse: None }, rx)
    }

    /// Create a connector whose every connection attempt fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        let (peers, _) = mpsc::unbounded_channel();
        Self {
            peers,
            refuse: Some(reason.into()),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        if let Some(reason) = &self.refuse {
            return Err(ClientError::Transport(reason.clone()));
        }

        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.to_string(),
            incoming: server_rx,
            outgoing: server_tx,
        };
        self.peers
            .send(peer)
            .map_err(|_| ClientError::Transport("connection refused".into()))?;

        Ok(Box::new(MemoryTransport {
            outgoing: Some(client_tx),
            incoming: client_rx,
        }))
    }
}

struct MemoryTransport {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        let Some(outgoing) = &self.outgoing else {
            return Err(ClientError::ConnectionClosed);
        };
        outgoing
            .send(frame)
            .map_err(|_| ClientError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.outgoing = None;
        self.incoming.close();
        Ok(())
    }
}

/// Server end of an in-process connection.
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

impl MemoryPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next raw frame from the client; `None` once the client closed.
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Raw frame to the client. Returns `false` if the client is gone.
    pub fn send_frame(&self, frame: impl Into<String>) -> bool {
        self.outgoing.send(frame.into()).is_ok()
    }

    /// Next Socket.IO packet from the client, skipping keep-alive frames.
    ///
    /// Returns `None` once the client closed or on an undecodable frame.
    pub async fn recv_packet(&mut self) -> Option<SocketPacket> {
        loop {
            let frame = self.recv_frame().await?;
            match EnginePacket::decode(&frame).ok()? {
                EnginePacket::Message(packet) => return Some(packet),
                EnginePacket::Close => return None,
                _ => {}
            }
        }
    }

    /// Socket.IO packet to the client.
    pub fn send_packet(&self, packet: SocketPacket) -> bool {
        match EnginePacket::Message(packet).encode() {
            Ok(frame) => self.send_frame(frame),
            Err(_) => false,
        }
    }

    /// Complete the Engine.IO/Socket.IO handshake with default timings.
    pub async fn accept(&mut self) -> bool {
        self.accept_with(Handshake {
            sid: uuid::Uuid::new_v4().to_string(),
            upgrades: Vec::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: 1_000_000,
        })
        .await
    }

    /// Complete the handshake advertising `handshake`.
    ///
    /// Returns `false` if the client did not request the default namespace.
    pub async fn accept_with(&mut self, handshake: Handshake) -> bool {
        let sid = handshake.sid.clone();
        let Ok(open) = EnginePacket::Open(handshake).encode() else {
            return false;
        };
        if !self.send_frame(open) {
            return false;
        }
        match self.recv_packet().await {
            Some(SocketPacket::Connect { .. }) => self.send_packet(SocketPacket::Connect {
                namespace: socketpush_protocol::DEFAULT_NAMESPACE.to_string(),
                data: Some(json!({ "sid": sid })),
            }),
            _ => false,
        }
    }

    /// Refuse the namespace connection after the Engine.IO open.
    pub async fn refuse(&mut self, message: &str) -> bool {
        if !self.send_frame(format!(
            "0{}",
            json!({"sid": "refused", "upgrades": [], "pingInterval": 25000, "pingTimeout": 20000})
        )) {
            return false;
        }
        match self.recv_packet().await {
            Some(SocketPacket::Connect { .. }) => self.send_packet(SocketPacket::ConnectError {
                namespace: socketpush_protocol::DEFAULT_NAMESPACE.to_string(),
                data: json!({ "message": message }),
            }),
            _ => false,
        }
    }

    /// Next event from the client as `(ack id, channel, first argument)`.
    pub async fn expect_event(&mut self) -> Option<(Option<u64>, String, Value)> {
        loop {
            if let SocketPacket::Event {
                id, event, mut args, ..
            } = self.recv_packet().await?
            {
                let payload = if args.is_empty() {
                    Value::Null
                } else {
                    args.swap_remove(0)
                };
                return Some((id, event, payload));
            }
        }
    }

    /// Acknowledge client event `id` with `payload`.
    pub fn ack(&self, id: u64, payload: Value) -> bool {
        self.send_packet(SocketPacket::ack(id, payload))
    }

    /// Push an event to the client.
    pub fn emit(&self, event: &str, payload: Value) -> bool {
        self.send_packet(SocketPacket::event(event, payload))
    }

    /// Push an event that asks the client for acknowledgment `id`.
    pub fn emit_with_ack(&self, event: &str, payload: Value, id: u64) -> bool {
        self.send_packet(SocketPacket::event_with_ack(event, payload, id))
    }

    /// Close the session from the server side.
    pub fn close(&self) -> bool {
        self.send_frame("1")
    }
}
