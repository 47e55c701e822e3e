//! Transport handle: one socket connection and its framing.

use super::{Connector, Transport};
use crate::error::{ClientError, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use socketpush_protocol::{EnginePacket, Handshake, SocketPacket, DEFAULT_NAMESPACE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Continuation invoked with the arguments of a server acknowledgment.
pub type AckCallback = Box<dyn FnOnce(Vec<Value>) + Send>;

/// Raw inbound event handler.
pub type EventHandler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

/// Observer of transport lifecycle signals.
pub type LifecycleHook = Arc<dyn Fn(&TransportSignal) + Send + Sync>;

static NULL: Value = Value::Null;

/// Identifies one handler registered with [`TransportHandle::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Observable status of the underlying connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportStatus {
    /// Not connected.
    Closed,
    /// Socket connecting or handshake in progress.
    Opening,
    /// Handshake complete; frames flow.
    Open,
    /// The last open attempt or session failed.
    Failed(String),
}

impl TransportStatus {
    /// Whether frames can be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, TransportStatus::Open)
    }

    /// Whether an open attempt is in flight.
    #[must_use]
    pub fn is_opening(&self) -> bool {
        matches!(self, TransportStatus::Opening)
    }
}

/// Lifecycle signal delivered to [`LifecycleHook`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The handshake completed.
    Open,
    /// The connection is gone.
    Close,
    /// The connection failed; a [`TransportSignal::Close`] follows if it had
    /// been open.
    Error(String),
}

/// An event pushed by the server.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Channel name.
    pub event: String,
    /// Event arguments.
    pub args: Vec<Value>,
    ack: Option<Acknowledger>,
}

impl InboundEvent {
    /// First argument, or `null`.
    pub fn payload(&self) -> &Value {
        self.args.first().unwrap_or(&NULL)
    }

    /// Handle for answering the server, if it asked for an acknowledgment.
    pub fn acknowledger(&self) -> Option<&Acknowledger> {
        self.ack.as_ref()
    }
}

/// Answers one server event that requested an acknowledgment.
///
/// Clones share the same slot: only the first [`Acknowledger::send`] goes out.
#[derive(Debug, Clone)]
pub struct Acknowledger {
    id: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    sent: Arc<AtomicBool>,
}

impl Acknowledger {
    /// Acknowledgment id assigned by the server.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue the acknowledgment. Returns `false` if it was already sent or the
    /// connection is gone.
    pub fn send(&self, payload: Value) -> bool {
        if self.sent.swap(true, Ordering::AcqRel) {
            return false;
        }
        match EnginePacket::Message(SocketPacket::ack(self.id, payload)).encode() {
            Ok(frame) => self.outbound.send(Outbound::Frame(frame)).is_ok(),
            Err(e) => {
                warn!(ack_id = self.id, error = %e, "Failed to encode acknowledgment");
                false
            }
        }
    }
}

#[derive(Debug)]
enum Outbound {
    Frame(String),
    Shutdown,
}

/// Sender side of the running session, tagged with the open attempt it
/// belongs to.
struct Link {
    sender: Option<mpsc::UnboundedSender<Outbound>>,
    generation: u64,
}

struct Shared {
    link: Mutex<Link>,
    status: watch::Sender<TransportStatus>,
    pending: Mutex<HashMap<u64, AckCallback>>,
    next_ack_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
    next_handler_id: AtomicU64,
    hooks: RwLock<Vec<LifecycleHook>>,
}

impl Shared {
    fn emit(&self, signal: &TransportSignal) {
        let hooks: Vec<LifecycleHook> = self.hooks.read().clone();
        for hook in hooks {
            hook(signal);
        }
    }

    /// Open attempt `generation` completed its handshake.
    fn mark_open(&self, generation: u64) -> bool {
        {
            let link = self.link.lock();
            if link.generation != generation {
                return false;
            }
            self.status.send_replace(TransportStatus::Open);
        }
        self.emit(&TransportSignal::Open);
        true
    }

    /// Session `generation` ended on its own. A no-op if the handle was
    /// closed or reopened meanwhile.
    fn settle(&self, generation: u64, status: TransportStatus, signals: &[TransportSignal]) {
        let drained = {
            let mut link = self.link.lock();
            if link.generation != generation {
                return;
            }
            link.sender = None;
            self.status.send_replace(status);
            std::mem::take(&mut *self.pending.lock())
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "Dropping pending acknowledgments");
        }
        drop(drained);
        for signal in signals {
            self.emit(signal);
        }
    }

    fn resolve_ack(&self, id: u64, args: Vec<Value>) {
        let callback = self.pending.lock().remove(&id);
        match callback {
            Some(callback) => callback(args),
            None => debug!(ack_id = id, "Acknowledgment without pending request ignored"),
        }
    }

    fn dispatch(&self, event: &InboundEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .get(&event.event)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(event = %event.event, "No handler for inbound event");
            return;
        }
        for handler in handlers {
            handler(event);
        }
    }

    fn outbound(&self) -> Option<mpsc::UnboundedSender<Outbound>> {
        self.link.lock().sender.clone()
    }
}

/// Owns exactly one socket connection to a fixed endpoint.
///
/// [`open`](Self::open) is idempotent and returns immediately; the connection
/// is driven by a background task. Progress is observable through
/// [`status`](Self::status) and [`on_lifecycle`](Self::on_lifecycle) hooks.
/// No retries happen at this layer.
pub struct TransportHandle {
    url: String,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

impl TransportHandle {
    /// Create a closed handle for `url`.
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(TransportStatus::Closed);
        Self {
            url: url.into(),
            connector,
            shared: Arc::new(Shared {
                link: Mutex::new(Link {
                    sender: None,
                    generation: 0,
                }),
                status,
                pending: Mutex::new(HashMap::new()),
                next_ack_id: AtomicU64::new(1),
                handlers: RwLock::new(HashMap::new()),
                next_handler_id: AtomicU64::new(1),
                hooks: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current status.
    pub fn current_status(&self) -> TransportStatus {
        self.shared.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn status(&self) -> watch::Receiver<TransportStatus> {
        self.shared.status.subscribe()
    }

    /// Whether frames can be sent right now.
    pub fn is_open(&self) -> bool {
        self.shared.status.borrow().is_open()
    }

    /// Start connecting unless already open or opening.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(&self) {
        let (rx, generation) = {
            let mut link = self.shared.link.lock();
            let started = self.shared.status.send_if_modified(|status| {
                if status.is_open() || status.is_opening() {
                    false
                } else {
                    *status = TransportStatus::Opening;
                    true
                }
            });
            if !started {
                debug!(url = %self.url, "Transport already open or opening");
                return;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            link.sender = Some(tx);
            link.generation += 1;
            (rx, link.generation)
        };

        debug!(url = %self.url, generation, "Opening transport");
        tokio::spawn(run_session(
            Arc::clone(&self.shared),
            Arc::clone(&self.connector),
            self.url.clone(),
            rx,
            generation,
        ));
    }

    /// Tear the connection down.
    ///
    /// Stops accepting sends and drops every pending acknowledgment
    /// continuation before returning. The background task says goodbye to
    /// the server and exits on its own.
    pub fn close(&self) {
        let (sender, drained, previous) = {
            let mut link = self.shared.link.lock();
            link.generation += 1;
            let sender = link.sender.take();
            let previous = self.shared.status.send_replace(TransportStatus::Closed);
            let drained = std::mem::take(&mut *self.shared.pending.lock());
            (sender, drained, previous)
        };

        if let Some(sender) = sender {
            let _ = sender.send(Outbound::Shutdown);
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "Dropping pending acknowledgments");
        }
        drop(drained);

        if previous.is_open() || previous.is_opening() {
            info!(url = %self.url, "Transport closed");
            self.shared.emit(&TransportSignal::Close);
        }
    }

    /// Send `payload` on `channel`.
    ///
    /// Without `ack` the frame is fire-and-forget. With `ack`, the callback
    /// runs at most once, with the server's acknowledgment arguments, or never
    /// if no acknowledgment arrives. Returns the acknowledgment id.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::TransportNotOpen`] unless the transport is
    /// open.
    pub fn send(&self, channel: &str, payload: Value, ack: Option<AckCallback>) -> Result<Option<u64>> {
        let link = self.shared.link.lock();
        let sender = match &link.sender {
            Some(sender) if self.is_open() => sender,
            _ => return Err(ClientError::TransportNotOpen),
        };

        let id = ack
            .as_ref()
            .map(|_| self.shared.next_ack_id.fetch_add(1, Ordering::Relaxed));
        let packet = match id {
            Some(id) => SocketPacket::event_with_ack(channel, payload, id),
            None => SocketPacket::event(channel, payload),
        };
        let frame = EnginePacket::Message(packet).encode()?;

        if let (Some(id), Some(callback)) = (id, ack) {
            self.shared.pending.lock().insert(id, callback);
        }
        if sender.send(Outbound::Frame(frame)).is_err() {
            if let Some(id) = id {
                self.shared.pending.lock().remove(&id);
            }
            return Err(ClientError::ConnectionClosed);
        }
        Ok(id)
    }

    /// Forget the pending acknowledgment `id`; a later ack is ignored.
    pub fn cancel_ack(&self, id: u64) -> bool {
        self.shared.pending.lock().remove(&id).is_some()
    }

    /// Number of acknowledgments still awaited.
    pub fn pending_acks(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Register a raw handler for `event`. Several handlers may coexist.
    pub fn on(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.shared.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove handler `id` from `event`.
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.shared.handlers.write();
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Number of raw handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.shared.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Observe lifecycle signals. Hooks run on the transport task (or the
    /// caller of [`close`](Self::close)) and must not block.
    pub fn on_lifecycle(&self, hook: LifecycleHook) {
        self.shared.hooks.write().push(hook);
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("url", &self.url)
            .field("status", &self.current_status())
            .field("pending_acks", &self.pending_acks())
            .finish_non_exhaustive()
    }
}

enum SessionEnd {
    /// Closed by [`TransportHandle::close`].
    Shutdown,
    /// Closed by the server.
    Closed,
    /// The connection broke.
    Failed(String),
}

/// Background task driving one open attempt and the session that follows.
async fn run_session(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    url: String,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    generation: u64,
) {
    let established = tokio::select! {
        result = establish(connector.as_ref(), &url) => result,
        _ = rx.recv() => {
            debug!(url = %url, "Open attempt cancelled");
            return;
        }
    };

    let (mut transport, handshake) = match established {
        Ok(established) => established,
        Err(e) => {
            warn!(url = %url, error = %e, "Transport failed to open");
            let reason = match e {
                ClientError::Transport(reason) => reason,
                other => other.to_string(),
            };
            shared.settle(
                generation,
                TransportStatus::Failed(reason.clone()),
                &[TransportSignal::Error(reason)],
            );
            return;
        }
    };

    if !shared.mark_open(generation) {
        let _ = transport.close().await;
        return;
    }
    info!(url = %url, sid = %handshake.sid, "Transport open");

    let end = drive(&shared, transport.as_mut(), &mut rx, &handshake).await;
    if let Err(e) = transport.close().await {
        debug!(error = %e, "Transport close failed");
    }

    match end {
        SessionEnd::Shutdown => debug!(url = %url, "Session shut down"),
        SessionEnd::Closed => {
            info!(url = %url, "Transport closed by server");
            shared.settle(generation, TransportStatus::Closed, &[TransportSignal::Close]);
        }
        SessionEnd::Failed(reason) => {
            warn!(url = %url, error = %reason, "Transport failed");
            shared.settle(
                generation,
                TransportStatus::Failed(reason.clone()),
                &[TransportSignal::Error(reason), TransportSignal::Close],
            );
        }
    }
}

/// Open the socket and complete the Engine.IO and Socket.IO handshakes.
async fn establish(
    connector: &dyn Connector,
    url: &str,
) -> Result<(Box<dyn Transport>, Handshake)> {
    let mut transport = connector.connect(url).await?;

    let handshake = match next_packet(transport.as_mut()).await? {
        EnginePacket::Open(handshake) => handshake,
        other => {
            return Err(ClientError::Transport(format!(
                "expected open packet, got {other:?}"
            )))
        }
    };

    transport
        .send(EnginePacket::Message(SocketPacket::connect()).encode()?)
        .await?;

    loop {
        match next_packet(transport.as_mut()).await? {
            EnginePacket::Message(SocketPacket::Connect { .. }) => break,
            EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                let reason = data
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| data.to_string(), str::to_string);
                return Err(ClientError::Transport(format!(
                    "namespace connect refused: {reason}"
                )));
            }
            EnginePacket::Ping(data) => {
                transport.send(EnginePacket::Pong(data).encode()?).await?;
            }
            EnginePacket::Close => {
                return Err(ClientError::Transport("closed during handshake".into()));
            }
            other => debug!(packet = ?other, "Ignoring packet during handshake"),
        }
    }

    Ok((transport, handshake))
}

async fn next_packet(transport: &mut dyn Transport) -> Result<EnginePacket> {
    match transport.recv().await {
        Some(Ok(frame)) => Ok(EnginePacket::decode(&frame)?),
        Some(Err(e)) => Err(e),
        None => Err(ClientError::Transport(
            "connection closed during handshake".into(),
        )),
    }
}

/// Multiplex outbound frames, inbound frames and the keep-alive deadline.
async fn drive(
    shared: &Shared,
    transport: &mut dyn Transport,
    rx: &mut mpsc::UnboundedReceiver<Outbound>,
    handshake: &Handshake,
) -> SessionEnd {
    let keepalive = Duration::from_millis(
        handshake
            .ping_interval
            .saturating_add(handshake.ping_timeout),
    );
    let mut deadline = Instant::now() + keepalive;

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = transport.send(frame).await {
                        return SessionEnd::Failed(e.to_string());
                    }
                }
                Some(Outbound::Shutdown) | None => {
                    let goodbye = SocketPacket::Disconnect {
                        namespace: DEFAULT_NAMESPACE.to_string(),
                    };
                    if let Ok(frame) = EnginePacket::Message(goodbye).encode() {
                        let _ = transport.send(frame).await;
                    }
                    return SessionEnd::Shutdown;
                }
            },
            incoming = transport.recv() => match incoming {
                Some(Ok(frame)) => {
                    deadline = Instant::now() + keepalive;
                    match handle_frame(shared, &frame) {
                        FrameAction::Continue => {}
                        FrameAction::Reply(reply) => {
                            if let Err(e) = transport.send(reply).await {
                                return SessionEnd::Failed(e.to_string());
                            }
                        }
                        FrameAction::End(end) => return end,
                    }
                }
                Some(Err(e)) => return SessionEnd::Failed(e.to_string()),
                None => return SessionEnd::Closed,
            },
            () = tokio::time::sleep_until(deadline) => {
                return SessionEnd::Failed("ping timeout".into());
            }
        }
    }
}

enum FrameAction {
    Continue,
    Reply(String),
    End(SessionEnd),
}

fn handle_frame(shared: &Shared, frame: &str) -> FrameAction {
    let packet = match EnginePacket::decode(frame) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable frame");
            return FrameAction::Continue;
        }
    };

    match packet {
        EnginePacket::Ping(data) => match EnginePacket::Pong(data).encode() {
            Ok(pong) => FrameAction::Reply(pong),
            Err(_) => FrameAction::Continue,
        },
        EnginePacket::Close => FrameAction::End(SessionEnd::Closed),
        EnginePacket::Message(packet) if packet.namespace() != DEFAULT_NAMESPACE => {
            debug!(namespace = %packet.namespace(), "Ignoring packet for other namespace");
            FrameAction::Continue
        }
        EnginePacket::Message(SocketPacket::Event {
            id, event, args, ..
        }) => {
            let ack = id.and_then(|id| {
                shared.outbound().map(|outbound| Acknowledger {
                    id,
                    outbound,
                    sent: Arc::new(AtomicBool::new(false)),
                })
            });
            shared.dispatch(&InboundEvent { event, args, ack });
            FrameAction::Continue
        }
        EnginePacket::Message(SocketPacket::Ack { id, args, .. }) => {
            shared.resolve_ack(id, args);
            FrameAction::Continue
        }
        EnginePacket::Message(SocketPacket::Disconnect { .. }) => {
            FrameAction::End(SessionEnd::Closed)
        }
        EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
            FrameAction::End(SessionEnd::Failed(format!("server error: {data}")))
        }
        EnginePacket::Message(SocketPacket::Connect { .. })
        | EnginePacket::Open(_)
        | EnginePacket::Pong(_)
        | EnginePacket::Upgrade
        | EnginePacket::Noop => FrameAction::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryConnector, MemoryPeer};
    use serde_json::json;

    async fn open_pair() -> (TransportHandle, MemoryPeer) {
        let (connector, mut peers) = MemoryConnector::new();
        let handle = TransportHandle::new("ws://memory/socket.io/", Arc::new(connector));
        let mut status = handle.status();

        handle.open();
        let mut peer = peers.recv().await.unwrap();
        assert!(peer.accept().await);
        status.wait_for(TransportStatus::is_open).await.unwrap();
        (handle, peer)
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let (connector, mut peers) = MemoryConnector::new();
        let handle = TransportHandle::new("ws://memory", Arc::new(connector));

        handle.open();
        handle.open();
        assert!(handle.current_status().is_opening());

        let _peer = peers.recv().await.unwrap();
        assert!(peers.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_requires_open() {
        let (connector, _peers) = MemoryConnector::new();
        let handle = TransportHandle::new("ws://memory", Arc::new(connector));

        let err = handle.send("join", json!({}), None).unwrap_err();
        assert!(matches!(err, ClientError::TransportNotOpen));
    }

    #[tokio::test]
    async fn test_ack_callback_runs_once() {
        let (handle, mut peer) = open_pair().await;
        let (tx, rx) = tokio::sync::oneshot::channel();

        let id = handle
            .send(
                "join",
                json!({"room": "r1"}),
                Some(Box::new(move |args| {
                    let _ = tx.send(args);
                })),
            )
            .unwrap()
            .unwrap();
        assert_eq!(handle.pending_acks(), 1);

        let (ack_id, channel, payload) = peer.expect_event().await.unwrap();
        assert_eq!(ack_id, Some(id));
        assert_eq!(channel, "join");
        assert_eq!(payload, json!({"room": "r1"}));

        peer.ack(id, json!({"success": true}));
        peer.ack(id, json!({"success": false}));
        assert_eq!(rx.await.unwrap(), vec![json!({"success": true})]);
        assert_eq!(handle.pending_acks(), 0);
    }

    #[tokio::test]
    async fn test_inbound_events_reach_all_raw_handlers() {
        let (handle, peer) = open_pair().await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        for tag in ["a", "b"] {
            let tx = tx.clone();
            handle.on(
                "status",
                Arc::new(move |event: &InboundEvent| {
                    let _ = tx.send((tag, event.payload().clone()));
                }),
            );
        }
        assert_eq!(handle.handler_count("status"), 2);

        peer.emit("status", json!({"isOnline": true, "user": "bob"}));
        let mut tags = vec![rx.recv().await.unwrap().0, rx.recv().await.unwrap().0];
        tags.sort_unstable();
        assert_eq!(tags, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_off_removes_handler() {
        let (connector, _peers) = MemoryConnector::new();
        let handle = TransportHandle::new("ws://memory", Arc::new(connector));

        let id = handle.on("status", Arc::new(|_: &InboundEvent| {}));
        assert!(handle.off("status", id));
        assert!(!handle.off("status", id));
        assert_eq!(handle.handler_count("status"), 0);
    }

    #[tokio::test]
    async fn test_acknowledger_sends_once() {
        let (handle, mut peer) = open_pair().await;
        handle.on(
            "receiveMessage",
            Arc::new(|event: &InboundEvent| {
                let ack = event.acknowledger().unwrap();
                assert!(ack.send(json!({"status": "delivered"})));
                assert!(!ack.clone().send(json!({"status": "delivered"})));
            }),
        );

        peer.emit_with_ack("receiveMessage", json!({"message": "hi", "sender": "bob"}), 9);
        match peer.recv_packet().await.unwrap() {
            SocketPacket::Ack { id, args, .. } => {
                assert_eq!(id, 9);
                assert_eq!(args, vec![json!({"status": "delivered"})]);
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_answers_server_ping() {
        let (_handle, mut peer) = open_pair().await;
        peer.send_frame("2");
        assert_eq!(peer.recv_frame().await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_close_drops_pending_and_signals() {
        let (handle, mut peer) = open_pair().await;
        let (signal_tx, mut signals) = mpsc::unbounded_channel();
        handle.on_lifecycle(Arc::new(move |signal: &TransportSignal| {
            let _ = signal_tx.send(signal.clone());
        }));

        let (tx, rx) = tokio::sync::oneshot::channel::<Vec<Value>>();
        handle
            .send(
                "join",
                json!({}),
                Some(Box::new(move |args| {
                    let _ = tx.send(args);
                })),
            )
            .unwrap();

        handle.close();
        assert_eq!(handle.pending_acks(), 0);
        assert!(rx.await.is_err());
        assert_eq!(signals.recv().await, Some(TransportSignal::Close));
        assert_eq!(handle.current_status(), TransportStatus::Closed);

        let _join = peer.recv_packet().await;
        assert!(matches!(
            peer.recv_packet().await,
            Some(SocketPacket::Disconnect { .. })
        ));
    }

    #[tokio::test]
    async fn test_server_close_reports_close() {
        let (handle, peer) = open_pair().await;
        let mut status = handle.status();

        peer.close();
        status
            .wait_for(|status| *status == TransportStatus::Closed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refused_namespace_fails_open() {
        let (connector, mut peers) = MemoryConnector::new();
        let handle = TransportHandle::new("ws://memory", Arc::new(connector));
        let mut status = handle.status();

        handle.open();
        let mut peer = peers.recv().await.unwrap();
        assert!(peer.refuse("Not authorized").await);

        let status = status
            .wait_for(|status| matches!(status, TransportStatus::Failed(_)))
            .await
            .unwrap()
            .clone();
        assert_eq!(
            status,
            TransportStatus::Failed("namespace connect refused: Not authorized".into())
        );
    }

    #[tokio::test]
    async fn test_ping_timeout_fails_session() {
        let (connector, mut peers) = MemoryConnector::new();
        let handle = TransportHandle::new("ws://memory", Arc::new(connector));
        let mut status = handle.status();

        handle.open();
        let mut peer = peers.recv().await.unwrap();
        assert!(
            peer.accept_with(Handshake {
                sid: "s1".into(),
                upgrades: vec![],
                ping_interval: 20,
                ping_timeout: 20,
                max_payload: 0,
            })
            .await
        );

        let status = status
            .wait_for(|status| matches!(status, TransportStatus::Failed(_)))
            .await
            .unwrap()
            .clone();
        assert_eq!(status, TransportStatus::Failed("ping timeout".into()));
    }
}
