//! Command façade.

use crate::broker::AckBroker;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::registry::{ChannelKey, ListenerRegistry};
use crate::state::{ConnectionState, StateMachine};
use crate::transport::{
    Connector, TransportHandle, TransportSignal, TransportStatus, WebSocketConnector,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use socketpush_protocol::{
    channel, AckResponse, CustomEvent, DeliveryReceipt, EventRequest, IncomingMessage,
    MessageRequest, OnlineUsers, OnlineUsersQuery, RegisterRequest, RoomEventRequest, RoomRequest,
    Schedule, StatusUpdate,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Who this client registers as.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Display name within the app scope.
    pub alias: String,
    /// App scope overriding the configured one.
    pub app_uuid: Option<String>,
    /// Push token obtained out of band.
    pub token: Option<String>,
    /// Free-form metadata forwarded to the server.
    pub metadata: Option<Value>,
}

impl Identity {
    /// Identity for `alias` in the configured app scope.
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            app_uuid: None,
            token: None,
            metadata: None,
        }
    }

    /// Register in `app_uuid` instead of the configured scope.
    #[must_use]
    pub fn with_app(mut self, app_uuid: impl Into<String>) -> Self {
        self.app_uuid = Some(app_uuid.into());
        self
    }

    /// Attach a push token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A chat message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Message text, or ciphertext when `encrypted`.
    pub text: String,
    /// Whether `text` is ciphertext.
    pub encrypted: bool,
    /// Target room.
    pub room: Option<String>,
    /// Target alias.
    pub alias: Option<String>,
    /// Caller-chosen id; generated when absent.
    pub client_msg_id: Option<String>,
}

impl OutgoingMessage {
    /// Plain-text message with no target yet.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            encrypted: false,
            room: None,
            alias: None,
            client_msg_id: None,
        }
    }

    /// Send to `room`.
    #[must_use]
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Send to `alias`.
    #[must_use]
    pub fn for_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Mark the text as ciphertext.
    #[must_use]
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Use `id` as the client message id.
    #[must_use]
    pub fn with_client_msg_id(mut self, id: impl Into<String>) -> Self {
        self.client_msg_id = Some(id.into());
        self
    }
}

/// Client for one SocketPush server.
///
/// Owns a single logical connection. Commands require
/// [`ConnectionState::Connected`] and fail fast with
/// [`ClientError::NotConnected`] otherwise; listeners can be bound at any
/// time and stay bound until [`disconnect`](Self::disconnect).
///
/// # Example
///
/// ```no_run
/// use socketpush_client::{ClientConfig, Identity, SocketPush};
///
/// # async fn run() -> socketpush_client::Result<()> {
/// let client = SocketPush::new(ClientConfig::new("http://localhost:8000", "app1"))?;
/// client.on_status(|update| println!("{} online: {}", update.user, update.is_online));
/// client.connect(Identity::new("alice")).await?;
/// client.join("lobby").await?;
/// # Ok(())
/// # }
/// ```
pub struct SocketPush {
    config: ClientConfig,
    transport: Arc<TransportHandle>,
    broker: AckBroker,
    registry: ListenerRegistry,
    state: Arc<StateMachine>,
    app_uuid: RwLock<String>,
    /// Serializes starting and abandoning connect attempts with `disconnect`.
    lifecycle: Mutex<()>,
}

impl SocketPush {
    /// Create a client connecting over WebSocket.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    /// Create a client whose connections are opened by `connector`.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(TransportHandle::new(config.socket_url()?, connector));
        let state = Arc::new(StateMachine::new());

        let observed = Arc::downgrade(&state);
        transport.on_lifecycle(Arc::new(move |signal: &TransportSignal| {
            let Some(state) = observed.upgrade() else {
                return;
            };
            match signal {
                TransportSignal::Open => {}
                TransportSignal::Close => {
                    state.transport_closed(None);
                }
                TransportSignal::Error(reason) => {
                    state.transport_closed(Some(reason));
                }
            }
        }));

        Ok(Self {
            broker: AckBroker::new(Arc::clone(&transport), config.ack_timeout()),
            registry: ListenerRegistry::new(Arc::clone(&transport)),
            app_uuid: RwLock::new(config.app_uuid.clone()),
            lifecycle: Mutex::new(()),
            config,
            transport,
            state,
        })
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Whether commands may be issued.
    pub fn is_connected(&self) -> bool {
        self.state.current().is_connected()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Most recent connection-level error.
    pub fn last_error(&self) -> Option<String> {
        self.state.last_error()
    }

    /// App scope used by commands.
    pub fn app_uuid(&self) -> String {
        self.app_uuid.read().clone()
    }

    /// Open the connection and register `identity`.
    ///
    /// Resolves once the server acknowledged the registration, at which point
    /// the state is [`ConnectionState::Connected`]. On any failure the
    /// transport is closed and the state becomes [`ConnectionState::Error`],
    /// unless [`disconnect`](Self::disconnect) or a newer `connect` took over
    /// meanwhile, in which case the attempt just reports its error.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidState`] while already connecting or connected.
    /// - [`ClientError::ConnectTimeout`] if the transport did not open in time.
    /// - [`ClientError::Transport`] if the connection was refused or broke.
    /// - [`ClientError::ConnectionClosed`] if the attempt was torn down
    ///   before it completed.
    /// - [`ClientError::Timeout`] / [`ClientError::ServerRejected`] for the
    ///   registration itself.
    pub async fn connect(&self, identity: Identity) -> Result<AckResponse> {
        if identity.alias.trim().is_empty() {
            return Err(ClientError::InvalidInput("alias must not be empty".into()));
        }

        let (epoch, status) = {
            let _lifecycle = self.lifecycle.lock();
            let epoch = match self.state.begin_connect() {
                Ok(epoch) => epoch,
                Err(e) => {
                    warn!(alias = %identity.alias, error = %e, "Connect ignored");
                    return Err(e);
                }
            };
            let status = self.transport.status();
            self.transport.open();
            (epoch, status)
        };

        let app_uuid = identity
            .app_uuid
            .clone()
            .unwrap_or_else(|| self.config.app_uuid.clone());
        info!(alias = %identity.alias, app_uuid = %app_uuid, url = %self.transport.url(), "Connecting");

        let result = self.register(epoch, status, identity, app_uuid).await;
        match result {
            Ok(response) if self.state.finish_connect(epoch, || self.transport.is_open()) => {
                info!("Connected");
                if self.registry.is_bound(&ChannelKey::OnlineUsers) {
                    if let Err(e) = self.get_online_users() {
                        debug!(error = %e, "Online users snapshot not requested");
                    }
                }
                Ok(response)
            }
            Ok(_) => {
                self.abandon(epoch, "connection closed during registration");
                Err(ClientError::ConnectionClosed)
            }
            Err(e) => {
                warn!(error = %e, "Connect failed");
                self.abandon(epoch, e.to_string());
                Err(e)
            }
        }
    }

    async fn register(
        &self,
        epoch: u64,
        mut status: watch::Receiver<TransportStatus>,
        identity: Identity,
        app_uuid: String,
    ) -> Result<AckResponse> {
        let timeout = self.config.connect_timeout();
        let opened = match tokio::time::timeout(timeout, status.wait_for(|s| !s.is_opening())).await
        {
            Ok(Ok(status)) => status.clone(),
            Ok(Err(_)) => TransportStatus::Closed,
            Err(_) => {
                return Err(ClientError::ConnectTimeout {
                    timeout_ms: self.config.connect_timeout_ms,
                })
            }
        };
        match opened {
            TransportStatus::Open => {}
            TransportStatus::Failed(reason) => return Err(ClientError::Transport(reason)),
            TransportStatus::Closed | TransportStatus::Opening => {
                return Err(ClientError::ConnectionClosed)
            }
        }
        // The transport may already belong to a newer attempt.
        if !self.state.is_current(epoch) {
            return Err(ClientError::ConnectionClosed);
        }

        *self.app_uuid.write() = app_uuid.clone();
        let request = RegisterRequest {
            app_uuid,
            alias: identity.alias,
            token: identity.token,
            metadata: identity.metadata,
        };
        self.broker.call(channel::REGISTER, &request, None).await
    }

    /// Tear down attempt `epoch` and record `reason`, unless a `disconnect`
    /// or a newer attempt superseded it.
    fn abandon(&self, epoch: u64, reason: impl Into<String>) {
        let _lifecycle = self.lifecycle.lock();
        if !self.state.is_current(epoch) {
            debug!(epoch, "Superseded connect attempt left alone");
            return;
        }
        self.transport.close();
        self.state.fail(epoch, reason);
    }

    /// Close the connection, unbind every listener and drop pending requests.
    pub fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.registry.unbind_all();
        self.transport.close();
        self.state.reset();
        info!("Disconnected");
    }

    fn ensure_connected(&self, command: &str) -> Result<()> {
        let state = self.state.current();
        if state.is_connected() {
            Ok(())
        } else {
            debug!(command = %command, state = %state, "Command rejected");
            Err(ClientError::NotConnected { state })
        }
    }

    /// Send `event` with `payload` to `alias`.
    pub async fn trigger(&self, event: &str, alias: &str, payload: Value) -> Result<AckResponse> {
        self.send_event(event, alias, payload, None).await
    }

    /// Like [`trigger`](Self::trigger), delivered according to `schedule`.
    pub async fn trigger_scheduled(
        &self,
        event: &str,
        alias: &str,
        payload: Value,
        schedule: &Schedule,
    ) -> Result<AckResponse> {
        self.send_event(event, alias, payload, Some(schedule)).await
    }

    async fn send_event(
        &self,
        event: &str,
        alias: &str,
        mut payload: Value,
        schedule: Option<&Schedule>,
    ) -> Result<AckResponse> {
        self.ensure_connected(channel::EVENT)?;
        require("event", event)?;
        require("alias", alias)?;
        if let Some(schedule) = schedule {
            schedule.apply_to(&mut payload)?;
        }

        let request = EventRequest {
            event: event.to_string(),
            alias: alias.to_string(),
            payload,
            app_uuid: self.app_uuid(),
        };
        debug!(event = %event, alias = %alias, "Triggering event");
        self.broker.call(channel::EVENT, &request, None).await
    }

    /// Send `event` with `payload` to every member of `room`.
    pub async fn trigger_room(&self, event: &str, room: &str, payload: Value) -> Result<AckResponse> {
        self.send_room_event(event, room, payload, None).await
    }

    /// Like [`trigger_room`](Self::trigger_room), delivered according to
    /// `schedule`.
    pub async fn trigger_room_scheduled(
        &self,
        event: &str,
        room: &str,
        payload: Value,
        schedule: &Schedule,
    ) -> Result<AckResponse> {
        self.send_room_event(event, room, payload, Some(schedule)).await
    }

    async fn send_room_event(
        &self,
        event: &str,
        room: &str,
        mut payload: Value,
        schedule: Option<&Schedule>,
    ) -> Result<AckResponse> {
        self.ensure_connected(channel::ROOM_EVENTS)?;
        require("event", event)?;
        require("room", room)?;
        if let Some(schedule) = schedule {
            schedule.apply_to(&mut payload)?;
        }

        let request = RoomEventRequest {
            event: event.to_string(),
            room: room.to_string(),
            payload,
            app_uuid: self.app_uuid(),
        };
        debug!(event = %event, room = %room, "Triggering room event");
        self.broker.call(channel::ROOM_EVENTS, &request, None).await
    }

    /// Join `room`.
    pub async fn join(&self, room: &str) -> Result<AckResponse> {
        self.room_request(channel::JOIN, room).await
    }

    /// Leave `room`.
    pub async fn leave(&self, room: &str) -> Result<AckResponse> {
        self.room_request(channel::LEAVE, room).await
    }

    async fn room_request(&self, command: &'static str, room: &str) -> Result<AckResponse> {
        self.ensure_connected(command)?;
        require("room", room)?;
        let request = RoomRequest {
            room: room.to_string(),
            app_uuid: self.app_uuid(),
        };
        let response = self.broker.call(command, &request, None).await?;
        info!(room = %room, command = %command, "Room membership updated");
        Ok(response)
    }

    /// Send a chat message and return its client message id.
    ///
    /// The id is echoed back in delivery receipts for this message.
    pub async fn message(&self, message: OutgoingMessage) -> Result<String> {
        self.ensure_connected(channel::MESSAGE)?;
        if message.room.is_none() && message.alias.is_none() {
            return Err(ClientError::InvalidInput(
                "message needs a room or an alias".into(),
            ));
        }

        let client_msg_id = message
            .client_msg_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let request = MessageRequest {
            message: message.text,
            encrypted: message.encrypted,
            room: message.room,
            alias: message.alias,
            app_uuid: self.app_uuid(),
            client_msg_id: Some(client_msg_id.clone()),
        };
        self.broker.call(channel::MESSAGE, &request, None).await?;
        debug!(client_msg_id = %client_msg_id, "Message accepted");
        Ok(client_msg_id)
    }

    /// Ask for a snapshot of online users.
    ///
    /// The answer arrives on the [`on_online_users`](Self::on_online_users)
    /// listener.
    pub fn get_online_users(&self) -> Result<()> {
        self.ensure_connected(channel::GET_ONLINE_USERS)?;
        self.broker.notify(
            channel::GET_ONLINE_USERS,
            &OnlineUsersQuery {
                app_uuid: self.app_uuid(),
            },
        )
    }

    /// Listen for presence changes.
    pub fn on_status(&self, callback: impl Fn(StatusUpdate) + Send + Sync + 'static) {
        self.registry.bind_status(callback);
    }

    /// Listen for online-users lists.
    ///
    /// A snapshot is requested right away when connected, or as soon as the
    /// next `connect` succeeds.
    pub fn on_online_users(&self, callback: impl Fn(OnlineUsers) + Send + Sync + 'static) {
        self.registry.bind_online_users(callback);
        if self.is_connected() {
            if let Err(e) = self.get_online_users() {
                debug!(error = %e, "Online users snapshot not requested");
            }
        }
    }

    /// Listen for incoming messages. Delivery is acknowledged to the server
    /// after `callback` returns.
    pub fn on_message(&self, callback: impl Fn(IncomingMessage) + Send + Sync + 'static) {
        self.registry.bind_message(callback);
    }

    /// Listen for delivery receipts of sent messages.
    pub fn on_delivery_receipt(&self, callback: impl Fn(DeliveryReceipt) + Send + Sync + 'static) {
        self.registry.bind_delivery_receipt(callback);
    }

    /// Listen for the application event `name`.
    pub fn on_event(
        &self,
        name: impl Into<String>,
        callback: impl Fn(CustomEvent) + Send + Sync + 'static,
    ) {
        self.registry.bind_event(name, callback);
    }

    /// Stop listening on `key`.
    pub fn off(&self, key: &ChannelKey) -> bool {
        self.registry.unbind(key)
    }

    /// Whether a listener is bound to `key`.
    pub fn is_listening(&self, key: &ChannelKey) -> bool {
        self.registry.is_bound(key)
    }
}

impl Drop for SocketPush {
    fn drop(&mut self) {
        self.registry.unbind_all();
        self.transport.close();
    }
}

impl std::fmt::Debug for SocketPush {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketPush")
            .field("endpoint", &self.config.endpoint)
            .field("app_uuid", &self.app_uuid())
            .field("state", &self.state())
            .field("listeners", &self.registry)
            .finish_non_exhaustive()
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(ClientError::InvalidInput(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}
