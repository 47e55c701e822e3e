//! Listener registry: at most one binding per channel key.

use crate::transport::{EventHandler, HandlerId, InboundEvent, TransportHandle};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use socketpush_protocol::{
    channel, CustomEvent, DeliveryConfirmation, DeliveryReceipt, IncomingMessage, OnlineUsers,
    StatusUpdate,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Logical inbound channel a listener is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// Incoming chat messages (`receiveMessage`).
    Message,
    /// Presence changes (`status`).
    Status,
    /// Online-users lists (`onlineUsers`).
    OnlineUsers,
    /// Delivery receipts (`delivery-receipt`).
    DeliveryReceipt,
    /// Any other named event.
    Event(String),
}

impl ChannelKey {
    /// Key for the channel called `name`.
    ///
    /// Names of the built-in channels map to their dedicated key, so
    /// `ChannelKey::event("status") == ChannelKey::Status`.
    pub fn event(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            channel::RECEIVE_MESSAGE => ChannelKey::Message,
            channel::STATUS => ChannelKey::Status,
            channel::ONLINE_USERS => ChannelKey::OnlineUsers,
            channel::DELIVERY_RECEIPT => ChannelKey::DeliveryReceipt,
            _ => ChannelKey::Event(name),
        }
    }

    /// Event name on the wire.
    pub fn wire_name(&self) -> &str {
        match self {
            ChannelKey::Message => channel::RECEIVE_MESSAGE,
            ChannelKey::Status => channel::STATUS,
            ChannelKey::OnlineUsers => channel::ONLINE_USERS,
            ChannelKey::DeliveryReceipt => channel::DELIVERY_RECEIPT,
            ChannelKey::Event(name) => name,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

struct Binding {
    handler: HandlerId,
    active: Arc<AtomicBool>,
}

impl Binding {
    fn detach(self, transport: &TransportHandle, key: &ChannelKey) {
        self.active.store(false, Ordering::Release);
        transport.off(key.wire_name(), self.handler);
    }
}

/// Tracks which callback is bound to each [`ChannelKey`].
///
/// Binding a key replaces the previous callback; once replaced or unbound a
/// callback never runs again, even for events already being dispatched.
pub struct ListenerRegistry {
    transport: Arc<TransportHandle>,
    bindings: Mutex<HashMap<ChannelKey, Binding>>,
}

impl ListenerRegistry {
    /// Create an empty registry over `transport`.
    pub fn new(transport: Arc<TransportHandle>) -> Self {
        Self {
            transport,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Bind a raw handler to `key`, replacing any previous binding.
    pub fn bind(&self, key: ChannelKey, handler: impl Fn(&InboundEvent) + Send + Sync + 'static) {
        let active = Arc::new(AtomicBool::new(true));
        let guard = Arc::clone(&active);
        let handler: EventHandler = Arc::new(move |event: &InboundEvent| {
            if guard.load(Ordering::Acquire) {
                handler(event);
            }
        });

        let mut bindings = self.bindings.lock();
        if let Some(previous) = bindings.remove(&key) {
            previous.detach(&self.transport, &key);
            debug!(channel = %key, "Replaced listener");
        }
        let id = self.transport.on(key.wire_name(), handler);
        bindings.insert(
            key,
            Binding {
                handler: id,
                active,
            },
        );
    }

    /// Remove the binding for `key`. Returns whether one existed.
    pub fn unbind(&self, key: &ChannelKey) -> bool {
        let removed = self.bindings.lock().remove(key);
        match removed {
            Some(binding) => {
                binding.detach(&self.transport, key);
                true
            }
            None => false,
        }
    }

    /// Remove every binding.
    pub fn unbind_all(&self) {
        let drained: Vec<(ChannelKey, Binding)> = self.bindings.lock().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Unbinding all listeners");
        }
        for (key, binding) in drained {
            binding.detach(&self.transport, &key);
        }
    }

    /// Whether `key` has a binding.
    pub fn is_bound(&self, key: &ChannelKey) -> bool {
        self.bindings.lock().contains_key(key)
    }

    /// Number of bound keys.
    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.lock().is_empty()
    }

    fn bind_typed<T, F>(&self, key: ChannelKey, callback: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let deliver = typed(callback);
        self.bind(key, move |event: &InboundEvent| {
            deliver(event);
        });
    }

    /// Bind presence changes.
    pub fn bind_status(&self, callback: impl Fn(StatusUpdate) + Send + Sync + 'static) {
        self.bind_typed(ChannelKey::Status, callback);
    }

    /// Bind online-users lists.
    pub fn bind_online_users(&self, callback: impl Fn(OnlineUsers) + Send + Sync + 'static) {
        self.bind_typed(ChannelKey::OnlineUsers, callback);
    }

    /// Bind delivery receipts.
    pub fn bind_delivery_receipt(
        &self,
        callback: impl Fn(DeliveryReceipt) + Send + Sync + 'static,
    ) {
        self.bind_typed(ChannelKey::DeliveryReceipt, callback);
    }

    /// Bind incoming messages.
    ///
    /// When the server asks for it, delivery is acknowledged after
    /// `callback` returns.
    pub fn bind_message(&self, callback: impl Fn(IncomingMessage) + Send + Sync + 'static) {
        let deliver = typed(callback);
        self.bind(ChannelKey::Message, move |event: &InboundEvent| {
            if !deliver(event) {
                return;
            }
            let Some(ack) = event.acknowledger() else {
                return;
            };
            match serde_json::to_value(DeliveryConfirmation::delivered()) {
                Ok(confirmation) => {
                    if !ack.send(confirmation) {
                        warn!(ack_id = ack.id(), "Failed to acknowledge message delivery");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode delivery confirmation"),
            }
        });
    }

    /// Bind an application-defined event.
    ///
    /// A payload without a `payload` field is passed through whole.
    pub fn bind_event(
        &self,
        name: impl Into<String>,
        callback: impl Fn(CustomEvent) + Send + Sync + 'static,
    ) {
        self.bind(ChannelKey::event(name), move |event: &InboundEvent| {
            callback(custom_event(event.payload()));
        });
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.bindings.lock().keys().map(ToString::to_string).collect();
        f.debug_struct("ListenerRegistry")
            .field("bindings", &keys)
            .finish_non_exhaustive()
    }
}

/// Decode the payload as `T` and pass it on. Returns whether `callback` ran.
fn typed<T, F>(callback: F) -> impl Fn(&InboundEvent) -> bool + Send + Sync + 'static
where
    T: DeserializeOwned,
    F: Fn(T) + Send + Sync + 'static,
{
    move |event: &InboundEvent| match serde_json::from_value::<T>(event.payload().clone()) {
        Ok(value) => {
            callback(value);
            true
        }
        Err(e) => {
            warn!(channel = %event.event, error = %e, "Dropping undecodable payload");
            false
        }
    }
}

fn custom_event(payload: &Value) -> CustomEvent {
    if payload.get("payload").is_some() {
        if let Ok(event) = serde_json::from_value(payload.clone()) {
            return event;
        }
    }
    CustomEvent {
        payload: payload.clone(),
        is_room: false,
    }
}
