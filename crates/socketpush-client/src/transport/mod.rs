//! Socket transport.
//!
//! Two layers live here:
//!
//! - [`Transport`] / [`Connector`]: a bidirectional text-frame pipe and the
//!   factory that opens one. [`WebSocketConnector`] is the production
//!   implementation; [`MemoryConnector`] runs entirely in process.
//! - [`TransportHandle`]: owns one connection to the configured endpoint,
//!   speaks the Engine.IO/Socket.IO framing on top of a [`Transport`], tracks
//!   pending acknowledgments and dispatches inbound events to raw handlers.

mod handle;
pub mod memory;
mod websocket;

use crate::error::Result;
use async_trait::async_trait;

pub use handle::{
    AckCallback, Acknowledger, EventHandler, HandlerId, InboundEvent, LifecycleHook,
    TransportHandle, TransportSignal, TransportStatus,
};
pub use memory::{MemoryConnector, MemoryPeer};
pub use websocket::{WebSocketConnector, WebSocketTransport};

/// A bidirectional pipe of text frames.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Receive the next frame. `None` means the remote closed cleanly.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the pipe.
    async fn close(&mut self) -> Result<()>;
}

/// Opens [`Transport`]s to a URL.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}
