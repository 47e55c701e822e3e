//! Error types for the client.

use crate::state::ConnectionState;
use socketpush_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur in client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The socket could not be opened or failed while open.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport is not open, so nothing was sent.
    #[error("transport is not open")]
    TransportNotOpen,

    /// The connection closed before the request settled.
    #[error("connection closed")]
    ConnectionClosed,

    /// No acknowledgment arrived within the time budget.
    #[error("no acknowledgment on '{channel}' within {timeout_ms}ms")]
    Timeout {
        /// Channel the request was sent on.
        channel: String,
        /// Budget that elapsed.
        timeout_ms: u64,
    },

    /// The transport did not open within the connect timeout.
    #[error("transport did not open within {timeout_ms}ms")]
    ConnectTimeout {
        /// Budget that elapsed.
        timeout_ms: u64,
    },

    /// The server acknowledged with an explicit failure.
    #[error("server rejected '{channel}': {message}")]
    ServerRejected {
        /// Channel the request was sent on.
        channel: String,
        /// Reason supplied by the server.
        message: String,
    },

    /// A command was issued while the connection is not established.
    #[error("not connected (state: {state})")]
    NotConnected {
        /// State at the time of the call.
        state: ConnectionState,
    },

    /// An operation is not allowed in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State at the time of the call.
        state: ConnectionState,
    },

    /// Caller-supplied input is unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Frame encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// HTTP request to the push API failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Broad class of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection-level failure; ends the current connection attempt.
    Transport,
    /// No acknowledgment in time; the connection itself is unaffected.
    Timeout,
    /// The server refused the request.
    ServerRejection,
    /// Caller error: wrong state or bad input.
    Precondition,
    /// Encoding, configuration or HTTP plumbing failure.
    Internal,
}

impl ClientError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_)
            | ClientError::TransportNotOpen
            | ClientError::ConnectionClosed => ErrorKind::Transport,
            ClientError::Timeout { .. } | ClientError::ConnectTimeout { .. } => ErrorKind::Timeout,
            ClientError::ServerRejected { .. } => ErrorKind::ServerRejection,
            ClientError::NotConnected { .. }
            | ClientError::InvalidState { .. }
            | ClientError::InvalidInput(_) => ErrorKind::Precondition,
            ClientError::Protocol(_)
            | ClientError::Serialization(_)
            | ClientError::Config(_)
            | ClientError::Http(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same command on the same connection may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::ServerRejection
        )
    }
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
