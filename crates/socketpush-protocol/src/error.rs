//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is malformed.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The leading packet type is not one this crate understands.
    #[error("unknown packet type: {0:?}")]
    UnknownPacketType(char),

    /// Binary event/ack packets are not supported on this transport.
    #[error("binary packets are not supported")]
    UnsupportedBinary,

    /// A frequency string did not match `<count><s|m|h|d|w>`.
    #[error("invalid frequency: {0}")]
    InvalidFrequency(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
