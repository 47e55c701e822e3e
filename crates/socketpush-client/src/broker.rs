//! Request/acknowledgment correlation.

use crate::config::duration_millis;
use crate::error::{ClientError, Result};
use crate::transport::TransportHandle;
use serde::Serialize;
use socketpush_protocol::AckResponse;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Turns a send-with-callback into a single-resolution future.
///
/// Every [`call`](AckBroker::call) settles exactly once: with the server's
/// acknowledgment, with a timeout, or with [`ClientError::ConnectionClosed`]
/// when the transport goes away first.
#[derive(Debug, Clone)]
pub struct AckBroker {
    transport: Arc<TransportHandle>,
    default_timeout: Duration,
}

impl AckBroker {
    /// Create a broker over `transport`.
    pub fn new(transport: Arc<TransportHandle>, default_timeout: Duration) -> Self {
        Self {
            transport,
            default_timeout,
        }
    }

    /// Timeout used when a call does not supply its own.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send `payload` on `channel` and wait for the acknowledgment.
    ///
    /// # Errors
    ///
    /// - [`ClientError::TransportNotOpen`] if nothing could be sent.
    /// - [`ClientError::Timeout`] if no acknowledgment arrived in time.
    /// - [`ClientError::ServerRejected`] if the server answered `success: false`.
    /// - [`ClientError::ConnectionClosed`] if the connection was torn down first.
    pub async fn call<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        payload: &T,
        timeout: Option<Duration>,
    ) -> Result<AckResponse> {
        if !self.transport.is_open() {
            return Err(ClientError::TransportNotOpen);
        }

        let payload = serde_json::to_value(payload)?;
        let timeout = timeout.unwrap_or(self.default_timeout);
        let (tx, rx) = oneshot::channel();

        let id = self
            .transport
            .send(
                channel,
                payload,
                Some(Box::new(move |args| {
                    let _ = tx.send(AckResponse::from_args(&args));
                })),
            )?
            .ok_or(ClientError::ConnectionClosed)?;

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                debug!(channel = %channel, ack_id = id, "Acknowledgment dropped");
                return Err(ClientError::ConnectionClosed);
            }
            Err(_) => {
                self.transport.cancel_ack(id);
                let timeout_ms = duration_millis(timeout);
                warn!(
                    channel = %channel,
                    ack_id = id,
                    timeout_ms,
                    "Acknowledgment timed out"
                );
                return Err(ClientError::Timeout {
                    channel: channel.to_string(),
                    timeout_ms,
                });
            }
        };

        if response.success {
            Ok(response)
        } else {
            let message = response
                .message
                .unwrap_or_else(|| "request rejected".to_string());
            debug!(channel = %channel, message = %message, "Request rejected by server");
            Err(ClientError::ServerRejected {
                channel: channel.to_string(),
                message,
            })
        }
    }

    /// Send `payload` on `channel` without waiting for anything.
    pub fn notify<T: Serialize + ?Sized>(&self, channel: &str, payload: &T) -> Result<()> {
        let payload = serde_json::to_value(payload)?;
        self.transport.send(channel, payload, None)?;
        Ok(())
    }
}
