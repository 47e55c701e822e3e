//! WebSocket transport over `tokio-tungstenite`.

use super::{Connector, Transport};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections (`ws://` or `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(format!("websocket connect: {e}")))?;
        debug!(url = %url, status = %response.status(), "WebSocket connected");
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

/// A connected WebSocket carrying text frames.
pub struct WebSocketTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| ClientError::Transport(format!("websocket send: {e}")))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket close received");
                    return None;
                }
                Ok(Message::Binary(data)) => {
                    debug!(len = data.len(), "Binary frame ignored");
                }
                // tungstenite answers pings itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => {
                    return Some(Err(ClientError::Transport(format!(
                        "websocket receive: {e}"
                    ))))
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::Transport(format!("websocket close: {e}")))
    }
}
