//! Transport seam for the notification channel
//!
//! The channel only needs "open a connection" and "next text frame"; the
//! websocket implementation lives here and tests plug in an in-memory one.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Transport errors
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Connection lost: {0}")]
    Lost(String),

    #[error("Channel was closed")]
    Closed,
}

/// Opens connections to the notification endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open duplex connection
#[async_trait]
pub trait Connection: Send {
    /// Next inbound text frame; `None` once the peer has closed
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection (best effort)
    async fn close(&mut self);
}

/// Websocket connector for a fixed `ws://` / `wss://` address
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // Binary frames carry the same JSON; invalid UTF-8 is dropped here
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => {
                        tracing::debug!("Dropping binary notification that is not UTF-8: {}", e);
                        continue;
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Lost(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.send(Message::Close(None)).await {
            tracing::debug!("Websocket close frame not sent: {}", e);
        }
    }
}
