//! Axum WebSocket transport adapter.
//!
//! Wraps an upgraded axum socket behind the [`MessageTransport`] port so the
//! connection manager never touches the WebSocket library directly.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::MessageTransport;

/// [`MessageTransport`] over one upgraded axum WebSocket.
pub struct WebSocketTransport {
    // Sink and stream are locked separately so a send never blocks a receive.
    sender: Mutex<SplitSink<WebSocket, Message>>,
    receiver: Mutex<SplitStream<WebSocket>>,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        Self {
            sender: Mutex::new(sender),
            receiver: Mutex::new(receiver),
        }
    }
}

#[async_trait]
impl MessageTransport for WebSocketTransport {
    async fn send(&self, message: Value) -> Result<(), DomainError> {
        let json = message.to_string();
        self.sender
            .lock()
            .await
            .send(Message::Text(json))
            .await
            .map_err(|err| {
                DomainError::new(ErrorCode::TransportError, format!("websocket send failed: {err}"))
            })
    }

    async fn receive(&self) -> Result<Option<Value>, DomainError> {
        let mut receiver = self.receiver.lock().await;
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let value = serde_json::from_str(&text).map_err(|err| {
                        DomainError::new(
                            ErrorCode::InvalidMessage,
                            format!("frame is not valid JSON: {err}"),
                        )
                    })?;
                    return Ok(Some(value));
                }
                Ok(Message::Binary(_)) => {
                    // The protocol carries audio base64 inside text frames.
                    warn!("ignoring unsupported binary frame");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Protocol-level keepalive, handled by axum.
                    trace!("websocket keepalive frame");
                }
                Ok(Message::Close(_)) => return Ok(None),
                Err(err) => {
                    return Err(DomainError::new(
                        ErrorCode::TransportError,
                        format!("websocket receive failed: {err}"),
                    ));
                }
            }
        }
        Ok(None)
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), DomainError> {
        self.sender
            .lock()
            .await
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            })))
            .await
            .map_err(|err| {
                DomainError::new(
                    ErrorCode::TransportError,
                    format!("websocket close failed: {err}"),
                )
            })
    }
}
