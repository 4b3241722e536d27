//! MessageTransport port - Interface over a bidirectional message channel.
//!
//! The connection manager drives this port so its lifecycle logic stays
//! independent of the concrete WebSocket library. Adapters wrap the real
//! socket; tests substitute in-memory channels.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::DomainError;

/// Port over a bidirectional, message-oriented transport.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send one JSON message to the peer.
    async fn send(&self, message: Value) -> Result<(), DomainError>;

    /// Receive the next JSON message from the peer.
    ///
    /// Returns `Ok(None)` when the peer has closed the channel cleanly.
    async fn receive(&self) -> Result<Option<Value>, DomainError>;

    /// Close the channel with a close code and reason.
    async fn close(&self, code: u16, reason: &str) -> Result<(), DomainError>;
}
