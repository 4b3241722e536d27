//! Event handlers that feed bus traffic back to connected clients.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::foundation::{ClientId, DomainError, ErrorCode, EventEnvelope};
use crate::ports::EventHandler;

use super::handlers::ClientConfigStore;
use super::manager::ConnectionManager;
use super::messages::{ErrorMessage, ServerMessage};

/// Pushes failure notices to the client that owns the failed request.
///
/// Subscribed to the failure event types. The handlers that run pipelines
/// already reply inline; this covers failures surfaced by other publishers,
/// and makes failure notification independent of who detected the failure.
pub struct ClientNotifier {
    manager: Weak<ConnectionManager>,
}

impl ClientNotifier {
    pub fn new(manager: Weak<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Event types this notifier should be subscribed to.
    pub fn event_types() -> [&'static str; 2] {
        ["transcription.failed", "tts.synthesis_failed"]
    }
}

#[async_trait]
impl EventHandler for ClientNotifier {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        let Some(client_id) = event.payload_str("client_id") else {
            // Failure not tied to a connection; nothing to push.
            return Ok(());
        };
        let client_id: ClientId = client_id.parse().map_err(|_| {
            DomainError::new(ErrorCode::InvalidMessage, "event carries malformed client_id")
        })?;

        let manager = self.manager.upgrade().ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                "connection manager is no longer running",
            )
        })?;

        if !manager.is_connected(client_id) {
            debug!(client_id = %client_id, "client gone before failure notice");
            return Ok(());
        }

        let reason = event.payload_str("error").unwrap_or("processing failed");
        let notice = ServerMessage::Error(ErrorMessage::now("PROCESSING_FAILED", reason));
        manager.send_to_client(client_id, &notice).await
    }

    fn name(&self) -> &'static str {
        "client_notifier"
    }
}

/// Drops a client's stored settings once its connection closes.
pub struct SettingsCleanupHandler {
    store: Arc<ClientConfigStore>,
}

impl SettingsCleanupHandler {
    pub fn new(store: Arc<ClientConfigStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for SettingsCleanupHandler {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        if let Some(client_id) = event.payload_str("client_id") {
            if let Ok(client_id) = client_id.parse::<ClientId>() {
                self.store.remove(client_id);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "settings_cleanup"
    }
}
