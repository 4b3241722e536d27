//! Per-connection state tracking.

use std::sync::Mutex;
use std::time::Instant;

use serde_json::Value;

use crate::domain::foundation::{ClientId, DomainError, ErrorCode, Timestamp};
use crate::ports::MessageTransport;

use std::sync::Arc;

/// Lifecycle state of a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl ConnectionState {
    /// Whether a transition to `next` is allowed.
    ///
    /// Terminal states never transition; a connection that errored or
    /// disconnected is replaced, not revived.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Connected)
                | (Connecting, Error)
                | (Connected, Disconnected)
                | (Connected, Error)
        )
    }
}

/// A client connection and its bookkeeping.
///
/// The transport is the only channel to the peer; all sends go through
/// [`ManagedConnection::send`] so state checks and activity tracking stay in
/// one place.
pub struct ManagedConnection {
    pub client_id: ClientId,
    pub connected_at: Timestamp,
    transport: Arc<dyn MessageTransport>,
    state: Mutex<ConnectionState>,
    last_activity: Mutex<Instant>,
}

impl ManagedConnection {
    pub fn new(client_id: ClientId, transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            client_id,
            connected_at: Timestamp::now(),
            transport,
            state: Mutex::new(ConnectionState::Connecting),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("connection state lock poisoned")
    }

    /// Transition to a new state, enforcing the lifecycle graph.
    pub fn set_state(&self, next: ConnectionState) -> Result<(), DomainError> {
        let mut state = self.state.lock().expect("connection state lock poisoned");
        if !state.can_transition_to(next) {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("cannot transition from {:?} to {:?}", *state, next),
            )
            .with_detail("client_id", self.client_id.to_string()));
        }
        *state = next;
        Ok(())
    }

    /// Force a terminal state without lifecycle checks.
    ///
    /// Used when the transport has already failed underneath us and the
    /// recorded state may lag reality.
    pub fn force_state(&self, next: ConnectionState) {
        *self.state.lock().expect("connection state lock poisoned") = next;
    }

    /// Records that the client did something.
    pub fn touch(&self) {
        *self
            .last_activity
            .lock()
            .expect("connection activity lock poisoned") = Instant::now();
    }

    /// How long since the client was last active.
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity
            .lock()
            .expect("connection activity lock poisoned")
            .elapsed()
    }

    /// Send a message to the peer.
    ///
    /// Fails if the connection is not in the `Connected` state.
    pub async fn send(&self, message: Value) -> Result<(), DomainError> {
        if self.state() != ConnectionState::Connected {
            return Err(DomainError::new(
                ErrorCode::TransportError,
                "connection is not open",
            )
            .with_detail("client_id", self.client_id.to_string()));
        }
        self.transport.send(message).await
    }

    /// Receive the next message from the peer.
    pub async fn receive(&self) -> Result<Option<Value>, DomainError> {
        self.transport.receive().await
    }

    /// Close the transport with the given close code and reason.
    pub async fn close(&self, code: u16, reason: &str) -> Result<(), DomainError> {
        self.transport.close(code, reason).await
    }
}
