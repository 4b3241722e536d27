//! Connection manager - Registry and lifecycle for client connections.
//!
//! Owns every live connection, routes inbound messages to type-keyed
//! handlers, and enforces the lifecycle rules: a send failure moves the
//! connection to `Error` and removes it immediately, and an idle sweeper
//! closes connections that have gone quiet.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::domain::events;
use crate::domain::foundation::{ClientId, DomainError, ErrorCode};
use crate::ports::{EventPublisher, MessageTransport};

use super::connection::{ConnectionState, ManagedConnection};
use super::handlers::MessageHandler;
use super::messages::{ConnectedMessage, ErrorMessage, ServerMessage};
use crate::domain::foundation::Timestamp;

// Close codes sent to peers; 1001 is "going away" in the WebSocket spec.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Registry of live connections plus inbound message routing.
pub struct ConnectionManager {
    connections: RwLock<HashMap<ClientId, Arc<ManagedConnection>>>,
    handlers: RwLock<HashMap<&'static str, Arc<dyn MessageHandler>>>,
    publisher: Arc<dyn EventPublisher>,
    config: ConnectionConfig,
    shutting_down: AtomicBool,
}

impl ConnectionManager {
    pub fn new(publisher: Arc<dyn EventPublisher>, config: ConnectionConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            publisher,
            config,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Register a handler for one inbound message type.
    pub fn register_handler(&self, handler: Arc<dyn MessageHandler>) {
        debug!(message_type = handler.message_type(), "message handler registered");
        self.handlers
            .write()
            .expect("handler registry lock poisoned")
            .insert(handler.message_type(), handler);
    }

    /// Accept a new connection: assign a client id, move it to `Connected`,
    /// send the ack, and announce it on the bus.
    pub async fn register(
        &self,
        transport: Arc<dyn MessageTransport>,
        remote_address: Option<&str>,
    ) -> Result<Arc<ManagedConnection>, DomainError> {
        let client_id = ClientId::new();
        let connection = Arc::new(ManagedConnection::new(client_id, transport));
        connection.set_state(ConnectionState::Connected)?;

        self.connections
            .write()
            .expect("connection registry lock poisoned")
            .insert(client_id, Arc::clone(&connection));

        let ack = ServerMessage::Connected(ConnectedMessage {
            client_id: client_id.to_string(),
            timestamp: Timestamp::now().as_unix_secs_f64(),
        });
        if let Err(err) = connection.send(to_value(&ack)).await {
            // Peer vanished before the ack made it out.
            self.drop_connection(client_id, "ack failed").await;
            return Err(err);
        }

        info!(client_id = %client_id, "client connected");
        self.publisher
            .publish(events::connection_opened(client_id, remote_address))
            .await?;
        Ok(connection)
    }

    /// Remove a connection after a clean close from the peer.
    pub async fn unregister(&self, client_id: ClientId, reason: &str) {
        let removed = self
            .connections
            .write()
            .expect("connection registry lock poisoned")
            .remove(&client_id);

        if let Some(connection) = removed {
            let _ = connection.set_state(ConnectionState::Disconnected);
            info!(client_id = %client_id, reason, "client disconnected");
            if let Err(err) = self
                .publisher
                .publish(events::connection_closed(client_id, reason))
                .await
            {
                warn!(client_id = %client_id, error = %err, "failed to publish close event");
            }
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .expect("connection registry lock poisoned")
            .len()
    }

    /// Whether a client is currently registered.
    pub fn is_connected(&self, client_id: ClientId) -> bool {
        self.connections
            .read()
            .expect("connection registry lock poisoned")
            .contains_key(&client_id)
    }

    /// Send a message to one client.
    ///
    /// A transport failure moves the connection to `Error` and removes it
    /// from the registry before the error is returned; no further sends can
    /// reach a connection known to be broken.
    pub async fn send_to_client(
        &self,
        client_id: ClientId,
        message: &ServerMessage,
    ) -> Result<(), DomainError> {
        let connection = self
            .connections
            .read()
            .expect("connection registry lock poisoned")
            .get(&client_id)
            .cloned()
            .ok_or_else(|| {
                DomainError::new(ErrorCode::ClientNotFound, "client is not connected")
                    .with_detail("client_id", client_id.to_string())
            })?;

        if let Err(err) = connection.send(to_value(message)).await {
            warn!(client_id = %client_id, error = %err, "send failed, dropping connection");
            connection.force_state(ConnectionState::Error);
            self.drop_connection(client_id, "send failure").await;
            return Err(err);
        }
        Ok(())
    }

    /// Send a message to every connected client except those in `exclude`,
    /// so a handler can fan out without echoing to the originating client.
    ///
    /// Per-client failures are isolated: the failing connection is dropped
    /// and the broadcast continues. Returns the number of successful sends.
    pub async fn broadcast(&self, message: &ServerMessage, exclude: &HashSet<ClientId>) -> usize {
        let connections: Vec<(ClientId, Arc<ManagedConnection>)> = self
            .connections
            .read()
            .expect("connection registry lock poisoned")
            .iter()
            .filter(|(id, _)| !exclude.contains(id))
            .map(|(id, conn)| (*id, Arc::clone(conn)))
            .collect();

        let payload = to_value(message);
        let mut delivered = 0;
        for (client_id, connection) in connections {
            match connection.send(payload.clone()).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(client_id = %client_id, error = %err, "broadcast send failed, dropping connection");
                    connection.force_state(ConnectionState::Error);
                    self.drop_connection(client_id, "send failure").await;
                }
            }
        }
        delivered
    }

    /// Drive one connection: receive messages and route them until the peer
    /// closes or the transport fails.
    pub async fn run_connection(&self, connection: Arc<ManagedConnection>) {
        let client_id = connection.client_id;
        loop {
            match connection.receive().await {
                Ok(Some(message)) => {
                    connection.touch();
                    self.route(client_id, message).await;
                }
                Ok(None) => {
                    self.unregister(client_id, "client closed").await;
                    break;
                }
                Err(err) if err.code == ErrorCode::InvalidMessage => {
                    // Malformed frame, not a broken transport.
                    warn!(client_id = %client_id, error = %err, "unparseable message");
                    self.send_error(client_id, err.code.to_string(), err.message.clone())
                        .await;
                }
                Err(err) => {
                    warn!(client_id = %client_id, error = %err, "receive failed, dropping connection");
                    connection.force_state(ConnectionState::Error);
                    self.drop_connection(client_id, "receive failure").await;
                    break;
                }
            }
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    /// Route one inbound message to its registered handler.
    ///
    /// Unknown or malformed message types are answered with a structured
    /// error reply and a warning log; they never tear down the connection.
    pub async fn route(&self, client_id: ClientId, message: Value) {
        let Some(message_type) = message.get("type").and_then(Value::as_str) else {
            warn!(client_id = %client_id, "message missing type field");
            self.send_error(client_id, "INVALID_MESSAGE", "message is missing a type field")
                .await;
            return;
        };
        let message_type = message_type.to_string();

        let handler = self
            .handlers
            .read()
            .expect("handler registry lock poisoned")
            .get(message_type.as_str())
            .cloned();

        let Some(handler) = handler else {
            warn!(client_id = %client_id, message_type = %message_type, "unknown message type");
            self.send_error(
                client_id,
                "INVALID_MESSAGE",
                format!("unknown message type '{message_type}'"),
            )
            .await;
            return;
        };

        if let Err(err) = handler.handle(client_id, message).await {
            warn!(
                client_id = %client_id,
                message_type = %message_type,
                error = %err,
                "message handler failed"
            );
            self.send_error(client_id, err.code.to_string(), err.message.clone())
                .await;
        }
    }

    /// Sweep once, closing connections idle past the configured timeout.
    ///
    /// Returns the clients that were closed.
    pub async fn sweep_idle(&self) -> Vec<ClientId> {
        let idle_timeout = self.config.idle_timeout();
        let idle: Vec<(ClientId, Arc<ManagedConnection>)> = self
            .connections
            .read()
            .expect("connection registry lock poisoned")
            .iter()
            .filter(|(_, conn)| conn.idle_for() >= idle_timeout)
            .map(|(id, conn)| (*id, Arc::clone(conn)))
            .collect();

        let mut closed = Vec::with_capacity(idle.len());
        for (client_id, connection) in idle {
            info!(client_id = %client_id, "closing idle connection");
            if let Err(err) = connection.close(CLOSE_GOING_AWAY, "idle timeout").await {
                debug!(client_id = %client_id, error = %err, "close frame failed");
            }
            self.unregister(client_id, "idle timeout").await;
            closed.push(client_id);
        }
        closed
    }

    /// Spawn the periodic idle sweeper. Runs until [`shutdown`] is called.
    ///
    /// [`shutdown`]: ConnectionManager::shutdown
    pub fn spawn_idle_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if manager.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                let closed = manager.sweep_idle().await;
                if !closed.is_empty() {
                    debug!(count = closed.len(), "idle sweep closed connections");
                }
            }
        })
    }

    /// Close every connection and stop accepting work.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let connections: Vec<(ClientId, Arc<ManagedConnection>)> = self
            .connections
            .write()
            .expect("connection registry lock poisoned")
            .drain()
            .collect();

        for (client_id, connection) in connections {
            let _ = connection.set_state(ConnectionState::Disconnected);
            if let Err(err) = connection.close(CLOSE_GOING_AWAY, "server shutdown").await {
                debug!(client_id = %client_id, error = %err, "close frame failed");
            }
            if let Err(err) = self
                .publisher
                .publish(events::connection_closed(client_id, "server shutdown"))
                .await
            {
                debug!(client_id = %client_id, error = %err, "failed to publish close event");
            }
        }
        info!("connection manager shut down");
    }

    async fn send_error(
        &self,
        client_id: ClientId,
        code: impl Into<String>,
        message: impl Into<String>,
    ) {
        let reply = ServerMessage::Error(ErrorMessage::now(code, message));
        if let Err(err) = self.send_to_client(client_id, &reply).await {
            debug!(client_id = %client_id, error = %err, "error reply not delivered");
        }
    }

    async fn drop_connection(&self, client_id: ClientId, reason: &str) {
        let removed = self
            .connections
            .write()
            .expect("connection registry lock poisoned")
            .remove(&client_id);

        if removed.is_some() {
            if let Err(err) = self
                .publisher
                .publish(events::connection_closed(client_id, reason))
                .await
            {
                warn!(client_id = %client_id, error = %err, "failed to publish close event");
            }
        }
    }
}

fn to_value(message: &ServerMessage) -> Value {
    serde_json::to_value(message).expect("ServerMessage serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::EventEnvelope;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    /// Publisher that records events instead of dispatching them.
    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub events: Mutex<Vec<EventEnvelope>>,
    }

    impl RecordingPublisher {
        pub fn event_types(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    /// Transport double that can be told to fail sends.
    #[derive(Default)]
    struct ScriptedTransport {
        fail_sends: AtomicBool,
        sent: Mutex<Vec<Value>>,
        closes: Mutex<Vec<(u16, String)>>,
    }

    #[async_trait]
    impl MessageTransport for ScriptedTransport {
        async fn send(&self, message: Value) -> Result<(), DomainError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(DomainError::new(ErrorCode::TransportError, "wire broke"));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn receive(&self) -> Result<Option<Value>, DomainError> {
            Ok(None)
        }

        async fn close(&self, code: u16, reason: &str) -> Result<(), DomainError> {
            self.closes.lock().unwrap().push((code, reason.to_string()));
            Ok(())
        }
    }

    fn manager(publisher: Arc<RecordingPublisher>) -> ConnectionManager {
        ConnectionManager::new(publisher, ConnectionConfig::default())
    }

    #[tokio::test]
    async fn register_acks_and_announces() {
        let publisher = Arc::new(RecordingPublisher::default());
        let manager = manager(Arc::clone(&publisher));
        let transport = Arc::new(ScriptedTransport::default());

        let connection = manager
            .register(transport.clone(), Some("127.0.0.1:9000"))
            .await
            .unwrap();

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(publisher.event_types(), vec!["connection.opened"]);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("type").unwrap(), "connected");
    }

    #[tokio::test]
    async fn send_failure_drops_connection_immediately() {
        let publisher = Arc::new(RecordingPublisher::default());
        let manager = manager(Arc::clone(&publisher));
        let transport = Arc::new(ScriptedTransport::default());

        let connection = manager.register(transport.clone(), None).await.unwrap();
        let client_id = connection.client_id;
        transport.fail_sends.store(true, Ordering::SeqCst);

        let result = manager
            .send_to_client(
                client_id,
                &ServerMessage::Pong(super::super::messages::PongMessage { timestamp: 0.0 }),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(connection.state(), ConnectionState::Error);
        assert!(!manager.is_connected(client_id));
        assert_eq!(
            publisher.event_types(),
            vec!["connection.opened", "connection.closed"]
        );
    }

    #[tokio::test]
    async fn broadcast_isolates_failing_connections() {
        let publisher = Arc::new(RecordingPublisher::default());
        let manager = manager(Arc::clone(&publisher));

        let healthy = Arc::new(ScriptedTransport::default());
        let broken = Arc::new(ScriptedTransport::default());
        manager.register(healthy.clone(), None).await.unwrap();
        let broken_conn = manager.register(broken.clone(), None).await.unwrap();
        broken.fail_sends.store(true, Ordering::SeqCst);

        let delivered = manager
            .broadcast(
                &ServerMessage::Pong(super::super::messages::PongMessage { timestamp: 0.0 }),
                &HashSet::new(),
            )
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(manager.connection_count(), 1);
        assert!(!manager.is_connected(broken_conn.client_id));
        // Ack plus the broadcast made it to the healthy client.
        assert_eq!(healthy.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_clients() {
        let publisher = Arc::new(RecordingPublisher::default());
        let manager = manager(publisher);

        let sender = Arc::new(ScriptedTransport::default());
        let other = Arc::new(ScriptedTransport::default());
        let sender_conn = manager.register(sender.clone(), None).await.unwrap();
        manager.register(other.clone(), None).await.unwrap();

        let exclude: HashSet<ClientId> = [sender_conn.client_id].into_iter().collect();
        let delivered = manager
            .broadcast(
                &ServerMessage::Pong(super::super::messages::PongMessage { timestamp: 0.0 }),
                &exclude,
            )
            .await;

        assert_eq!(delivered, 1);
        // The excluded client saw only its ack; the other got the broadcast.
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
        assert_eq!(other.sent.lock().unwrap().len(), 2);
        // Exclusion does not drop the connection.
        assert!(manager.is_connected(sender_conn.client_id));
    }

    #[tokio::test]
    async fn unknown_message_type_gets_error_reply() {
        let publisher = Arc::new(RecordingPublisher::default());
        let manager = manager(publisher);
        let transport = Arc::new(ScriptedTransport::default());

        let connection = manager.register(transport.clone(), None).await.unwrap();
        manager
            .route(connection.client_id, serde_json::json!({"type": "bogus"}))
            .await;

        let sent = transport.sent.lock().unwrap();
        let reply = sent.last().unwrap();
        assert_eq!(reply.get("type").unwrap(), "error");
        assert_eq!(reply.get("code").unwrap(), "INVALID_MESSAGE");
        drop(sent);
        // The connection survives.
        assert!(manager.is_connected(connection.client_id));
    }

    #[tokio::test]
    async fn missing_type_field_gets_error_reply() {
        let publisher = Arc::new(RecordingPublisher::default());
        let manager = manager(publisher);
        let transport = Arc::new(ScriptedTransport::default());

        let connection = manager.register(transport.clone(), None).await.unwrap();
        manager
            .route(connection.client_id, serde_json::json!({"hello": 1}))
            .await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.last().unwrap().get("type").unwrap(), "error");
    }

    #[tokio::test]
    async fn idle_sweep_closes_with_going_away() {
        let publisher = Arc::new(RecordingPublisher::default());
        let config = ConnectionConfig {
            idle_timeout_secs: 1,
            sweep_interval_secs: 1,
        };
        let manager = ConnectionManager::new(Arc::clone(&publisher) as _, config);
        let transport = Arc::new(ScriptedTransport::default());
        let connection = manager.register(transport.clone(), None).await.unwrap();

        // Not yet idle.
        assert!(manager.sweep_idle().await.is_empty());

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let closed = manager.sweep_idle().await;

        assert_eq!(closed, vec![connection.client_id]);
        assert_eq!(manager.connection_count(), 0);
        let closes = transport.closes.lock().unwrap();
        assert_eq!(closes[0], (1001, "idle timeout".to_string()));
        let last = publisher.events.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.payload_str("reason"), Some("idle timeout"));
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let publisher = Arc::new(RecordingPublisher::default());
        let manager = manager(Arc::clone(&publisher));
        let a = Arc::new(ScriptedTransport::default());
        let b = Arc::new(ScriptedTransport::default());
        manager.register(a.clone(), None).await.unwrap();
        manager.register(b.clone(), None).await.unwrap();

        manager.shutdown().await;

        assert_eq!(manager.connection_count(), 0);
        assert_eq!(
            a.closes.lock().unwrap()[0],
            (1001, "server shutdown".to_string())
        );
        assert_eq!(
            b.closes.lock().unwrap()[0],
            (1001, "server shutdown".to_string())
        );
    }
}
