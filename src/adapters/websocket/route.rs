//! WebSocket upgrade handler and router.
//!
//! Handles the HTTP → WebSocket upgrade, hands the socket to the connection
//! manager, and drives the connection until it ends.

use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tracing::debug;

use super::manager::ConnectionManager;
use super::transport::WebSocketTransport;

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub manager: Arc<ConnectionManager>,
}

impl WebSocketState {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<WebSocketState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, remote, state))
}

/// Drive one established WebSocket connection to completion.
async fn handle_socket(socket: WebSocket, remote: SocketAddr, state: WebSocketState) {
    let transport = Arc::new(WebSocketTransport::new(socket));
    let connection = match state
        .manager
        .register(transport, Some(&remote.to_string()))
        .await
    {
        Ok(connection) => connection,
        Err(err) => {
            // Client vanished during the handshake.
            debug!(remote = %remote, error = %err, "connection rejected");
            return;
        }
    };

    state.manager.run_connection(connection).await;
}

/// Create the axum router for the WebSocket endpoint.
pub fn websocket_router() -> Router<WebSocketState> {
    Router::new().route("/ws", get(ws_handler))
}
