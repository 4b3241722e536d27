//! WebSocket adapters - Transport, connection lifecycle, routing, handlers.

mod connection;
mod handlers;
mod manager;
mod messages;
mod notifier;
mod route;
mod transport;

pub use connection::{ConnectionState, ManagedConnection};
pub use handlers::{
    AudioHandler, ClientConfigStore, ClientSettings, ConfigHandler, MessageHandler, PingHandler,
    StatusHandler, TextHandler,
};
pub use manager::ConnectionManager;
pub use messages::{
    AudioMessage, ConfigMessage, ConnectedMessage, ErrorMessage, PongMessage, ServerMessage,
    StatusMessage, SynthesisMessage, TextMessage, TranscriptionMessage,
};
pub use notifier::{ClientNotifier, SettingsCleanupHandler};
pub use route::{websocket_router, ws_handler, WebSocketState};
pub use transport::WebSocketTransport;
