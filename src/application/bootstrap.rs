//! Application bootstrap - Builds and wires the whole service.
//!
//! Construction is explicit: every service is built here, registered with the
//! container, and connected to the bus in one place. Startup order is
//! container, bus, pipelines, connection manager, handlers; shutdown runs in
//! reverse.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::adapters::container::ServiceContainer;
use crate::ports::EventSubscriber;
use crate::adapters::events::{LoggingHandler, MetricsHandler, QueuedEventBus, TraceMiddleware};
use crate::adapters::inference::{InMemorySynthesizer, InMemoryTranscriber, PassthroughConverter};
use crate::adapters::pipeline::{
    default_pipeline, fast_pipeline, quality_pipeline, synthesis_pipeline, MediaPipeline,
};
use crate::adapters::websocket::{
    websocket_router, AudioHandler, ClientConfigStore, ClientNotifier, ConfigHandler,
    ConnectionManager, PingHandler, SettingsCleanupHandler, StatusHandler, TextHandler,
    WebSocketState,
};
use crate::config::AppConfig;
use crate::domain::foundation::DomainError;
use crate::domain::AudioData;
use crate::ports::{AudioConverter, SynthesisProvider, TranscriptionProvider};

/// The assembled service.
pub struct App {
    pub config: AppConfig,
    pub container: Arc<ServiceContainer>,
    pub bus: Arc<QueuedEventBus>,
    pub manager: Arc<ConnectionManager>,
    pub metrics: Arc<MetricsHandler>,
    bus_task: JoinHandle<()>,
    sweeper_task: JoinHandle<()>,
}

impl App {
    /// Build the service with in-process providers.
    pub fn build(config: AppConfig) -> Result<Self, DomainError> {
        let transcriber: Arc<dyn TranscriptionProvider> = Arc::new(InMemoryTranscriber::new());
        let synthesizer: Arc<dyn SynthesisProvider> = Arc::new(InMemorySynthesizer::new());
        let converter: Arc<dyn AudioConverter> = Arc::new(PassthroughConverter::new());
        Self::build_with_providers(config, transcriber, synthesizer, converter)
    }

    /// Build the service around the given providers.
    pub fn build_with_providers(
        config: AppConfig,
        transcriber: Arc<dyn TranscriptionProvider>,
        synthesizer: Arc<dyn SynthesisProvider>,
        converter: Arc<dyn AudioConverter>,
    ) -> Result<Self, DomainError> {
        let container = Arc::new(ServiceContainer::new());

        // Event bus and its stock subscribers.
        let bus = Arc::new(QueuedEventBus::new(
            config.events.queue_capacity,
            config.events.dead_letter_capacity,
        ));
        bus.add_middleware(Arc::new(TraceMiddleware::new("voicebridge")));

        let metrics = Arc::new(MetricsHandler::new());
        bus.subscribe_all(Arc::clone(&metrics) as _);
        bus.subscribe_all(Arc::new(LoggingHandler::new()));

        // Pipelines, one per preset.
        let mut pipelines: HashMap<String, Arc<MediaPipeline<AudioData>>> = HashMap::new();
        pipelines.insert(
            "fast".to_string(),
            Arc::new(fast_pipeline(&config.pipeline, Arc::clone(&transcriber))),
        );
        pipelines.insert(
            "default".to_string(),
            Arc::new(default_pipeline(
                &config.pipeline,
                Arc::clone(&converter),
                Arc::clone(&transcriber),
            )),
        );
        pipelines.insert(
            "quality".to_string(),
            Arc::new(quality_pipeline(
                &config.pipeline,
                Arc::clone(&converter),
                Arc::clone(&transcriber),
            )),
        );
        let tts = Arc::new(synthesis_pipeline(
            &config.pipeline,
            Arc::clone(&synthesizer),
        ));

        // Connection manager and message handlers. Handlers hold the manager
        // weakly; the manager owns them through its registry.
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&bus) as _,
            config.connection.clone(),
        ));
        let store = Arc::new(ClientConfigStore::new());

        manager.register_handler(Arc::new(ConfigHandler::new(Arc::clone(&store))));
        manager.register_handler(Arc::new(AudioHandler::new(
            Arc::downgrade(&manager),
            Arc::clone(&bus) as _,
            pipelines,
            Arc::clone(&store),
            config.pipeline.clone(),
        )));
        manager.register_handler(Arc::new(TextHandler::new(
            Arc::downgrade(&manager),
            Arc::clone(&bus) as _,
            tts,
            Arc::clone(&store),
        )));
        manager.register_handler(Arc::new(PingHandler::new(Arc::downgrade(&manager))));
        manager.register_handler(Arc::new(StatusHandler::new(
            Arc::downgrade(&manager),
            Arc::clone(&metrics),
        )));

        // Bus subscribers that feed back into connections.
        let notifier = Arc::new(ClientNotifier::new(Arc::downgrade(&manager)));
        for event_type in ClientNotifier::event_types() {
            bus.subscribe(event_type, Arc::clone(&notifier) as _);
        }
        bus.subscribe(
            "connection.closed",
            Arc::new(SettingsCleanupHandler::new(Arc::clone(&store))),
        );

        // Shared services stay resolvable by name for anything wired later.
        container.register_instance("event_bus", Arc::clone(&bus));
        container.register_instance("connection_manager", Arc::clone(&manager));
        container.register_instance("metrics", Arc::clone(&metrics));
        container.register_instance("client_config_store", Arc::clone(&store));

        let bus_task = bus.start();
        let sweeper_task = manager.spawn_idle_sweeper();
        info!(
            queue_capacity = config.events.queue_capacity,
            idle_timeout_secs = config.connection.idle_timeout_secs,
            "application assembled"
        );

        Ok(Self {
            config,
            container,
            bus,
            manager,
            metrics,
            bus_task,
            sweeper_task,
        })
    }

    /// Build the HTTP router serving the WebSocket endpoint.
    pub fn router(&self) -> Router {
        websocket_router()
            .with_state(WebSocketState::new(Arc::clone(&self.manager)))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout_secs,
            )))
    }

    /// Graceful shutdown: close connections, drain the bus, dispose services.
    pub async fn shutdown(self) -> Result<(), DomainError> {
        info!("shutting down");
        self.sweeper_task.abort();
        self.manager.shutdown().await;

        self.bus.stop();
        if let Err(err) = self.bus_task.await {
            // Abort of a finished task is fine; a panic is not.
            if err.is_panic() {
                return Err(DomainError::new(
                    crate::domain::foundation::ErrorCode::InternalError,
                    "event bus dispatch loop panicked",
                ));
            }
        }

        self.container.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_wires_every_service() {
        let app = App::build(AppConfig::default()).unwrap();

        assert!(app.container.is_registered("event_bus"));
        assert!(app.container.is_registered("connection_manager"));
        assert!(app.container.is_registered("metrics"));

        let resolved: Arc<QueuedEventBus> = app.container.resolve("event_bus").unwrap();
        assert!(Arc::ptr_eq(&resolved, &app.bus));

        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_and_disposes() {
        let app = App::build(AppConfig::default()).unwrap();
        let container = Arc::clone(&app.container);

        app.shutdown().await.unwrap();
        assert!(container.resolve::<QueuedEventBus>("event_bus").is_err());
    }

    #[tokio::test]
    async fn router_builds() {
        let app = App::build(AppConfig::default()).unwrap();
        let _router = app.router();
        app.shutdown().await.unwrap();
    }
}
