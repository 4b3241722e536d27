//! Logging handler and tracing middleware.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::foundation::{DomainError, EventEnvelope, EventPriority};
use crate::ports::{EventHandler, EventMiddleware};

/// Wildcard handler that logs every dispatched event.
///
/// High and critical priority events log at info, the rest at debug.
#[derive(Default)]
pub struct LoggingHandler;

impl LoggingHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        match event.priority {
            EventPriority::High | EventPriority::Critical => info!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                source = %event.source,
                correlation_id = ?event.correlation_id,
                "event"
            ),
            _ => debug!(
                event_type = %event.event_type,
                event_id = %event.event_id,
                source = %event.source,
                correlation_id = ?event.correlation_id,
                "event"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

/// Middleware that stamps each event with the dispatch hop.
///
/// Adds a `dispatched_by` extension so downstream consumers can tell which
/// bus instance forwarded the event. Never rejects.
pub struct TraceMiddleware {
    bus_name: String,
}

impl TraceMiddleware {
    pub fn new(bus_name: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
        }
    }
}

#[async_trait]
impl EventMiddleware for TraceMiddleware {
    async fn call(&self, event: EventEnvelope) -> Result<EventEnvelope, DomainError> {
        Ok(event.with_extension("dispatched_by", serde_json::json!(self.bus_name)))
    }

    fn name(&self) -> &'static str {
        "trace"
    }
}
