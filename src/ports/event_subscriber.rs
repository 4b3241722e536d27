//! EventSubscriber port - Interface for subscribing to domain events.
//!
//! Handlers register interest in domain events without knowing about the
//! underlying dispatch mechanism. Middleware runs before any handler and may
//! enrich or reject events.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Handler for processing domain events.
///
/// Implementations should be:
/// - **Idempotent** - Safe to call multiple times with same event
/// - **Quick** - Long operations should be queued for async processing
/// - **Isolated** - Errors don't affect other handlers
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process an event.
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Handler name for logging and failure attribution.
    fn name(&self) -> &'static str;
}

/// Middleware that runs on every event before handlers are invoked.
///
/// Middleware receives the event by value and returns a (possibly enriched)
/// new event; the published envelope is never mutated in place. Returning an
/// error diverts the event to the dead-letter sink and blocks all handlers
/// for that event.
#[async_trait]
pub trait EventMiddleware: Send + Sync {
    /// Inspect or enrich an event before dispatch.
    async fn call(&self, event: EventEnvelope) -> Result<EventEnvelope, DomainError>;

    /// Middleware name for logging and failure attribution.
    fn name(&self) -> &'static str;
}

/// Port for subscribing to domain events.
///
/// Registration never fails. Duplicate registration of the same handler
/// produces duplicate invocation - deduplication is the caller's
/// responsibility.
pub trait EventSubscriber: Send + Sync {
    /// Subscribe handler to a specific event type.
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>);

    /// Subscribe handler to every event regardless of type (wildcard).
    fn subscribe_all(&self, handler: Arc<dyn EventHandler>);

    /// Add middleware, invoked in registration order before any handler.
    fn add_middleware(&self, middleware: Arc<dyn EventMiddleware>);
}

/// Combined trait for event bus implementations.
pub trait EventBus: super::EventPublisher + EventSubscriber {}

// Blanket implementation - any type that implements both traits is an EventBus
impl<T: super::EventPublisher + EventSubscriber> EventBus for T {}
