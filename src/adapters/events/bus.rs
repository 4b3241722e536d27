//! QueuedEventBus - Bounded-queue event bus with a single dispatch loop.
//!
//! Publishing enqueues onto a bounded channel and returns immediately. One
//! background task drains the queue: each event flows through middleware in
//! registration order, then fans out to its type-specific and wildcard
//! handlers concurrently. Events rejected by middleware, or failed by every
//! handler, land in the dead-letter sink and are never retried.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::{EventHandler, EventMiddleware, EventPublisher, EventSubscriber};

use super::dead_letter::{DeadLetterReason, DeadLetterSink};

/// Point-in-time snapshot of bus counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusMetrics {
    pub events_published: u64,
    pub events_dispatched: u64,
    pub handler_failures: u64,
    pub events_dead_lettered: u64,
}

struct HandlerRegistry {
    by_type: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    wildcard: Vec<Arc<dyn EventHandler>>,
}

/// Event bus backed by a bounded mpsc queue and a single dispatch task.
pub struct QueuedEventBus {
    sender: mpsc::Sender<EventEnvelope>,
    // Taken exactly once by the dispatch loop on start().
    receiver: Mutex<Option<mpsc::Receiver<EventEnvelope>>>,
    registry: RwLock<HandlerRegistry>,
    middleware: RwLock<Vec<Arc<dyn EventMiddleware>>>,
    dead_letters: Arc<DeadLetterSink>,
    stopped: AtomicBool,
    events_published: AtomicU64,
    events_dispatched: AtomicU64,
    handler_failures: AtomicU64,
    events_dead_lettered: AtomicU64,
}

impl QueuedEventBus {
    /// Create a bus with the given queue capacity and dead-letter capacity.
    pub fn new(queue_capacity: usize, dead_letter_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            registry: RwLock::new(HandlerRegistry {
                by_type: HashMap::new(),
                wildcard: Vec::new(),
            }),
            middleware: RwLock::new(Vec::new()),
            dead_letters: Arc::new(DeadLetterSink::new(dead_letter_capacity)),
            stopped: AtomicBool::new(false),
            events_published: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            events_dead_lettered: AtomicU64::new(0),
        }
    }

    /// Start the dispatch loop. Returns the loop's task handle so shutdown
    /// can await it for a clean drain.
    ///
    /// Calling start twice is a no-op for the second caller: the receiver is
    /// taken once, and the returned handle resolves immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let receiver = self
            .receiver
            .lock()
            .expect("bus receiver lock poisoned")
            .take();
        let Some(mut receiver) = receiver else {
            warn!("event bus dispatch loop already started");
            return tokio::spawn(async {});
        };

        let bus = Arc::clone(self);
        tokio::spawn(async move {
            debug!("event bus dispatch loop started");
            loop {
                // Bounded wait so a stop request is observed within a second
                // even when the queue is idle.
                match tokio::time::timeout(Duration::from_secs(1), receiver.recv()).await {
                    Ok(Some(event)) => bus.dispatch(event).await,
                    Ok(None) => break,
                    Err(_) => {
                        if bus.stopped.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                }
                if bus.stopped.load(Ordering::SeqCst) {
                    // Drain whatever is already queued before exiting.
                    while let Ok(event) = receiver.try_recv() {
                        bus.dispatch(event).await;
                    }
                    break;
                }
            }
            debug!("event bus dispatch loop stopped");
        })
    }

    /// Request the dispatch loop to stop after draining queued events.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// The sink holding rejected and failed events.
    pub fn dead_letters(&self) -> &DeadLetterSink {
        &self.dead_letters
    }

    /// Snapshot of the bus counters.
    pub fn metrics(&self) -> BusMetrics {
        BusMetrics {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            events_dead_lettered: self.events_dead_lettered.load(Ordering::Relaxed),
        }
    }

    async fn dispatch(&self, event: EventEnvelope) {
        // Middleware chain runs in registration order. First rejection wins.
        let middleware: Vec<Arc<dyn EventMiddleware>> = self
            .middleware
            .read()
            .expect("bus middleware lock poisoned")
            .clone();

        let mut event = event;
        for mw in &middleware {
            // Keep a copy so a rejection can still dead-letter the envelope
            // the middleware consumed.
            let snapshot = event.clone();
            match mw.call(event).await {
                Ok(enriched) => event = enriched,
                Err(err) => {
                    warn!(
                        middleware = mw.name(),
                        error = %err,
                        "middleware rejected event"
                    );
                    self.events_dead_lettered.fetch_add(1, Ordering::Relaxed);
                    self.dead_letters.push(
                        snapshot,
                        DeadLetterReason::MiddlewareRejected {
                            middleware: mw.name().to_string(),
                            message: err.to_string(),
                        },
                    );
                    return;
                }
            }
        }

        let handlers: Vec<Arc<dyn EventHandler>> = {
            let registry = self.registry.read().expect("bus registry lock poisoned");
            let mut handlers: Vec<Arc<dyn EventHandler>> = registry
                .by_type
                .get(&event.event_type)
                .cloned()
                .unwrap_or_default();
            handlers.extend(registry.wildcard.iter().cloned());
            handlers
        };

        if handlers.is_empty() {
            // Events nobody listens for are dropped without ceremony.
            trace!(event_type = %event.event_type, "no handlers registered, event ignored");
            return;
        }

        let mut tasks = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let event = event.clone();
            let name = handler.name();
            tasks.push((
                name,
                tokio::spawn(async move { handler.handle(event).await }),
            ));
        }

        let mut failures = Vec::new();
        let handler_count = tasks.len();
        for (name, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(handler = name, event_type = %event.event_type, error = %err, "event handler failed");
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    failures.push(format!("{name}: {err}"));
                }
                Err(join_err) => {
                    // A panicked handler must not take the bus down.
                    error!(handler = name, event_type = %event.event_type, error = %join_err, "event handler panicked");
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                    failures.push(format!("{name}: panicked"));
                }
            }
        }

        if failures.len() == handler_count {
            warn!(
                event_type = %event.event_type,
                failures = failures.len(),
                "all handlers failed, dead-lettering event"
            );
            self.events_dead_lettered.fetch_add(1, Ordering::Relaxed);
            self.dead_letters
                .push(event, DeadLetterReason::AllHandlersFailed { failures });
        } else {
            self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl EventPublisher for QueuedEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::BusStopped,
                "event bus has been stopped",
            ));
        }
        trace!(event_type = %event.event_type, event_id = %event.event_id, "publishing event");
        self.sender.send(event).await.map_err(|_| {
            DomainError::new(ErrorCode::BusStopped, "event bus queue is closed")
        })?;
        self.events_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl EventSubscriber for QueuedEventBus {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        debug!(event_type, handler = handler.name(), "handler subscribed");
        self.registry
            .write()
            .expect("bus registry lock poisoned")
            .by_type
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    fn subscribe_all(&self, handler: Arc<dyn EventHandler>) {
        debug!(handler = handler.name(), "wildcard handler subscribed");
        self.registry
            .write()
            .expect("bus registry lock poisoned")
            .wildcard
            .push(handler);
    }

    fn add_middleware(&self, middleware: Arc<dyn EventMiddleware>) {
        debug!(middleware = middleware.name(), "middleware added");
        self.middleware
            .write()
            .expect("bus middleware lock poisoned")
            .push(middleware);
    }
}
