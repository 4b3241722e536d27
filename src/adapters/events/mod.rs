//! Event adapters - Queued bus, dead-letter sink, and stock handlers.

mod bus;
mod dead_letter;
mod logging;
mod metrics;

pub use bus::{BusMetrics, QueuedEventBus};
pub use dead_letter::{DeadLetterEntry, DeadLetterReason, DeadLetterSink};
pub use logging::{LoggingHandler, TraceMiddleware};
pub use metrics::{MetricsHandler, MetricsSnapshot};
