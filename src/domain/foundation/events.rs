//! Event infrastructure for domain event publishing and handling.
//!
//! This module provides the core types for event-driven orchestration:
//! - `EventId` - Unique identifier for events (deduplication)
//! - `EventPriority` - Coarse urgency classification
//! - `EventEnvelope` - Immutable transport record for domain events
//!
//! Envelopes are immutable once published. The `with_*` methods construct a
//! new envelope with merged fields; the original is never mutated, and the
//! `event_id` is preserved across copies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use uuid::Uuid;

use super::Timestamp;

/// Unique identifier for events (used for deduplication).
///
/// Uses a String internally to allow for various ID formats (UUID, ULID, etc.)
/// while maintaining serializability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an EventId from an existing string.
    ///
    /// No validation is performed - any non-empty string is accepted.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse urgency classification for events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Immutable record describing something that happened.
///
/// Wraps event-specific data with metadata needed for:
/// - Routing (`event_type`, dot-namespaced, e.g. "transcription.completed")
/// - Deduplication (`event_id`)
/// - Correlation (`correlation_id` links all events of one request)
/// - Ordering (`occurred_at`)
///
/// `payload` holds primitive-typed named fields supplied by the publisher;
/// `extensions` holds fields merged in by bus middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique ID for this event instance.
    pub event_id: EventId,

    /// Event type for routing (e.g., "transcription.completed").
    pub event_type: String,

    /// When the event occurred.
    pub occurred_at: Timestamp,

    /// Name of the component that emitted this event.
    pub source: String,

    /// ID linking related events across a single request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Urgency classification.
    #[serde(default)]
    pub priority: EventPriority,

    /// Named fields supplied by the publisher.
    #[serde(default)]
    pub payload: Map<String, JsonValue>,

    /// Fields merged in by middleware.
    #[serde(default)]
    pub extensions: Map<String, JsonValue>,
}

impl EventEnvelope {
    /// Creates a new envelope with a fresh event id and the current time.
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            occurred_at: Timestamp::now(),
            source: source.into(),
            correlation_id: None,
            priority: EventPriority::Normal,
            payload: Map::new(),
            extensions: Map::new(),
        }
    }

    /// Sets the correlation id (builder style, used at construction time).
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the priority (builder style, used at construction time).
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Returns a new envelope with an additional payload field.
    ///
    /// The receiver is consumed; the event id and all other fields carry over.
    pub fn with_payload_field(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Returns a new envelope with an additional extension field.
    ///
    /// Middleware uses this to enrich events without mutating the published
    /// value in place.
    pub fn with_extension(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Returns a payload field as a string slice, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(JsonValue::as_str)
    }
}
