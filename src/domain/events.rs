//! Domain event vocabulary.
//!
//! Constructors for every event the orchestration core publishes. All events
//! correlate on the request id (or client id for connection lifecycle events)
//! and carry primitive-typed payload fields only - never live resource
//! handles.

use serde_json::json;

use super::foundation::{ClientId, EventEnvelope, EventPriority, RequestId};

/// Fired when a client submits audio for transcription.
pub fn audio_uploaded(
    request_id: RequestId,
    format: &str,
    size_bytes: usize,
    client_id: Option<ClientId>,
) -> EventEnvelope {
    let event = EventEnvelope::new("audio.uploaded", "audio_service")
        .with_correlation_id(request_id.to_string())
        .with_payload_field("request_id", json!(request_id.to_string()))
        .with_payload_field("format", json!(format))
        .with_payload_field("size_bytes", json!(size_bytes));
    with_client(event, client_id)
}

/// Fired when transcription of a request begins.
pub fn transcription_started(
    request_id: RequestId,
    model: &str,
    language: Option<&str>,
    client_id: Option<ClientId>,
) -> EventEnvelope {
    let event = EventEnvelope::new("transcription.started", "transcription_service")
        .with_correlation_id(request_id.to_string())
        .with_payload_field("request_id", json!(request_id.to_string()))
        .with_payload_field("model", json!(model))
        .with_payload_field("language", json!(language));
    with_client(event, client_id)
}

/// Fired when transcription completes successfully.
pub fn transcription_completed(
    request_id: RequestId,
    text: &str,
    language: &str,
    processing_secs: f64,
    client_id: Option<ClientId>,
) -> EventEnvelope {
    let event = EventEnvelope::new("transcription.completed", "transcription_service")
        .with_correlation_id(request_id.to_string())
        .with_payload_field("request_id", json!(request_id.to_string()))
        .with_payload_field("text", json!(text))
        .with_payload_field("language", json!(language))
        .with_payload_field("processing_time", json!(processing_secs));
    with_client(event, client_id)
}

/// Fired when transcription fails. High priority so operators notice.
pub fn transcription_failed(
    request_id: RequestId,
    error: &str,
    client_id: Option<ClientId>,
) -> EventEnvelope {
    let event = EventEnvelope::new("transcription.failed", "transcription_service")
        .with_priority(EventPriority::High)
        .with_correlation_id(request_id.to_string())
        .with_payload_field("request_id", json!(request_id.to_string()))
        .with_payload_field("error", json!(error));
    with_client(event, client_id)
}

/// Fired when a client submits text for speech synthesis.
///
/// The text itself is truncated for the event payload; only its length is
/// reported in full.
pub fn text_submitted(
    request_id: RequestId,
    text: &str,
    voice: Option<&str>,
    client_id: Option<ClientId>,
) -> EventEnvelope {
    let preview: String = text.chars().take(100).collect();
    let event = EventEnvelope::new("tts.text_submitted", "tts_service")
        .with_correlation_id(request_id.to_string())
        .with_payload_field("request_id", json!(request_id.to_string()))
        .with_payload_field("text", json!(preview))
        .with_payload_field("text_length", json!(text.len()))
        .with_payload_field("voice", json!(voice));
    with_client(event, client_id)
}

/// Fired when speech synthesis begins.
pub fn synthesis_started(
    request_id: RequestId,
    voice: Option<&str>,
    text_length: usize,
    client_id: Option<ClientId>,
) -> EventEnvelope {
    let event = EventEnvelope::new("tts.synthesis_started", "tts_service")
        .with_correlation_id(request_id.to_string())
        .with_payload_field("request_id", json!(request_id.to_string()))
        .with_payload_field("voice", json!(voice))
        .with_payload_field("text_length", json!(text_length));
    with_client(event, client_id)
}

/// Fired when speech synthesis completes successfully.
pub fn synthesis_completed(
    request_id: RequestId,
    audio_size: usize,
    processing_secs: f64,
    client_id: Option<ClientId>,
) -> EventEnvelope {
    let event = EventEnvelope::new("tts.synthesis_completed", "tts_service")
        .with_correlation_id(request_id.to_string())
        .with_payload_field("request_id", json!(request_id.to_string()))
        .with_payload_field("audio_size", json!(audio_size))
        .with_payload_field("processing_time", json!(processing_secs));
    with_client(event, client_id)
}

/// Fired when speech synthesis fails. High priority so operators notice.
pub fn synthesis_failed(
    request_id: RequestId,
    error: &str,
    client_id: Option<ClientId>,
) -> EventEnvelope {
    let event = EventEnvelope::new("tts.synthesis_failed", "tts_service")
        .with_priority(EventPriority::High)
        .with_correlation_id(request_id.to_string())
        .with_payload_field("request_id", json!(request_id.to_string()))
        .with_payload_field("error", json!(error));
    with_client(event, client_id)
}

/// Fired when a client connection is accepted.
pub fn connection_opened(client_id: ClientId, remote_address: Option<&str>) -> EventEnvelope {
    EventEnvelope::new("connection.opened", "connection_manager")
        .with_correlation_id(client_id.to_string())
        .with_payload_field("client_id", json!(client_id.to_string()))
        .with_payload_field("remote_address", json!(remote_address))
}

/// Fired when a client connection is removed from the registry.
pub fn connection_closed(client_id: ClientId, reason: &str) -> EventEnvelope {
    EventEnvelope::new("connection.closed", "connection_manager")
        .with_correlation_id(client_id.to_string())
        .with_payload_field("client_id", json!(client_id.to_string()))
        .with_payload_field("reason", json!(reason))
}

fn with_client(event: EventEnvelope, client_id: Option<ClientId>) -> EventEnvelope {
    match client_id {
        Some(id) => event.with_payload_field("client_id", json!(id.to_string())),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_uploaded_correlates_on_request_id() {
        let request_id = RequestId::new();
        let event = audio_uploaded(request_id, "webm", 1024, None);

        assert_eq!(event.event_type, "audio.uploaded");
        assert_eq!(event.correlation_id, Some(request_id.to_string()));
        assert_eq!(
            event.payload_str("request_id"),
            Some(request_id.to_string().as_str())
        );
    }

    #[test]
    fn failure_events_are_high_priority() {
        let event = transcription_failed(RequestId::new(), "model crashed", None);
        assert_eq!(event.priority, EventPriority::High);

        let event = synthesis_failed(RequestId::new(), "voice missing", None);
        assert_eq!(event.priority, EventPriority::High);
    }

    #[test]
    fn text_submitted_truncates_long_text() {
        let long_text = "x".repeat(500);
        let event = text_submitted(RequestId::new(), &long_text, Some("alto"), None);

        assert_eq!(event.payload_str("text").unwrap().len(), 100);
        assert_eq!(event.payload.get("text_length"), Some(&json!(500)));
    }

    #[test]
    fn client_id_included_when_known() {
        let client_id = ClientId::new();
        let event = audio_uploaded(RequestId::new(), "wav", 10, Some(client_id));
        assert_eq!(
            event.payload_str("client_id"),
            Some(client_id.to_string().as_str())
        );

        let event = audio_uploaded(RequestId::new(), "wav", 10, None);
        assert!(event.payload.get("client_id").is_none());
    }

    #[test]
    fn connection_events_correlate_on_client_id() {
        let client_id = ClientId::new();
        let opened = connection_opened(client_id, Some("127.0.0.1:9000"));
        let closed = connection_closed(client_id, "idle timeout");

        assert_eq!(opened.correlation_id, Some(client_id.to_string()));
        assert_eq!(closed.payload_str("reason"), Some("idle timeout"));
    }
}
