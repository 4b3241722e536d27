//! WebSocket message types for the voice service wire protocol.
//!
//! Defines the protocol between server and connected clients:
//! - Client → Server: session config, audio uploads, text submissions, pings, status requests
//! - Server → Client: connection ack, transcription/synthesis results, pongs, status, errors
//!
//! Audio travels base64-encoded inside JSON text frames in both directions.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

// ============================================
// Client → Server Messages
// ============================================
//
// Inbound routing is by the raw `type` field; each handler deserializes
// the body struct for its own message type. `ping` and `status` carry no
// body.

/// Session preferences; every field is optional and merges over the
/// connection's current settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigMessage {
    /// Pipeline preset: "fast", "default", or "quality".
    pub preset: Option<String>,
    /// Language hint passed to the transcription provider.
    pub language: Option<String>,
    /// Voice used for synthesis.
    pub voice: Option<String>,
}

/// Base64-encoded audio upload.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioMessage {
    pub data: String,
    pub format: String,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

/// Text to synthesize.
#[derive(Debug, Clone, Deserialize)]
pub struct TextMessage {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established successfully.
    Connected(ConnectedMessage),

    /// Transcription result for an audio upload.
    Transcription(TranscriptionMessage),

    /// Synthesized speech for a text submission.
    Synthesis(SynthesisMessage),

    /// Heartbeat response.
    Pong(PongMessage),

    /// Service status snapshot.
    Status(StatusMessage),

    /// Error occurred.
    Error(ErrorMessage),
}

/// Sent once when the connection is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedMessage {
    pub client_id: String,
    pub timestamp: f64,
}

/// Transcription result.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionMessage {
    pub request_id: String,
    pub text: String,
    pub language: String,
    pub processing_time: f64,
    pub timestamp: f64,
}

/// Synthesized speech, audio base64-encoded.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisMessage {
    pub request_id: String,
    pub audio: String,
    pub format: String,
    pub duration: f64,
    pub voice: String,
    pub timestamp: f64,
}

/// Heartbeat response.
#[derive(Debug, Clone, Serialize)]
pub struct PongMessage {
    pub timestamp: f64,
}

/// Service status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusMessage {
    pub active_connections: usize,
    pub total_transcriptions: u64,
    pub total_syntheses: u64,
    pub total_failures: u64,
    pub timestamp: f64,
}

/// Error message sent to client.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub timestamp: f64,
}

impl ErrorMessage {
    /// Builds an error reply stamped with the current time.
    pub fn now(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: Timestamp::now().as_unix_secs_f64(),
        }
    }
}
