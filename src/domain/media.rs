//! Media payloads flowing through processing pipelines.
//!
//! Payloads are owned by the request that processes them; stages take them by
//! value and return an enriched value, so no payload is ever shared between
//! concurrent requests.

use serde_json::{Map, Value as JsonValue};

/// Behavior every pipeline payload must provide so the driver can tag it
/// with completion metadata without knowing the concrete type.
pub trait PipelinePayload {
    /// Returns a new payload with an additional metadata field.
    fn with_meta(self, key: impl Into<String>, value: JsonValue) -> Self;

    /// Returns a metadata field, if present.
    fn meta(&self, key: &str) -> Option<&JsonValue>;
}

/// Audio bytes plus format metadata.
#[derive(Debug, Clone)]
pub struct AudioData {
    pub data: Vec<u8>,
    pub format: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub metadata: Map<String, JsonValue>,
}

impl AudioData {
    /// Creates audio data in the given container format.
    pub fn new(data: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            data,
            format: format.into(),
            sample_rate: None,
            channels: None,
            metadata: Map::new(),
        }
    }

    /// Sets the sample rate (builder style).
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Sets the channel count (builder style).
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Returns a new payload carrying different bytes, other fields unchanged.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Returns a new payload in a different container format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Returns the payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks whether the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PipelinePayload for AudioData {
    fn with_meta(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    fn meta(&self, key: &str) -> Option<&JsonValue> {
        self.metadata.get(key)
    }
}

/// Text plus an optional language hint and voice selection.
#[derive(Debug, Clone)]
pub struct TextData {
    pub text: String,
    pub language: Option<String>,
    pub voice: Option<String>,
    pub metadata: Map<String, JsonValue>,
}

impl TextData {
    /// Creates a text payload.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            voice: None,
            metadata: Map::new(),
        }
    }

    /// Sets the language hint (builder style).
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the synthesis voice (builder style).
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

impl PipelinePayload for TextData {
    fn with_meta(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    fn meta(&self, key: &str) -> Option<&JsonValue> {
        self.metadata.get(key)
    }
}
