//! Inbound message handlers.
//!
//! Each handler owns one message type from the wire protocol. The connection
//! manager routes by type, so handlers only see messages they declared for.
//! Handlers hold the manager weakly: the manager owns the handler registry,
//! and a strong reference back would leak both.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, info};

use crate::adapters::events::MetricsHandler;
use crate::adapters::pipeline::MediaPipeline;
use crate::config::PipelineConfig;
use crate::domain::events;
use crate::domain::foundation::{ClientId, DomainError, ErrorCode, RequestId, Timestamp};
use crate::domain::{AudioData, PipelinePayload, ProcessingContext, TextData};
use crate::ports::EventPublisher;

use super::manager::ConnectionManager;
use super::messages::{
    AudioMessage, ConfigMessage, PongMessage, ServerMessage, StatusMessage, SynthesisMessage,
    TextMessage, TranscriptionMessage,
};

/// Handler for one inbound message type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// The wire `type` field this handler accepts.
    fn message_type(&self) -> &'static str;

    /// Process one message from a client.
    ///
    /// Returning an error makes the manager send a structured error reply;
    /// it never tears down the connection.
    async fn handle(&self, client_id: ClientId, message: Value) -> Result<(), DomainError>;
}

/// Per-connection session preferences.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub preset: String,
    pub language: Option<String>,
    pub voice: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            preset: "default".to_string(),
            language: None,
            voice: None,
        }
    }
}

/// Session preferences for every connected client.
#[derive(Default)]
pub struct ClientConfigStore {
    settings: RwLock<HashMap<ClientId, ClientSettings>>,
}

impl ClientConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current settings for a client, defaults if none were set.
    pub fn get(&self, client_id: ClientId) -> ClientSettings {
        self.settings
            .read()
            .expect("config store lock poisoned")
            .get(&client_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Merge a config message over the client's current settings.
    pub fn merge(&self, client_id: ClientId, update: &ConfigMessage) -> ClientSettings {
        let mut settings = self.settings.write().expect("config store lock poisoned");
        let entry = settings.entry(client_id).or_default();
        if let Some(preset) = &update.preset {
            entry.preset = preset.clone();
        }
        if let Some(language) = &update.language {
            entry.language = Some(language.clone());
        }
        if let Some(voice) = &update.voice {
            entry.voice = Some(voice.clone());
        }
        entry.clone()
    }

    /// Forget a client's settings.
    pub fn remove(&self, client_id: ClientId) {
        self.settings
            .write()
            .expect("config store lock poisoned")
            .remove(&client_id);
    }

    pub fn len(&self) -> usize {
        self.settings
            .read()
            .expect("config store lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn manager_or_gone(manager: &Weak<ConnectionManager>) -> Result<Arc<ConnectionManager>, DomainError> {
    manager.upgrade().ok_or_else(|| {
        DomainError::new(
            ErrorCode::InternalError,
            "connection manager is no longer running",
        )
    })
}

fn meta_str(payload: &impl PipelinePayload, key: &str) -> Result<String, DomainError> {
    payload
        .meta(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("pipeline output is missing '{key}'"),
            )
        })
}

fn meta_f64(payload: &impl PipelinePayload, key: &str) -> f64 {
    payload.meta(key).and_then(Value::as_f64).unwrap_or(0.0)
}

// ============================================
// Config
// ============================================

/// Applies session preference updates.
pub struct ConfigHandler {
    store: Arc<ClientConfigStore>,
}

impl ConfigHandler {
    pub fn new(store: Arc<ClientConfigStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for ConfigHandler {
    fn message_type(&self) -> &'static str {
        "config"
    }

    async fn handle(&self, client_id: ClientId, message: Value) -> Result<(), DomainError> {
        let update: ConfigMessage = serde_json::from_value(message).map_err(|err| {
            DomainError::new(ErrorCode::InvalidMessage, format!("bad config message: {err}"))
        })?;

        if let Some(preset) = &update.preset {
            if !matches!(preset.as_str(), "fast" | "default" | "quality") {
                return Err(DomainError::new(
                    ErrorCode::InvalidMessage,
                    format!("unknown preset '{preset}'"),
                ));
            }
        }

        let settings = self.store.merge(client_id, &update);
        debug!(
            client_id = %client_id,
            preset = %settings.preset,
            voice = ?settings.voice,
            "client settings updated"
        );
        Ok(())
    }
}

// ============================================
// Audio
// ============================================

/// Runs audio uploads through the transcription pipeline and replies with
/// the transcript.
pub struct AudioHandler {
    manager: Weak<ConnectionManager>,
    publisher: Arc<dyn EventPublisher>,
    pipelines: HashMap<String, Arc<MediaPipeline<AudioData>>>,
    store: Arc<ClientConfigStore>,
    config: PipelineConfig,
}

impl AudioHandler {
    pub fn new(
        manager: Weak<ConnectionManager>,
        publisher: Arc<dyn EventPublisher>,
        pipelines: HashMap<String, Arc<MediaPipeline<AudioData>>>,
        store: Arc<ClientConfigStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            manager,
            publisher,
            pipelines,
            store,
            config,
        }
    }

    fn pipeline_for(&self, preset: &str) -> Arc<MediaPipeline<AudioData>> {
        self.pipelines
            .get(preset)
            .or_else(|| self.pipelines.get("default"))
            .cloned()
            .expect("default pipeline must be registered")
    }

    fn model_for(&self, preset: &str) -> &str {
        match preset {
            "fast" => &self.config.fast_model,
            "quality" => &self.config.quality_model,
            _ => &self.config.default_model,
        }
    }
}

#[async_trait]
impl MessageHandler for AudioHandler {
    fn message_type(&self) -> &'static str {
        "audio"
    }

    async fn handle(&self, client_id: ClientId, message: Value) -> Result<(), DomainError> {
        let upload: AudioMessage = serde_json::from_value(message).map_err(|err| {
            DomainError::new(ErrorCode::InvalidMessage, format!("bad audio message: {err}"))
        })?;

        let bytes = BASE64.decode(upload.data.as_bytes()).map_err(|err| {
            DomainError::new(
                ErrorCode::InvalidMessage,
                format!("audio data is not valid base64: {err}"),
            )
        })?;

        let request_id = RequestId::new();
        let settings = self.store.get(client_id);
        self.publisher
            .publish(events::audio_uploaded(
                request_id,
                &upload.format,
                bytes.len(),
                Some(client_id),
            ))
            .await?;

        let mut audio = AudioData::new(bytes, upload.format);
        if let Some(sample_rate) = upload.sample_rate {
            audio = audio.with_sample_rate(sample_rate);
        }

        self.publisher
            .publish(events::transcription_started(
                request_id,
                self.model_for(&settings.preset),
                settings.language.as_deref(),
                Some(client_id),
            ))
            .await?;

        let pipeline = self.pipeline_for(&settings.preset);
        let mut ctx = ProcessingContext::new(request_id, Some(client_id));
        let result = pipeline.execute(audio, &mut ctx).await;

        match result {
            Ok(output) => {
                let text = meta_str(&output, "transcript")?;
                let language = meta_str(&output, "transcript_language")?;
                let processing_time = ctx
                    .total_duration()
                    .map(|d| d.as_secs_f64())
                    .unwrap_or_default();

                info!(
                    client_id = %client_id,
                    request_id = %request_id,
                    pipeline = pipeline.name(),
                    "transcription delivered"
                );
                let manager = manager_or_gone(&self.manager)?;
                manager
                    .send_to_client(
                        client_id,
                        &ServerMessage::Transcription(TranscriptionMessage {
                            request_id: request_id.to_string(),
                            text: text.clone(),
                            language: language.clone(),
                            processing_time,
                            timestamp: Timestamp::now().as_unix_secs_f64(),
                        }),
                    )
                    .await?;

                self.publisher
                    .publish(events::transcription_completed(
                        request_id,
                        &text,
                        &language,
                        processing_time,
                        Some(client_id),
                    ))
                    .await?;
                Ok(())
            }
            Err(err) => {
                self.publisher
                    .publish(events::transcription_failed(
                        request_id,
                        &err.to_string(),
                        Some(client_id),
                    ))
                    .await?;
                Err(err)
            }
        }
    }
}

// ============================================
// Text
// ============================================

/// Runs text submissions through the synthesis pipeline and replies with
/// the rendered audio.
pub struct TextHandler {
    manager: Weak<ConnectionManager>,
    publisher: Arc<dyn EventPublisher>,
    pipeline: Arc<MediaPipeline<TextData>>,
    store: Arc<ClientConfigStore>,
}

impl TextHandler {
    pub fn new(
        manager: Weak<ConnectionManager>,
        publisher: Arc<dyn EventPublisher>,
        pipeline: Arc<MediaPipeline<TextData>>,
        store: Arc<ClientConfigStore>,
    ) -> Self {
        Self {
            manager,
            publisher,
            pipeline,
            store,
        }
    }
}

#[async_trait]
impl MessageHandler for TextHandler {
    fn message_type(&self) -> &'static str {
        "text"
    }

    async fn handle(&self, client_id: ClientId, message: Value) -> Result<(), DomainError> {
        let submission: TextMessage = serde_json::from_value(message).map_err(|err| {
            DomainError::new(ErrorCode::InvalidMessage, format!("bad text message: {err}"))
        })?;

        let request_id = RequestId::new();
        let settings = self.store.get(client_id);
        let voice = submission.voice.or(settings.voice);

        self.publisher
            .publish(events::text_submitted(
                request_id,
                &submission.text,
                voice.as_deref(),
                Some(client_id),
            ))
            .await?;

        let mut payload = TextData::new(submission.text);
        if let Some(voice) = voice {
            payload = payload.with_voice(voice);
        }
        if let Some(language) = settings.language {
            payload = payload.with_language(language);
        }

        self.publisher
            .publish(events::synthesis_started(
                request_id,
                payload.voice.as_deref(),
                payload.text.chars().count(),
                Some(client_id),
            ))
            .await?;

        let mut ctx = ProcessingContext::new(request_id, Some(client_id));
        let result = self.pipeline.execute(payload, &mut ctx).await;

        match result {
            Ok(output) => {
                let audio = meta_str(&output, "audio_base64")?;
                let format = meta_str(&output, "audio_format")?;
                let voice_used = meta_str(&output, "voice_used")?;
                let duration = meta_f64(&output, "audio_duration_secs");
                let processing_time = ctx
                    .total_duration()
                    .map(|d| d.as_secs_f64())
                    .unwrap_or_default();

                info!(
                    client_id = %client_id,
                    request_id = %request_id,
                    voice = %voice_used,
                    "synthesis delivered"
                );
                let manager = manager_or_gone(&self.manager)?;
                manager
                    .send_to_client(
                        client_id,
                        &ServerMessage::Synthesis(SynthesisMessage {
                            request_id: request_id.to_string(),
                            audio: audio.clone(),
                            format,
                            duration,
                            voice: voice_used,
                            timestamp: Timestamp::now().as_unix_secs_f64(),
                        }),
                    )
                    .await?;

                self.publisher
                    .publish(events::synthesis_completed(
                        request_id,
                        audio.len(),
                        processing_time,
                        Some(client_id),
                    ))
                    .await?;
                Ok(())
            }
            Err(err) => {
                self.publisher
                    .publish(events::synthesis_failed(
                        request_id,
                        &err.to_string(),
                        Some(client_id),
                    ))
                    .await?;
                Err(err)
            }
        }
    }
}

// ============================================
// Ping
// ============================================

/// Answers heartbeats.
pub struct PingHandler {
    manager: Weak<ConnectionManager>,
}

impl PingHandler {
    pub fn new(manager: Weak<ConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl MessageHandler for PingHandler {
    fn message_type(&self) -> &'static str {
        "ping"
    }

    async fn handle(&self, client_id: ClientId, _message: Value) -> Result<(), DomainError> {
        let manager = manager_or_gone(&self.manager)?;
        manager
            .send_to_client(
                client_id,
                &ServerMessage::Pong(PongMessage {
                    timestamp: Timestamp::now().as_unix_secs_f64(),
                }),
            )
            .await
    }
}

// ============================================
// Status
// ============================================

/// Replies with a service status snapshot.
pub struct StatusHandler {
    manager: Weak<ConnectionManager>,
    metrics: Arc<MetricsHandler>,
}

impl StatusHandler {
    pub fn new(manager: Weak<ConnectionManager>, metrics: Arc<MetricsHandler>) -> Self {
        Self { manager, metrics }
    }
}

#[async_trait]
impl MessageHandler for StatusHandler {
    fn message_type(&self) -> &'static str {
        "status"
    }

    async fn handle(&self, client_id: ClientId, _message: Value) -> Result<(), DomainError> {
        let manager = manager_or_gone(&self.manager)?;
        let snapshot = self.metrics.snapshot();
        manager
            .send_to_client(
                client_id,
                &ServerMessage::Status(StatusMessage {
                    active_connections: manager.connection_count(),
                    total_transcriptions: snapshot.total_transcriptions,
                    total_syntheses: snapshot.total_syntheses,
                    total_failures: snapshot.total_failures,
                    timestamp: Timestamp::now().as_unix_secs_f64(),
                }),
            )
            .await
    }
}
