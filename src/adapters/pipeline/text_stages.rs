//! Text pipeline stages - validation and speech synthesis.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use tracing::{debug, info};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::{PipelinePayload, ProcessingContext, TextData};
use crate::ports::{SynthesisProvider, SynthesisRequest};

use super::stage::PipelineStage;

/// Rejects text the synthesis provider cannot handle.
pub struct TextValidationStage {
    max_chars: usize,
}

impl TextValidationStage {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl PipelineStage<TextData> for TextValidationStage {
    fn name(&self) -> &'static str {
        "text_validation"
    }

    async fn process(
        &self,
        payload: TextData,
        ctx: &mut ProcessingContext,
    ) -> Result<TextData, DomainError> {
        let trimmed = payload.text.trim();
        if trimmed.is_empty() {
            return Err(DomainError::new(
                ErrorCode::EmptyPayload,
                "text payload is empty",
            ));
        }
        let chars = payload.text.chars().count();
        if chars > self.max_chars {
            return Err(DomainError::new(
                ErrorCode::PayloadTooLarge,
                format!("text is {} chars, limit is {}", chars, self.max_chars),
            )
            .with_detail("length", chars.to_string()));
        }

        ctx.add_stage_metadata(self.name(), "length", json!(chars));
        Ok(payload.with_meta("validated", json!(true)))
    }
}

/// Submits text to the synthesis provider and polls for the rendered audio.
///
/// The finished audio is attached to the payload metadata base64-encoded,
/// ready for the wire without another encoding pass.
pub struct SynthesisStage {
    provider: Arc<dyn SynthesisProvider>,
    default_voice: String,
    poll_interval: Duration,
    deadline: Duration,
}

impl SynthesisStage {
    pub fn new(
        provider: Arc<dyn SynthesisProvider>,
        default_voice: impl Into<String>,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            provider,
            default_voice: default_voice.into(),
            poll_interval,
            deadline,
        }
    }
}

#[async_trait]
impl PipelineStage<TextData> for SynthesisStage {
    fn name(&self) -> &'static str {
        "synthesis"
    }

    async fn process(
        &self,
        payload: TextData,
        ctx: &mut ProcessingContext,
    ) -> Result<TextData, DomainError> {
        let voice = payload
            .voice
            .clone()
            .unwrap_or_else(|| self.default_voice.clone());
        let request = SynthesisRequest {
            request_id: ctx.request_id,
            text: payload.text.clone(),
            voice: voice.clone(),
            language: payload.language.clone(),
            client_id: ctx.client_id,
        };

        let job_id = self.provider.submit(request).await?;
        debug!(job_id = %job_id, voice = %voice, "synthesis submitted");

        let started = std::time::Instant::now();
        let audio = loop {
            if let Some(audio) = self.provider.get_result(job_id).await? {
                break audio;
            }
            if started.elapsed() >= self.deadline {
                return Err(
                    DomainError::provider_timeout("synthesis", self.deadline.as_secs())
                        .with_detail("job_id", job_id.to_string()),
                );
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        info!(
            job_id = %job_id,
            voice = %audio.voice_used,
            bytes = audio.audio.len(),
            "synthesis completed"
        );
        ctx.add_stage_metadata(self.name(), "voice", json!(audio.voice_used));
        ctx.add_stage_metadata(self.name(), "job_id", json!(job_id.to_string()));

        Ok(payload
            .with_meta("audio_base64", json!(BASE64.encode(&audio.audio)))
            .with_meta("audio_format", json!(audio.format))
            .with_meta("audio_duration_secs", json!(audio.duration_secs))
            .with_meta("voice_used", json!(audio.voice_used)))
    }
}
