//! Audio pipeline stages - validation, conversion, cleanup, transcription.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::{AudioData, PipelinePayload, ProcessingContext};
use crate::ports::{AudioConverter, TranscriptionProvider, TranscriptionRequest};

use super::stage::PipelineStage;

/// Rejects payloads the rest of the pipeline cannot handle.
///
/// Runs first in every preset so later stages can assume a non-empty payload
/// in a supported format under the size ceiling.
pub struct FormatValidationStage {
    allowed_formats: Vec<String>,
    max_size_bytes: usize,
}

impl FormatValidationStage {
    pub fn new(allowed_formats: Vec<String>, max_size_bytes: usize) -> Self {
        Self {
            allowed_formats,
            max_size_bytes,
        }
    }
}

#[async_trait]
impl PipelineStage<AudioData> for FormatValidationStage {
    fn name(&self) -> &'static str {
        "format_validation"
    }

    async fn process(
        &self,
        payload: AudioData,
        ctx: &mut ProcessingContext,
    ) -> Result<AudioData, DomainError> {
        if payload.is_empty() {
            return Err(DomainError::new(
                ErrorCode::EmptyPayload,
                "audio payload is empty",
            ));
        }
        if payload.len() > self.max_size_bytes {
            return Err(DomainError::new(
                ErrorCode::PayloadTooLarge,
                format!(
                    "audio payload is {} bytes, limit is {}",
                    payload.len(),
                    self.max_size_bytes
                ),
            )
            .with_detail("size_bytes", payload.len().to_string()));
        }
        if !self.allowed_formats.iter().any(|f| f == &payload.format) {
            return Err(DomainError::new(
                ErrorCode::UnsupportedFormat,
                format!("audio format '{}' is not supported", payload.format),
            )
            .with_detail("format", payload.format.clone()));
        }

        ctx.add_stage_metadata(self.name(), "size_bytes", json!(payload.len()));
        Ok(payload.with_meta("validated", json!(true)))
    }
}

/// Converts audio into the provider's expected format.
///
/// Skipped when the payload is already in the target format; the actual
/// transcoding is delegated to the [`AudioConverter`] port.
pub struct FormatConversionStage {
    converter: Arc<dyn AudioConverter>,
    target_format: String,
    target_sample_rate: u32,
}

impl FormatConversionStage {
    pub fn new(
        converter: Arc<dyn AudioConverter>,
        target_format: impl Into<String>,
        target_sample_rate: u32,
    ) -> Self {
        Self {
            converter,
            target_format: target_format.into(),
            target_sample_rate,
        }
    }
}

#[async_trait]
impl PipelineStage<AudioData> for FormatConversionStage {
    fn name(&self) -> &'static str {
        "format_conversion"
    }

    fn can_process(&self, payload: &AudioData, _ctx: &ProcessingContext) -> bool {
        payload.format != self.target_format
            || payload.sample_rate != Some(self.target_sample_rate)
    }

    async fn process(
        &self,
        payload: AudioData,
        ctx: &mut ProcessingContext,
    ) -> Result<AudioData, DomainError> {
        let source_format = payload.format.clone();
        debug!(
            from = %source_format,
            to = %self.target_format,
            sample_rate = self.target_sample_rate,
            "converting audio"
        );

        let converted = self
            .converter
            .convert(
                payload.data.clone(),
                &source_format,
                &self.target_format,
                self.target_sample_rate,
            )
            .await?;

        ctx.add_stage_metadata(self.name(), "converted_from", json!(source_format));
        Ok(payload
            .with_data(converted)
            .with_format(self.target_format.clone())
            .with_sample_rate(self.target_sample_rate)
            .with_meta("converted_from", json!(source_format)))
    }
}

/// Marks the payload as having passed noise reduction.
///
/// Spectral cleanup itself happens inside the provider's preprocessing; this
/// stage exists so the quality preset can request it and so the request's
/// timing report shows the step.
pub struct NoiseReductionStage {
    strength: f64,
}

impl NoiseReductionStage {
    pub fn new(strength: f64) -> Self {
        Self {
            strength: strength.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PipelineStage<AudioData> for NoiseReductionStage {
    fn name(&self) -> &'static str {
        "noise_reduction"
    }

    async fn process(
        &self,
        payload: AudioData,
        ctx: &mut ProcessingContext,
    ) -> Result<AudioData, DomainError> {
        ctx.add_stage_metadata(self.name(), "strength", json!(self.strength));
        Ok(payload
            .with_meta("noise_reduction", json!(true))
            .with_meta("noise_reduction_strength", json!(self.strength)))
    }
}

/// Submits audio to the transcription provider and polls for the result.
///
/// Polling is bounded: if the provider does not finish within the deadline
/// the stage fails with a provider timeout and the pipeline aborts.
pub struct TranscriptionStage {
    provider: Arc<dyn TranscriptionProvider>,
    model: String,
    language: Option<String>,
    poll_interval: Duration,
    deadline: Duration,
}

impl TranscriptionStage {
    pub fn new(
        provider: Arc<dyn TranscriptionProvider>,
        model: impl Into<String>,
        language: Option<String>,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            language,
            poll_interval,
            deadline,
        }
    }
}

#[async_trait]
impl PipelineStage<AudioData> for TranscriptionStage {
    fn name(&self) -> &'static str {
        "transcription"
    }

    async fn process(
        &self,
        payload: AudioData,
        ctx: &mut ProcessingContext,
    ) -> Result<AudioData, DomainError> {
        let request = TranscriptionRequest {
            request_id: ctx.request_id,
            audio: payload.data.clone(),
            format: payload.format.clone(),
            sample_rate: payload.sample_rate,
            model: self.model.clone(),
            language: self.language.clone(),
            client_id: ctx.client_id,
        };

        let job_id = self.provider.submit(request).await?;
        debug!(job_id = %job_id, model = %self.model, "transcription submitted");

        let started = std::time::Instant::now();
        let transcript = loop {
            if let Some(transcript) = self.provider.get_result(job_id).await? {
                break transcript;
            }
            if started.elapsed() >= self.deadline {
                return Err(DomainError::provider_timeout(
                    "transcription",
                    self.deadline.as_secs(),
                )
                .with_detail("job_id", job_id.to_string()));
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        info!(
            job_id = %job_id,
            language = %transcript.language,
            chars = transcript.text.len(),
            "transcription completed"
        );
        ctx.add_stage_metadata(self.name(), "model", json!(transcript.model_used));
        ctx.add_stage_metadata(self.name(), "job_id", json!(job_id.to_string()));

        Ok(payload
            .with_meta("transcript", json!(transcript.text))
            .with_meta("transcript_language", json!(transcript.language))
            .with_meta("transcript_confidence", json!(transcript.confidence)))
    }
}
