//! Processing pipelines - Stage trait, driver, concrete stages, presets.
//!
//! Presets are pure composition: they pick stages and parameters but add no
//! behavior of their own, so every preset shares the driver's timing and
//! short-circuit semantics.

mod audio_stages;
mod stage;
mod text_stages;

pub use audio_stages::{
    FormatConversionStage, FormatValidationStage, NoiseReductionStage, TranscriptionStage,
};
pub use stage::{MediaPipeline, PipelineStage};
pub use text_stages::{SynthesisStage, TextValidationStage};

use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::domain::{AudioData, TextData};
use crate::ports::{AudioConverter, SynthesisProvider, TranscriptionProvider};

/// Minimal-latency transcription: validation straight into the fast model,
/// no conversion or cleanup.
pub fn fast_pipeline(
    config: &PipelineConfig,
    provider: Arc<dyn TranscriptionProvider>,
) -> MediaPipeline<AudioData> {
    MediaPipeline::new("fast")
        .with_stage(Arc::new(FormatValidationStage::new(
            config.allowed_formats.clone(),
            config.max_audio_bytes,
        )))
        .with_stage(Arc::new(TranscriptionStage::new(
            provider,
            config.fast_model.clone(),
            None,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.provider_timeout_secs),
        )))
}

/// Balanced transcription: validation, conversion to the provider's
/// preferred format, noise reduction, then the default model.
pub fn default_pipeline(
    config: &PipelineConfig,
    converter: Arc<dyn AudioConverter>,
    provider: Arc<dyn TranscriptionProvider>,
) -> MediaPipeline<AudioData> {
    MediaPipeline::new("default")
        .with_stage(Arc::new(FormatValidationStage::new(
            config.allowed_formats.clone(),
            config.max_audio_bytes,
        )))
        .with_stage(Arc::new(FormatConversionStage::new(
            converter,
            config.target_format.clone(),
            config.target_sample_rate,
        )))
        .with_stage(Arc::new(NoiseReductionStage::new(
            config.noise_reduction_strength,
        )))
        .with_stage(Arc::new(TranscriptionStage::new(
            provider,
            config.default_model.clone(),
            None,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.provider_timeout_secs),
        )))
}

/// Best-effort accuracy: the same stage set as the default preset with
/// heavier parameters. A higher sample rate, stronger noise reduction, and
/// the quality model.
pub fn quality_pipeline(
    config: &PipelineConfig,
    converter: Arc<dyn AudioConverter>,
    provider: Arc<dyn TranscriptionProvider>,
) -> MediaPipeline<AudioData> {
    MediaPipeline::new("quality")
        .with_stage(Arc::new(FormatValidationStage::new(
            config.allowed_formats.clone(),
            config.max_audio_bytes,
        )))
        .with_stage(Arc::new(FormatConversionStage::new(
            converter,
            config.target_format.clone(),
            config.quality_sample_rate,
        )))
        .with_stage(Arc::new(NoiseReductionStage::new(
            config.quality_noise_reduction_strength,
        )))
        .with_stage(Arc::new(TranscriptionStage::new(
            provider,
            config.quality_model.clone(),
            None,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.provider_timeout_secs),
        )))
}

/// Text-to-speech: validation then synthesis.
pub fn synthesis_pipeline(
    config: &PipelineConfig,
    provider: Arc<dyn SynthesisProvider>,
) -> MediaPipeline<TextData> {
    MediaPipeline::new("synthesis")
        .with_stage(Arc::new(TextValidationStage::new(config.max_text_chars)))
        .with_stage(Arc::new(SynthesisStage::new(
            provider,
            config.default_voice.clone(),
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_secs(config.provider_timeout_secs),
        )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::inference::{
        InMemorySynthesizer, InMemoryTranscriber, PassthroughConverter,
    };
    use crate::domain::foundation::RequestId;
    use crate::domain::PipelinePayload;
    use crate::domain::ProcessingContext;
    use serde_json::json;

    #[test]
    fn presets_compose_expected_stages() {
        let config = PipelineConfig::default();
        let transcriber = Arc::new(InMemoryTranscriber::new());
        let synthesizer = Arc::new(InMemorySynthesizer::new());
        let converter = Arc::new(PassthroughConverter);

        let fast = fast_pipeline(&config, transcriber.clone());
        assert_eq!(fast.stage_names(), vec!["format_validation", "transcription"]);

        let default = default_pipeline(&config, converter.clone(), transcriber.clone());
        assert_eq!(
            default.stage_names(),
            vec![
                "format_validation",
                "format_conversion",
                "noise_reduction",
                "transcription"
            ]
        );

        // Quality is the same composition with heavier parameters.
        let quality = quality_pipeline(&config, converter, transcriber);
        assert_eq!(quality.stage_names(), default.stage_names());

        let synthesis = synthesis_pipeline(&config, synthesizer);
        assert_eq!(synthesis.stage_names(), vec!["text_validation", "synthesis"]);
    }

    #[tokio::test]
    async fn quality_preset_uses_heavier_parameters_than_default() {
        let config = PipelineConfig::default();
        let transcriber = Arc::new(InMemoryTranscriber::new());
        let converter = Arc::new(PassthroughConverter);

        let default = default_pipeline(&config, converter.clone(), transcriber.clone());
        let quality = quality_pipeline(&config, converter, transcriber);

        let mut default_ctx = ProcessingContext::new(RequestId::new(), None);
        let default_out = default
            .execute(AudioData::new(vec![1, 2, 3], "webm"), &mut default_ctx)
            .await
            .unwrap();

        let mut quality_ctx = ProcessingContext::new(RequestId::new(), None);
        let quality_out = quality
            .execute(AudioData::new(vec![1, 2, 3], "webm"), &mut quality_ctx)
            .await
            .unwrap();

        assert_eq!(default_out.sample_rate, Some(config.target_sample_rate));
        assert_eq!(quality_out.sample_rate, Some(config.quality_sample_rate));
        assert_eq!(
            default_out.meta("noise_reduction_strength"),
            Some(&json!(config.noise_reduction_strength))
        );
        assert_eq!(
            quality_out.meta("noise_reduction_strength"),
            Some(&json!(config.quality_noise_reduction_strength))
        );
    }
}
