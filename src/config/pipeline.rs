//! Pipeline configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Audio container formats accepted by validation
    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,

    /// Maximum audio payload size in bytes
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: usize,

    /// Maximum text length in characters
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Format the transcription provider expects
    #[serde(default = "default_target_format")]
    pub target_format: String,

    /// Sample rate the transcription provider expects
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,

    /// Sample rate used by the quality preset
    #[serde(default = "default_quality_sample_rate")]
    pub quality_sample_rate: u32,

    /// Model used by the fast preset
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Model used by the default preset
    #[serde(default = "default_default_model")]
    pub default_model: String,

    /// Model used by the quality preset
    #[serde(default = "default_quality_model")]
    pub quality_model: String,

    /// Noise reduction strength for the default preset, 0.0 to 1.0
    #[serde(default = "default_noise_reduction_strength")]
    pub noise_reduction_strength: f64,

    /// Noise reduction strength for the quality preset, 0.0 to 1.0
    #[serde(default = "default_quality_noise_reduction_strength")]
    pub quality_noise_reduction_strength: f64,

    /// Voice used when the client does not pick one
    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Provider poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline for a provider job in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

impl PipelineConfig {
    /// Validate pipeline configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.allowed_formats.is_empty() {
            return Err(ValidationError::NoAllowedFormats);
        }
        if self.max_audio_bytes < 1024 {
            return Err(ValidationError::AudioLimitTooSmall);
        }
        if self.max_text_chars == 0 {
            return Err(ValidationError::TextLimitTooSmall);
        }
        if self.provider_timeout_secs == 0 {
            return Err(ValidationError::InvalidProviderTimeout);
        }
        if !(0.0..=1.0).contains(&self.noise_reduction_strength)
            || !(0.0..=1.0).contains(&self.quality_noise_reduction_strength)
        {
            return Err(ValidationError::InvalidNoiseReductionStrength);
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_formats: default_allowed_formats(),
            max_audio_bytes: default_max_audio_bytes(),
            max_text_chars: default_max_text_chars(),
            target_format: default_target_format(),
            target_sample_rate: default_target_sample_rate(),
            quality_sample_rate: default_quality_sample_rate(),
            fast_model: default_fast_model(),
            default_model: default_default_model(),
            quality_model: default_quality_model(),
            noise_reduction_strength: default_noise_reduction_strength(),
            quality_noise_reduction_strength: default_quality_noise_reduction_strength(),
            default_voice: default_voice(),
            poll_interval_ms: default_poll_interval_ms(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_allowed_formats() -> Vec<String> {
    vec!["wav".to_string(), "webm".to_string(), "ogg".to_string()]
}

fn default_max_audio_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_text_chars() -> usize {
    5000
}

fn default_target_format() -> String {
    "wav".to_string()
}

fn default_target_sample_rate() -> u32 {
    16000
}

fn default_quality_sample_rate() -> u32 {
    48000
}

fn default_fast_model() -> String {
    "tiny".to_string()
}

fn default_default_model() -> String {
    "base".to_string()
}

fn default_quality_model() -> String {
    "large".to_string()
}

fn default_noise_reduction_strength() -> f64 {
    0.5
}

fn default_quality_noise_reduction_strength() -> f64 {
    0.9
}

fn default_voice() -> String {
    "neutral".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_provider_timeout_secs() -> u64 {
    60
}
