//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Event queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("Dead letter capacity must be at least 1")]
    InvalidDeadLetterCapacity,

    #[error("At least one audio format must be allowed")]
    NoAllowedFormats,

    #[error("Max audio size must be at least 1 KiB")]
    AudioLimitTooSmall,

    #[error("Max text length must be at least 1")]
    TextLimitTooSmall,

    #[error("Provider timeout must be at least 1 second")]
    InvalidProviderTimeout,

    #[error("Noise reduction strength must be between 0.0 and 1.0")]
    InvalidNoiseReductionStrength,

    #[error("Idle timeout must be at least the sweep interval")]
    IdleTimeoutBelowSweepInterval,

    #[error("Sweep interval must be at least 1 second")]
    InvalidSweepInterval,
}
