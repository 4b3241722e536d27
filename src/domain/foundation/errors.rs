//! Error types for the domain layer.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be at most {max} bytes, got {actual}")]
    TooLarge { field: String, max: usize, actual: usize },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates an oversized field validation error.
    pub fn too_large(field: impl Into<String>, max: usize, actual: usize) -> Self {
        ValidationError::TooLarge {
            field: field.into(),
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error codes organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,
    EmptyPayload,
    UnsupportedFormat,
    PayloadTooLarge,
    InvalidMessage,

    // Not found errors
    ClientNotFound,
    JobNotFound,
    HandlerNotFound,
    ServiceNotRegistered,

    // State errors
    InvalidStateTransition,
    BusStopped,
    ContainerDisposed,
    CircularDependency,

    // Provider errors
    ProviderError,
    ProviderTimeout,

    // Infrastructure errors
    TransportError,
    HandlerError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::EmptyPayload => "EMPTY_PAYLOAD",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::ClientNotFound => "CLIENT_NOT_FOUND",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::HandlerNotFound => "HANDLER_NOT_FOUND",
            ErrorCode::ServiceNotRegistered => "SERVICE_NOT_REGISTERED",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::BusStopped => "BUS_STOPPED",
            ErrorCode::ContainerDisposed => "CONTAINER_DISPOSED",
            ErrorCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            ErrorCode::ProviderError => "PROVIDER_ERROR",
            ErrorCode::ProviderTimeout => "PROVIDER_TIMEOUT",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
            ErrorCode::HandlerError => "HANDLER_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Standard domain error with code, message, and optional details.
#[derive(Debug, Clone)]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, String>,
}

impl DomainError {
    /// Creates a new domain error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Creates a validation error for a specific field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ValidationFailed,
            message: message.into(),
            details: HashMap::new(),
        }
        .with_detail("field", field.into())
    }

    /// Creates a provider timeout error.
    pub fn provider_timeout(provider: impl Into<String>, waited_secs: u64) -> Self {
        Self::new(
            ErrorCode::ProviderTimeout,
            format!("Provider did not complete within {}s", waited_secs),
        )
        .with_detail("provider", provider.into())
    }

    /// Adds a detail to the error.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Records the pipeline stage that produced this error.
    ///
    /// Operators trace failures by component name, so every stage failure
    /// leaving the pipeline carries this detail.
    pub fn with_stage(self, stage: impl Into<String>) -> Self {
        self.with_detail("stage", stage.into())
    }

    /// Records the event handler that produced this error.
    pub fn with_handler(self, handler: impl Into<String>) -> Self {
        self.with_detail("handler", handler.into())
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for DomainError {}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        DomainError::new(ErrorCode::ValidationFailed, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_empty_field_displays_correctly() {
        let err = ValidationError::empty_field("audio_data");
        assert_eq!(format!("{}", err), "Field 'audio_data' cannot be empty");
    }

    #[test]
    fn validation_error_too_large_displays_correctly() {
        let err = ValidationError::too_large("audio_data", 100, 150);
        assert_eq!(
            format!("{}", err),
            "Field 'audio_data' must be at most 100 bytes, got 150"
        );
    }

    #[test]
    fn domain_error_displays_code_and_message() {
        let err = DomainError::new(ErrorCode::ClientNotFound, "Client not found");
        assert_eq!(format!("{}", err), "[CLIENT_NOT_FOUND] Client not found");
    }

    #[test]
    fn domain_error_with_stage_adds_detail() {
        let err = DomainError::new(ErrorCode::ProviderError, "submit failed")
            .with_stage("transcription");

        assert_eq!(err.details.get("stage"), Some(&"transcription".to_string()));
    }

    #[test]
    fn domain_error_with_handler_adds_detail() {
        let err = DomainError::new(ErrorCode::HandlerError, "boom").with_handler("MetricsHandler");
        assert_eq!(
            err.details.get("handler"),
            Some(&"MetricsHandler".to_string())
        );
    }

    #[test]
    fn provider_timeout_carries_provider_name() {
        let err = DomainError::provider_timeout("whisper", 30);
        assert_eq!(err.code, ErrorCode::ProviderTimeout);
        assert_eq!(err.details.get("provider"), Some(&"whisper".to_string()));
    }

    #[test]
    fn validation_error_converts_to_domain_error() {
        let err: DomainError = ValidationError::empty_field("text").into();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.message.contains("text"));
    }
}
