//! Development audio converter.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::AudioConverter;

/// Converter that relabels audio without transcoding.
///
/// Stands in where a real transcoder (ffmpeg behind the same port) is not
/// wired up. Bytes pass through untouched, so downstream consumers must not
/// depend on the container format actually changing.
#[derive(Default)]
pub struct PassthroughConverter;

impl PassthroughConverter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioConverter for PassthroughConverter {
    async fn convert(
        &self,
        data: Vec<u8>,
        from_format: &str,
        to_format: &str,
        sample_rate: u32,
    ) -> Result<Vec<u8>, DomainError> {
        if data.is_empty() {
            return Err(DomainError::new(
                ErrorCode::EmptyPayload,
                "cannot convert empty audio",
            ));
        }
        debug!(
            from = from_format,
            to = to_format,
            sample_rate,
            bytes = data.len(),
            "passthrough conversion"
        );
        Ok(data)
    }
}
