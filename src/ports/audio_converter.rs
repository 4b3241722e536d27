//! AudioConverter port - Interface to external format conversion.
//!
//! Actual transcoding (ffmpeg or similar) lives outside the orchestration
//! core; the conversion stage only drives this port.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

/// Port to an external audio transcoder.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// Convert audio bytes from one container format to another at the
    /// requested sample rate.
    async fn convert(
        &self,
        data: Vec<u8>,
        from_format: &str,
        to_format: &str,
        sample_rate: u32,
    ) -> Result<Vec<u8>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_converter_object_safe(_: &dyn AudioConverter) {}
}
