//! SynthesisProvider port - Interface to text-to-speech engines.

use async_trait::async_trait;

use crate::domain::foundation::{ClientId, DomainError, JobId, RequestId};

use super::JobStatus;

/// A unit of synthesis work handed to a provider.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub request_id: RequestId,
    pub text: String,
    pub voice: String,
    pub language: Option<String>,
    pub client_id: Option<ClientId>,
}

/// Result of a completed synthesis.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub audio: Vec<u8>,
    pub format: String,
    pub duration_secs: f64,
    pub voice_used: String,
}

/// Port to an external text-to-speech engine.
///
/// Same submit/poll shape as [`super::TranscriptionProvider`]; completion is
/// never assumed to be synchronous.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Submit text for synthesis, returning a job handle.
    async fn submit(&self, request: SynthesisRequest) -> Result<JobId, DomainError>;

    /// Fetch the result if the job has completed.
    ///
    /// Returns `Ok(None)` while the job is still in flight.
    async fn get_result(&self, job_id: JobId) -> Result<Option<SynthesizedAudio>, DomainError>;

    /// Current lifecycle state of the job.
    async fn get_status(&self, job_id: JobId) -> Result<JobStatus, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_provider_object_safe(_: &dyn SynthesisProvider) {}
}
