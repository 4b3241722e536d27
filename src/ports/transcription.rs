//! TranscriptionProvider port - Interface to speech-to-text engines.
//!
//! The pipeline never assumes synchronous completion: work is submitted,
//! then polled for a result under a bounded deadline enforced by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ClientId, DomainError, JobId, RequestId};

/// Lifecycle state of a submitted provider job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A unit of transcription work handed to a provider.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub request_id: RequestId,
    pub audio: Vec<u8>,
    pub format: String,
    pub sample_rate: Option<u32>,
    pub model: String,
    pub language: Option<String>,
    pub client_id: Option<ClientId>,
}

/// Result of a completed transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub language: String,
    pub confidence: Option<f64>,
    pub model_used: String,
}

/// Port to an external speech-to-text engine.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Submit audio for transcription, returning a job handle.
    async fn submit(&self, request: TranscriptionRequest) -> Result<JobId, DomainError>;

    /// Fetch the result if the job has completed.
    ///
    /// Returns `Ok(None)` while the job is still in flight. A failed job
    /// returns `Err` with the provider's reason.
    async fn get_result(&self, job_id: JobId) -> Result<Option<Transcript>, DomainError>;

    /// Current lifecycle state of the job.
    async fn get_status(&self, job_id: JobId) -> Result<JobStatus, DomainError>;
}
