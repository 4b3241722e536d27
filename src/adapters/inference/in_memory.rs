//! In-memory inference providers for development and tests.
//!
//! Both providers honor the submit-then-poll contract: a job is not complete
//! until its simulated latency has elapsed, so callers exercise the same
//! polling path they would against a real engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::foundation::{DomainError, ErrorCode, JobId};
use crate::ports::{
    JobStatus, SynthesisProvider, SynthesisRequest, SynthesizedAudio, Transcript,
    TranscriptionProvider, TranscriptionRequest,
};

struct Job<T> {
    result: Result<T, String>,
    ready_at: Instant,
}

impl<T> Job<T> {
    fn status(&self) -> JobStatus {
        if Instant::now() < self.ready_at {
            JobStatus::Processing
        } else if self.result.is_ok() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    }
}

/// Transcription provider that fabricates a transcript describing its input.
pub struct InMemoryTranscriber {
    jobs: Mutex<HashMap<JobId, Job<Transcript>>>,
    latency: Duration,
    fail_next: AtomicBool,
}

impl InMemoryTranscriber {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Provider whose jobs stay in-flight for the given duration.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            latency,
            fail_next: AtomicBool::new(false),
        }
    }

    /// Make the next submitted job fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Default for InMemoryTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptionProvider for InMemoryTranscriber {
    async fn submit(&self, request: TranscriptionRequest) -> Result<JobId, DomainError> {
        if request.audio.is_empty() {
            return Err(DomainError::new(
                ErrorCode::EmptyPayload,
                "cannot transcribe empty audio",
            ));
        }

        let job_id = JobId::new();
        let result = if self.fail_next.swap(false, Ordering::SeqCst) {
            Err("simulated transcription failure".to_string())
        } else {
            Ok(Transcript {
                text: format!(
                    "transcribed {} bytes of {} audio",
                    request.audio.len(),
                    request.format
                ),
                language: request.language.unwrap_or_else(|| "en".to_string()),
                confidence: Some(0.95),
                model_used: request.model,
            })
        };

        debug!(job_id = %job_id, "in-memory transcription job created");
        self.jobs.lock().expect("transcriber lock poisoned").insert(
            job_id,
            Job {
                result,
                ready_at: Instant::now() + self.latency,
            },
        );
        Ok(job_id)
    }

    async fn get_result(&self, job_id: JobId) -> Result<Option<Transcript>, DomainError> {
        let jobs = self.jobs.lock().expect("transcriber lock poisoned");
        let job = jobs.get(&job_id).ok_or_else(|| {
            DomainError::new(ErrorCode::JobNotFound, "unknown transcription job")
                .with_detail("job_id", job_id.to_string())
        })?;

        if !job.status().is_terminal() {
            return Ok(None);
        }
        match &job.result {
            Ok(transcript) => Ok(Some(transcript.clone())),
            Err(reason) => Err(DomainError::new(ErrorCode::ProviderError, reason.clone())),
        }
    }

    async fn get_status(&self, job_id: JobId) -> Result<JobStatus, DomainError> {
        let jobs = self.jobs.lock().expect("transcriber lock poisoned");
        let job = jobs.get(&job_id).ok_or_else(|| {
            DomainError::new(ErrorCode::JobNotFound, "unknown transcription job")
                .with_detail("job_id", job_id.to_string())
        })?;
        Ok(job.status())
    }
}

/// Synthesis provider that renders deterministic bytes from its input text.
pub struct InMemorySynthesizer {
    jobs: Mutex<HashMap<JobId, Job<SynthesizedAudio>>>,
    latency: Duration,
    fail_next: AtomicBool,
}

impl InMemorySynthesizer {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Provider whose jobs stay in-flight for the given duration.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            latency,
            fail_next: AtomicBool::new(false),
        }
    }

    /// Make the next submitted job fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Default for InMemorySynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisProvider for InMemorySynthesizer {
    async fn submit(&self, request: SynthesisRequest) -> Result<JobId, DomainError> {
        if request.text.trim().is_empty() {
            return Err(DomainError::new(
                ErrorCode::EmptyPayload,
                "cannot synthesize empty text",
            ));
        }

        let job_id = JobId::new();
        let result = if self.fail_next.swap(false, Ordering::SeqCst) {
            Err("simulated synthesis failure".to_string())
        } else {
            // Roughly 150 words per minute of speech.
            let words = request.text.split_whitespace().count().max(1);
            Ok(SynthesizedAudio {
                audio: request.text.as_bytes().to_vec(),
                format: "mp3".to_string(),
                duration_secs: words as f64 * 60.0 / 150.0,
                voice_used: request.voice,
            })
        };

        debug!(job_id = %job_id, "in-memory synthesis job created");
        self.jobs.lock().expect("synthesizer lock poisoned").insert(
            job_id,
            Job {
                result,
                ready_at: Instant::now() + self.latency,
            },
        );
        Ok(job_id)
    }

    async fn get_result(&self, job_id: JobId) -> Result<Option<SynthesizedAudio>, DomainError> {
        let jobs = self.jobs.lock().expect("synthesizer lock poisoned");
        let job = jobs.get(&job_id).ok_or_else(|| {
            DomainError::new(ErrorCode::JobNotFound, "unknown synthesis job")
                .with_detail("job_id", job_id.to_string())
        })?;

        if !job.status().is_terminal() {
            return Ok(None);
        }
        match &job.result {
            Ok(audio) => Ok(Some(audio.clone())),
            Err(reason) => Err(DomainError::new(ErrorCode::ProviderError, reason.clone())),
        }
    }

    async fn get_status(&self, job_id: JobId) -> Result<JobStatus, DomainError> {
        let jobs = self.jobs.lock().expect("synthesizer lock poisoned");
        let job = jobs.get(&job_id).ok_or_else(|| {
            DomainError::new(ErrorCode::JobNotFound, "unknown synthesis job")
                .with_detail("job_id", job_id.to_string())
        })?;
        Ok(job.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::RequestId;

    fn transcription_request() -> TranscriptionRequest {
        TranscriptionRequest {
            request_id: RequestId::new(),
            audio: vec![1, 2, 3],
            format: "wav".to_string(),
            sample_rate: Some(16000),
            model: "base".to_string(),
            language: None,
            client_id: None,
        }
    }

    #[tokio::test]
    async fn transcriber_completes_immediately_without_latency() {
        let provider = InMemoryTranscriber::new();
        let job_id = provider.submit(transcription_request()).await.unwrap();

        let transcript = provider.get_result(job_id).await.unwrap().unwrap();
        assert_eq!(transcript.text, "transcribed 3 bytes of wav audio");
        assert_eq!(transcript.model_used, "base");
        assert_eq!(
            provider.get_status(job_id).await.unwrap(),
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn transcriber_with_latency_reports_in_flight() {
        let provider = InMemoryTranscriber::with_latency(Duration::from_secs(60));
        let job_id = provider.submit(transcription_request()).await.unwrap();

        assert!(provider.get_result(job_id).await.unwrap().is_none());
        assert_eq!(
            provider.get_status(job_id).await.unwrap(),
            JobStatus::Processing
        );
    }

    #[tokio::test]
    async fn transcriber_rejects_empty_audio() {
        let provider = InMemoryTranscriber::new();
        let mut request = transcription_request();
        request.audio.clear();

        let err = provider.submit(request).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyPayload);
    }

    #[tokio::test]
    async fn transcriber_fail_next_fails_one_job() {
        let provider = InMemoryTranscriber::new();
        provider.fail_next();

        let failed = provider.submit(transcription_request()).await.unwrap();
        assert!(provider.get_result(failed).await.is_err());
        assert_eq!(
            provider.get_status(failed).await.unwrap(),
            JobStatus::Failed
        );

        let ok = provider.submit(transcription_request()).await.unwrap();
        assert!(provider.get_result(ok).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let provider = InMemoryTranscriber::new();
        let err = provider.get_result(JobId::new()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::JobNotFound);
    }

    #[tokio::test]
    async fn synthesizer_uses_requested_voice() {
        let provider = InMemorySynthesizer::new();
        let job_id = provider
            .submit(SynthesisRequest {
                request_id: RequestId::new(),
                text: "hello world".to_string(),
                voice: "alto".to_string(),
                language: None,
                client_id: None,
            })
            .await
            .unwrap();

        let audio = provider.get_result(job_id).await.unwrap().unwrap();
        assert_eq!(audio.voice_used, "alto");
        assert!(!audio.audio.is_empty());
        assert!(audio.duration_secs > 0.0);
    }

    #[tokio::test]
    async fn synthesizer_rejects_blank_text() {
        let provider = InMemorySynthesizer::new();
        let err = provider
            .submit(SynthesisRequest {
                request_id: RequestId::new(),
                text: "  ".to_string(),
                voice: "alto".to_string(),
                language: None,
                client_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyPayload);
    }
}
