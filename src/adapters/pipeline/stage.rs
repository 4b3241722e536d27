//! Pipeline stage trait and the sequential pipeline driver.
//!
//! A pipeline is an ordered list of stages. The driver runs them one after
//! another, threading the payload by value and the context by mutable
//! reference. The first stage error stops the run; skipped stages (those
//! whose `can_process` declines the payload) do not.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::foundation::DomainError;
use crate::domain::{PipelinePayload, ProcessingContext};

/// One step of a processing pipeline.
#[async_trait]
pub trait PipelineStage<P>: Send + Sync
where
    P: Send + 'static,
{
    /// Stage name for timing entries and failure attribution.
    fn name(&self) -> &'static str;

    /// Whether this stage applies to the payload in its current shape and
    /// the run's context state.
    ///
    /// Declining is not an error; the driver skips the stage and moves on.
    fn can_process(&self, payload: &P, ctx: &ProcessingContext) -> bool {
        let _ = (payload, ctx);
        true
    }

    /// Transform the payload.
    async fn process(&self, payload: P, ctx: &mut ProcessingContext) -> Result<P, DomainError>;
}

/// Ordered composition of stages over one payload type.
///
/// The driver owns cross-cutting bookkeeping so stages stay focused on
/// domain work: it measures each stage's wall-clock duration, records it
/// insert-once under the stage name, and attributes failures to the stage
/// that produced them.
pub struct MediaPipeline<P>
where
    P: PipelinePayload + Send + 'static,
{
    name: String,
    stages: Vec<Arc<dyn PipelineStage<P>>>,
}

impl<P> MediaPipeline<P>
where
    P: PipelinePayload + Send + 'static,
{
    /// Creates an empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage (builder style). Order of addition is order of
    /// execution.
    pub fn with_stage(mut self, stage: Arc<dyn PipelineStage<P>>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Pipeline name, used for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the composed stages, in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs the payload through every applicable stage in order.
    ///
    /// On success the payload is tagged `pipeline_completed` and the context
    /// total duration is frozen. On the first stage error the run stops and
    /// the error is returned carrying the failing stage's name; timings for
    /// stages that already completed remain in the context.
    pub async fn execute(
        &self,
        payload: P,
        ctx: &mut ProcessingContext,
    ) -> Result<P, DomainError> {
        debug!(
            pipeline = %self.name,
            request_id = %ctx.request_id,
            stages = self.stages.len(),
            "pipeline started"
        );

        let mut payload = payload;
        for stage in &self.stages {
            if !stage.can_process(&payload, ctx) {
                debug!(
                    pipeline = %self.name,
                    stage = stage.name(),
                    "stage skipped"
                );
                continue;
            }

            let started = Instant::now();
            match stage.process(payload, ctx).await {
                Ok(next) => {
                    ctx.record_stage_timing(stage.name(), started.elapsed());
                    payload = next;
                }
                Err(err) => {
                    ctx.record_stage_timing(stage.name(), started.elapsed());
                    warn!(
                        pipeline = %self.name,
                        stage = stage.name(),
                        request_id = %ctx.request_id,
                        error = %err,
                        "stage failed, aborting pipeline"
                    );
                    return Err(err.with_stage(stage.name()));
                }
            }
        }

        ctx.mark_complete();
        let total = ctx.total_duration().unwrap_or_default();
        debug!(
            pipeline = %self.name,
            request_id = %ctx.request_id,
            total_ms = total.as_millis() as u64,
            "pipeline completed"
        );
        Ok(payload
            .with_meta("pipeline_completed", json!(true))
            .with_meta("total_processing_time", json!(total.as_secs_f64())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ErrorCode, RequestId};
    use crate::domain::AudioData;

    struct AppendStage {
        name: &'static str,
        byte: u8,
    }

    #[async_trait]
    impl PipelineStage<AudioData> for AppendStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn process(
            &self,
            payload: AudioData,
            _ctx: &mut ProcessingContext,
        ) -> Result<AudioData, DomainError> {
            let mut data = payload.data.clone();
            data.push(self.byte);
            Ok(payload.with_data(data))
        }
    }

    struct FailingStage;

    #[async_trait]
    impl PipelineStage<AudioData> for FailingStage {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn process(
            &self,
            _payload: AudioData,
            _ctx: &mut ProcessingContext,
        ) -> Result<AudioData, DomainError> {
            Err(DomainError::new(ErrorCode::ProviderError, "stage exploded"))
        }
    }

    struct WavOnlyStage;

    #[async_trait]
    impl PipelineStage<AudioData> for WavOnlyStage {
        fn name(&self) -> &'static str {
            "wav_only"
        }

        fn can_process(&self, payload: &AudioData, _ctx: &ProcessingContext) -> bool {
            payload.format == "wav"
        }

        async fn process(
            &self,
            payload: AudioData,
            ctx: &mut ProcessingContext,
        ) -> Result<AudioData, DomainError> {
            ctx.add_stage_metadata("wav_only", "ran", json!(true));
            Ok(payload)
        }
    }

    /// Declines once an earlier stage has left its marker in the context.
    struct UnlessMarkedStage;

    #[async_trait]
    impl PipelineStage<AudioData> for UnlessMarkedStage {
        fn name(&self) -> &'static str {
            "unless_marked"
        }

        fn can_process(&self, _payload: &AudioData, ctx: &ProcessingContext) -> bool {
            ctx.stage_metadata("wav_only", "ran").is_none()
        }

        async fn process(
            &self,
            payload: AudioData,
            _ctx: &mut ProcessingContext,
        ) -> Result<AudioData, DomainError> {
            Ok(payload.with_meta("unmarked", json!(true)))
        }
    }

    fn ctx() -> ProcessingContext {
        ProcessingContext::new(RequestId::new(), None)
    }

    #[tokio::test]
    async fn stages_run_in_order_and_thread_payload() {
        let pipeline = MediaPipeline::new("test")
            .with_stage(Arc::new(AppendStage { name: "s1", byte: 1 }))
            .with_stage(Arc::new(AppendStage { name: "s2", byte: 2 }));

        let mut ctx = ctx();
        let out = pipeline
            .execute(AudioData::new(vec![0], "wav"), &mut ctx)
            .await
            .unwrap();

        assert_eq!(out.data, vec![0, 1, 2]);
        assert_eq!(ctx.timing_count(), 2);
        assert!(ctx.stage_timing("s1").is_some());
        assert!(ctx.stage_timing("s2").is_some());
    }

    #[tokio::test]
    async fn success_tags_payload_completed_with_total_time() {
        let pipeline =
            MediaPipeline::new("test").with_stage(Arc::new(AppendStage { name: "s1", byte: 1 }));

        let mut ctx = ctx();
        let out = pipeline
            .execute(AudioData::new(vec![], "wav"), &mut ctx)
            .await
            .unwrap();

        assert_eq!(out.meta("pipeline_completed"), Some(&json!(true)));
        assert!(out.meta("total_processing_time").is_some());
        assert!(ctx.total_duration().is_some());
    }

    #[tokio::test]
    async fn first_error_stops_pipeline_and_names_stage() {
        let pipeline = MediaPipeline::new("test")
            .with_stage(Arc::new(AppendStage { name: "s1", byte: 1 }))
            .with_stage(Arc::new(FailingStage))
            .with_stage(Arc::new(AppendStage { name: "s3", byte: 3 }));

        let mut ctx = ctx();
        let err = pipeline
            .execute(AudioData::new(vec![], "wav"), &mut ctx)
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ProviderError);
        assert_eq!(err.details.get("stage"), Some(&"failing".to_string()));
        // s3 never ran; s1 and the failing stage have timings.
        assert_eq!(ctx.timing_count(), 2);
        assert!(ctx.stage_timing("s3").is_none());
        assert!(ctx.total_duration().is_none());
    }

    #[tokio::test]
    async fn declining_stage_is_skipped_without_timing() {
        let pipeline = MediaPipeline::new("test")
            .with_stage(Arc::new(WavOnlyStage))
            .with_stage(Arc::new(AppendStage { name: "s2", byte: 2 }));

        let mut ctx = ctx();
        let out = pipeline
            .execute(AudioData::new(vec![0], "webm"), &mut ctx)
            .await
            .unwrap();

        assert_eq!(out.data, vec![0, 2]);
        assert!(ctx.stage_timing("wav_only").is_none());
        assert_eq!(ctx.stage_metadata("wav_only", "ran"), None);
    }

    #[tokio::test]
    async fn stage_can_decline_on_context_state() {
        let pipeline = MediaPipeline::new("test")
            .with_stage(Arc::new(WavOnlyStage))
            .with_stage(Arc::new(UnlessMarkedStage));

        // The wav stage runs and marks the context, so the second stage skips.
        let mut ctx_wav = ctx();
        let out = pipeline
            .execute(AudioData::new(vec![0], "wav"), &mut ctx_wav)
            .await
            .unwrap();
        assert_eq!(out.meta("unmarked"), None);

        // No marker on the webm path, so the second stage runs.
        let mut ctx_webm = ctx();
        let out = pipeline
            .execute(AudioData::new(vec![0], "webm"), &mut ctx_webm)
            .await
            .unwrap();
        assert_eq!(out.meta("unmarked"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn empty_pipeline_passes_payload_through() {
        let pipeline: MediaPipeline<AudioData> = MediaPipeline::new("empty");
        let mut ctx = ctx();
        let out = pipeline
            .execute(AudioData::new(vec![7], "wav"), &mut ctx)
            .await
            .unwrap();

        assert_eq!(out.data, vec![7]);
        assert_eq!(out.meta("pipeline_completed"), Some(&json!(true)));
        assert_eq!(ctx.timing_count(), 0);
    }

    #[test]
    fn stage_names_reflect_composition_order() {
        let pipeline = MediaPipeline::new("test")
            .with_stage(Arc::new(AppendStage { name: "s1", byte: 1 }))
            .with_stage(Arc::new(WavOnlyStage));

        assert_eq!(pipeline.stage_names(), vec!["s1", "wav_only"]);
    }
}
