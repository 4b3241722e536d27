//! Per-request processing context threaded through pipeline stages.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;

use super::foundation::{ClientId, RequestId, Timestamp};

/// Context owned by a single pipeline invocation.
///
/// Created at pipeline entry and discarded after completion or failure. The
/// context is exclusively owned by the task processing the request, so no
/// locking is involved.
///
/// Stage timings are insert-once: once a stage records its duration the entry
/// is permanent for the context's lifetime, and later stages can never
/// overwrite it.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub request_id: RequestId,
    pub client_id: Option<ClientId>,
    pub started_at: Timestamp,
    started_instant: Instant,
    timings: BTreeMap<String, Duration>,
    stage_metadata: BTreeMap<String, BTreeMap<String, JsonValue>>,
    total_duration: Option<Duration>,
}

impl ProcessingContext {
    /// Creates a context for a new request.
    pub fn new(request_id: RequestId, client_id: Option<ClientId>) -> Self {
        Self {
            request_id,
            client_id,
            started_at: Timestamp::now(),
            started_instant: Instant::now(),
            timings: BTreeMap::new(),
            stage_metadata: BTreeMap::new(),
            total_duration: None,
        }
    }

    /// Records the wall-clock duration of a completed stage.
    ///
    /// Returns false (and leaves the existing entry untouched) if the stage
    /// already has a timing recorded.
    pub fn record_stage_timing(&mut self, stage: impl Into<String>, duration: Duration) -> bool {
        use std::collections::btree_map::Entry;
        match self.timings.entry(stage.into()) {
            Entry::Vacant(entry) => {
                entry.insert(duration);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Returns the recorded timing for a stage, if any.
    pub fn stage_timing(&self, stage: &str) -> Option<Duration> {
        self.timings.get(stage).copied()
    }

    /// Number of stages that have recorded a timing so far.
    pub fn timing_count(&self) -> usize {
        self.timings.len()
    }

    /// Attaches a metadata field under the given stage's namespace.
    pub fn add_stage_metadata(
        &mut self,
        stage: impl Into<String>,
        key: impl Into<String>,
        value: JsonValue,
    ) {
        self.stage_metadata
            .entry(stage.into())
            .or_default()
            .insert(key.into(), value);
    }

    /// Returns a metadata field recorded by a stage, if any.
    pub fn stage_metadata(&self, stage: &str, key: &str) -> Option<&JsonValue> {
        self.stage_metadata.get(stage).and_then(|m| m.get(key))
    }

    /// Time elapsed since pipeline entry.
    pub fn elapsed(&self) -> Duration {
        self.started_instant.elapsed()
    }

    /// Marks the pipeline run complete, freezing the total duration.
    pub fn mark_complete(&mut self) {
        if self.total_duration.is_none() {
            self.total_duration = Some(self.started_instant.elapsed());
        }
    }

    /// Total pipeline duration, present only after completion.
    pub fn total_duration(&self) -> Option<Duration> {
        self.total_duration
    }
}
