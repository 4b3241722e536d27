//! Metrics handler - Wildcard event handler keeping service counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventHandler;

/// Snapshot of the counters kept by [`MetricsHandler`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_transcriptions: u64,
    pub total_syntheses: u64,
    pub total_failures: u64,
    pub events_by_type: HashMap<String, u64>,
}

/// Counts events by type plus a few headline totals.
///
/// Subscribed as a wildcard handler so every event is counted. Transcription
/// work is counted at upload time, synthesis work at submission time, so the
/// totals reflect demand rather than completion.
#[derive(Default)]
pub struct MetricsHandler {
    total_transcriptions: AtomicU64,
    total_syntheses: AtomicU64,
    total_failures: AtomicU64,
    events_by_type: RwLock<HashMap<String, u64>>,
}

impl MetricsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_transcriptions: self.total_transcriptions.load(Ordering::Relaxed),
            total_syntheses: self.total_syntheses.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            events_by_type: self
                .events_by_type
                .read()
                .expect("metrics lock poisoned")
                .clone(),
        }
    }
}

#[async_trait]
impl EventHandler for MetricsHandler {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        match event.event_type.as_str() {
            "audio.uploaded" => {
                self.total_transcriptions.fetch_add(1, Ordering::Relaxed);
            }
            "tts.text_submitted" => {
                self.total_syntheses.fetch_add(1, Ordering::Relaxed);
            }
            "transcription.failed" | "tts.synthesis_failed" => {
                self.total_failures.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        *self
            .events_by_type
            .write()
            .expect("metrics lock poisoned")
            .entry(event.event_type.clone())
            .or_insert(0) += 1;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}
