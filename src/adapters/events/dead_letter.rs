//! Dead-letter sink for events that could not be dispatched.
//!
//! Events land here when middleware rejects them or when every registered
//! handler fails. Entries are retained in a bounded buffer for inspection;
//! there is no automatic retry.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::domain::foundation::{EventEnvelope, Timestamp};

/// Why an event was dead-lettered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// A middleware rejected the event before any handler ran.
    MiddlewareRejected { middleware: String, message: String },
    /// Every handler registered for the event failed.
    AllHandlersFailed { failures: Vec<String> },
}

/// A dead-lettered event together with the failure that stranded it.
#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub event: EventEnvelope,
    pub reason: DeadLetterReason,
    pub dead_lettered_at: Timestamp,
}

/// Bounded in-memory dead-letter buffer.
///
/// When full, the oldest entry is evicted to make room. Operators drain the
/// buffer explicitly; the bus never re-dispatches from it.
pub struct DeadLetterSink {
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    capacity: usize,
}

impl DeadLetterSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    /// Record a stranded event, evicting the oldest entry if at capacity.
    pub fn push(&self, event: EventEnvelope, reason: DeadLetterReason) {
        let entry = DeadLetterEntry {
            event,
            reason,
            dead_lettered_at: Timestamp::now(),
        };
        let mut entries = self.entries.lock().expect("dead letter lock poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("dead letter lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return all entries, oldest first.
    pub fn drain(&self) -> Vec<DeadLetterEntry> {
        let mut entries = self.entries.lock().expect("dead letter lock poisoned");
        entries.drain(..).collect()
    }

    /// Snapshot of current entries without removing them, oldest first.
    pub fn snapshot(&self) -> Vec<DeadLetterEntry> {
        let entries = self.entries.lock().expect("dead letter lock poisoned");
        entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u32) -> EventEnvelope {
        EventEnvelope::new("test.event", "tests").with_payload_field("n", serde_json::json!(n))
    }

    #[test]
    fn push_and_drain_preserves_order() {
        let sink = DeadLetterSink::new(10);
        sink.push(
            event(1),
            DeadLetterReason::MiddlewareRejected {
                middleware: "validator".to_string(),
                message: "bad header".to_string(),
            },
        );
        sink.push(
            event(2),
            DeadLetterReason::AllHandlersFailed {
                failures: vec!["handler_a: boom".to_string()],
            },
        );

        assert_eq!(sink.len(), 2);
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].event.payload.get("n").unwrap(), 1);
        assert_eq!(drained[1].event.payload.get("n").unwrap(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn evicts_oldest_when_full() {
        let sink = DeadLetterSink::new(2);
        for n in 1..=3 {
            sink.push(
                event(n),
                DeadLetterReason::AllHandlersFailed { failures: vec![] },
            );
        }

        let entries = sink.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event.payload.get("n").unwrap(), 2);
        assert_eq!(entries[1].event.payload.get("n").unwrap(), 3);
    }

    proptest::proptest! {
        #[test]
        fn never_exceeds_capacity_and_keeps_newest(
            capacity in 1usize..16,
            pushes in 0u32..64,
        ) {
            let sink = DeadLetterSink::new(capacity);
            for n in 0..pushes {
                sink.push(
                    event(n),
                    DeadLetterReason::AllHandlersFailed { failures: vec![] },
                );
            }

            let entries = sink.snapshot();
            proptest::prop_assert!(entries.len() <= capacity);
            proptest::prop_assert_eq!(entries.len(), (pushes as usize).min(capacity));
            if let Some(last) = entries.last() {
                proptest::prop_assert_eq!(
                    last.event.payload.get("n").unwrap(),
                    &serde_json::json!(pushes - 1)
                );
            }
        }
    }

    #[test]
    fn snapshot_does_not_remove() {
        let sink = DeadLetterSink::new(4);
        sink.push(
            event(7),
            DeadLetterReason::MiddlewareRejected {
                middleware: "validator".to_string(),
                message: "rejected".to_string(),
            },
        );

        assert_eq!(sink.snapshot().len(), 1);
        assert_eq!(sink.len(), 1);
    }
}
