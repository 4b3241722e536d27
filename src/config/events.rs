//! Event bus configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Event bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventBusConfig {
    /// Bounded queue capacity; publishers block when full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How many dead-lettered events to retain
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
}

impl EventBusConfig {
    /// Validate event bus configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        if self.dead_letter_capacity == 0 {
            return Err(ValidationError::InvalidDeadLetterCapacity);
        }
        Ok(())
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            dead_letter_capacity: default_dead_letter_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_dead_letter_capacity() -> usize {
    100
}
