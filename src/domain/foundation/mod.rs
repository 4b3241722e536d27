//! Foundation value objects shared across the domain.

mod errors;
mod events;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{EventEnvelope, EventId, EventPriority};
pub use ids::{ClientId, JobId, RequestId};
pub use timestamp::Timestamp;
