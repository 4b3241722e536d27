//! Domain layer - value objects, payloads, and the event vocabulary.

mod context;
pub mod events;
pub mod foundation;
mod media;

pub use context::ProcessingContext;
pub use media::{AudioData, PipelinePayload, TextData};
