//! Inference adapters - Provider implementations.

mod converter;
mod in_memory;

pub use converter::PassthroughConverter;
pub use in_memory::{InMemorySynthesizer, InMemoryTranscriber};
