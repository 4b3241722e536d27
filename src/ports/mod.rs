//! Ports - Trait interfaces between the application core and adapters.
//!
//! Ports define WHAT the system needs without specifying HOW it is provided.
//! Adapters implement these traits; the application layer wires them together.

mod audio_converter;
mod event_publisher;
mod event_subscriber;
mod synthesis;
mod transcription;
mod transport;

pub use audio_converter::AudioConverter;
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventBus, EventHandler, EventMiddleware, EventSubscriber};
pub use synthesis::{SynthesisProvider, SynthesisRequest, SynthesizedAudio};
pub use transcription::{JobStatus, Transcript, TranscriptionProvider, TranscriptionRequest};
pub use transport::MessageTransport;
