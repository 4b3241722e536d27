//! Voicebridge - Real-time voice transcription and synthesis service.
//!
//! An event-driven orchestration core: clients connect over WebSocket, audio
//! and text flow through composable processing pipelines, and every step of
//! the work is announced on an in-process event bus.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
