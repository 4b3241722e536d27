//! Adapters - Concrete implementations of the ports.

pub mod container;
pub mod events;
pub mod inference;
pub mod pipeline;
pub mod websocket;
