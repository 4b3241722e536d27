//! Application layer - Service assembly and lifecycle.

mod bootstrap;

pub use bootstrap::App;
