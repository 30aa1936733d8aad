//! Domain layer for the issue mirror
//!
//! Canonical issue model, provider payload types, errors, and the ports
//! the sync core talks to.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{ConfigError, PayloadError, ProviderError, SinkError};
