//! Infrastructure layer module
//!
//! This module contains the adapters and external integrations:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - GitHub REST client
//! - Webhook HTTP receiver
//! - Dry-run workspace mirror and ticket tracker
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod config;
pub mod github;
pub mod logging;
pub mod mirror;
pub mod webhook;
