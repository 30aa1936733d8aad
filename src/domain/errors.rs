//! Domain errors for the issue mirror.

use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("User allow-list cannot be empty")]
    EmptyUserAllowList,

    #[error("Repository allow-list cannot be empty")]
    EmptyRepositoryAllowList,

    #[error("Invalid repository: {0}. Must be of the form owner/name")]
    InvalidRepository(String),

    #[error("Invalid schedule {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error(
        "Schedule {expression:?} ticks up to {period_secs}s apart, \
         longer than the {retention_secs}s poll retention window"
    )]
    ScheduleExceedsRetention {
        expression: String,
        period_secs: u64,
        retention_secs: u64,
    },

    #[error("Invalid promotion marker: {0:?}. Must be a non-empty word")]
    InvalidPromotionMarker(String),

    #[error("Invalid debounce interval: {0}ms. Must be positive")]
    InvalidDebounceInterval(u64),

    #[error("Invalid poll retention window: {0}ms. Must be positive")]
    InvalidRetentionWindow(u64),

    #[error("Invalid semaphore limit: {0}. Must be at least 1")]
    InvalidSemaphoreLimit(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors raised by the issue provider client.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Provider rate limit exceeded")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Errors raised by downstream sinks (workspace mirror, ticket tracker).
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Sink rejected write: {0}")]
    Rejected(String),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors decoding a webhook delivery body.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Payload carries neither an issue nor a pull request")]
    MissingItem,

    #[error("Payload carries no repository")]
    MissingRepository,
}

pub type ProviderResult<T> = Result<T, ProviderError>;
pub type SinkResult<T> = Result<T, SinkError>;
