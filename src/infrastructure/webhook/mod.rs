//! HTTP receiver for provider push deliveries.

pub mod server;
pub mod signature;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::domain::errors::PayloadError;

pub use server::{WebhookServer, WEBHOOK_PATH};

/// Reasons a delivery is refused before it reaches the listener.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Missing X-GitHub-Event header")]
    MissingEvent,

    #[error("Missing X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("Signature does not match payload")]
    InvalidSignature,

    #[error("Unusable webhook secret: {0}")]
    InvalidSecret(String),

    #[error("Invalid payload: {0}")]
    Payload(#[from] PayloadError),
}

impl WebhookError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingEvent | Self::Payload(_) => StatusCode::BAD_REQUEST,
            Self::MissingSignature | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::InvalidSecret(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
