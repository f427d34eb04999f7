//! Error types for the inference backend.

use memebot_dispatch::RequestError;
use thiserror::Error;

/// Errors raised by a single backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse backend response: {0}")]
    Parse(String),

    #[error("backend answered a {expected} request with a {actual} response")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },
}

/// What `chat` and `generate` resolve to on failure.
pub type LlmError = RequestError<BackendError>;

/// Errors raised while building an [`OllamaQueue`](crate::OllamaQueue).
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Dispatch(#[from] memebot_dispatch::DispatchError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
