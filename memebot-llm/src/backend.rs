//! Backend trait for inference round-trips.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::{ChatRequest, ChatResponse, GenerateRequest, GenerateResponse};

/// A single request to the inference service.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    Chat(ChatRequest),
    Generate(GenerateRequest),
}

impl BackendRequest {
    #[inline]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::Generate(_) => "generate",
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        match self {
            Self::Chat(request) => &request.model,
            Self::Generate(request) => &request.model,
        }
    }
}

/// The service's answer to a [`BackendRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    Chat(ChatResponse),
    Generate(GenerateResponse),
}

impl BackendResponse {
    #[inline]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::Generate(_) => "generate",
        }
    }

    pub fn into_chat(self) -> Result<ChatResponse, BackendError> {
        match self {
            Self::Chat(response) => Ok(response),
            other => Err(BackendError::UnexpectedResponse {
                expected: "chat",
                actual: other.kind(),
            }),
        }
    }

    pub fn into_generate(self) -> Result<GenerateResponse, BackendError> {
        match self {
            Self::Generate(response) => Ok(response),
            other => Err(BackendError::UnexpectedResponse {
                expected: "generate",
                actual: other.kind(),
            }),
        }
    }
}

/// Performs one blocking round-trip against an inference service.
///
/// Implementations do not need to be safe to call concurrently: the
/// [`OllamaQueue`](crate::OllamaQueue) only ever has one call in flight.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn call(&self, request: BackendRequest) -> Result<BackendResponse, BackendError>;
}
