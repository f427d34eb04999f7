//! HTTP client for the Ollama REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{BackendRequest, BackendResponse, InferenceBackend};
use crate::error::BackendError;

/// Default Ollama endpoint.
pub const DEFAULT_API_URL: &str = "http://localhost:11434";

/// Generations on a cold model can take minutes.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// [`InferenceBackend`] speaking to an Ollama server over HTTP.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Creates a client for `base_url` with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client for `base_url` with a specific request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(concat!("memebot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "sending request to ollama");

        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            warn!(%url, error = %e, "ollama request failed");
            BackendError::Network(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%url, %status, "ollama returned an error");
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        response.json::<R>().await.map_err(|e| {
            warn!(%url, error = %e, "failed to decode ollama response");
            BackendError::Parse(e.to_string())
        })
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn call(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        match request {
            BackendRequest::Chat(body) => {
                self.post("/api/chat", &body).await.map(BackendResponse::Chat)
            }
            BackendRequest::Generate(body) => self
                .post("/api/generate", &body)
                .await
                .map(BackendResponse::Generate),
        }
    }
}

/// Ollama reports failures as `{"error": "..."}`; fall back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.to_string())
}
