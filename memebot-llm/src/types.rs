//! Ollama request and response bodies.
//!
//! Only the non-streaming subset of `/api/chat` and `/api/generate` is
//! modelled. See https://github.com/ollama/ollama/blob/main/docs/api.md

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How long the server keeps the model loaded after a request.
///
/// Ollama accepts either a duration string (`"5m"`, `"1h"`) or a number of
/// seconds, where negative values keep the model loaded indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeepAlive {
    Duration(String),
    Seconds(i64),
}

impl From<&str> for KeepAlive {
    fn from(value: &str) -> Self {
        match value.trim().parse::<i64>() {
            Ok(seconds) => Self::Seconds(seconds),
            Err(_) => Self::Duration(value.trim().to_string()),
        }
    }
}

impl From<String> for KeepAlive {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, `assistant` or `tool`
    pub role: String,
    pub content: String,
    /// Base64-encoded images for multimodal models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    #[inline]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            images: None,
        }
    }

    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Body for `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// `"json"` or a JSON schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    /// Model parameters such as `temperature` or `num_ctx`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<KeepAlive>,
}

/// Body returned by `POST /api/chat` with `stream: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    pub message: ChatMessage,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

/// Body for `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Overrides the model's prompt template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Context returned by a previous generate call, for short-term memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<KeepAlive>,
}

/// Body returned by `POST /api/generate` with `stream: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub response: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keep_alive_parses_seconds_and_durations() {
        assert_eq!(KeepAlive::from("300"), KeepAlive::Seconds(300));
        assert_eq!(KeepAlive::from("-1"), KeepAlive::Seconds(-1));
        assert_eq!(KeepAlive::from("5m"), KeepAlive::Duration("5m".into()));
    }

    #[test]
    fn generate_request_omits_unset_fields() {
        let request = GenerateRequest {
            model: "llama3".into(),
            prompt: "why is the sky blue?".into(),
            system: None,
            template: None,
            context: None,
            format: None,
            options: None,
            stream: false,
            keep_alive: Some(KeepAlive::Duration("10m".into())),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "llama3",
                "prompt": "why is the sky blue?",
                "stream": false,
                "keep_alive": "10m"
            })
        );
    }

    #[test]
    fn chat_response_tolerates_missing_metrics() {
        let response: ChatResponse = serde_json::from_value(json!({
            "model": "llama3",
            "created_at": "2024-05-01T00:00:00Z",
            "message": { "role": "assistant", "content": "hi" },
            "done": true
        }))
        .unwrap();
        assert_eq!(response.message, ChatMessage::assistant("hi"));
        assert!(response.eval_count.is_none());
    }
}
