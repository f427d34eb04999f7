//! Ollama access for memebot.
//!
//! The bot's chat and generate calls all go to a single local Ollama model,
//! which must not be hit concurrently. [`OllamaQueue`] submits every call
//! through a [`memebot_dispatch::Dispatcher`] so that they run one at a time,
//! highest priority first, with optional queue-position updates for callers
//! that want to tell a user where they stand.
//!
//! # Example
//!
//! ```rust,no_run
//! use memebot_llm::{ChatMessage, ChatOptions, OllamaQueue, OllamaQueueOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let queue = OllamaQueue::new(OllamaQueueOptions::default()).unwrap();
//!
//!     let reply = queue
//!         .chat(
//!             ChatOptions::new(vec![ChatMessage::user("tell me a joke")])
//!                 .with_priority(1)
//!                 .on_position(|p| println!("waiting: {}/{}", p.position, p.total)),
//!         )
//!         .await
//!         .unwrap();
//!     println!("{}", reply.message.content);
//! }
//! ```

mod backend;
mod error;
mod ollama;
mod queue;
mod types;

pub use backend::{BackendRequest, BackendResponse, InferenceBackend};
pub use error::{BackendError, LlmError, SetupError};
pub use ollama::{OllamaClient, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
pub use queue::{ChatOptions, GenerateOptions, OllamaQueue, OllamaQueueOptions, DEFAULT_MODEL};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, KeepAlive,
};

// Re-export async_trait for convenience when implementing InferenceBackend
pub use async_trait::async_trait;
