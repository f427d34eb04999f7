//! Serialized chat/generate facade over a [`Dispatcher`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use memebot_dispatch::{
    DispatchStats, Dispatcher, DispatcherConfig, OrderingMode, PositionCallback, QueuePosition,
    Submission, SubmitOptions,
};
use serde_json::Value;

use crate::backend::{BackendRequest, BackendResponse, InferenceBackend};
use crate::error::{BackendError, LlmError, SetupError};
use crate::ollama::{OllamaClient, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, KeepAlive,
};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "llama3";

/// Options for [`OllamaQueue::new`].
#[derive(Debug, Clone)]
pub struct OllamaQueueOptions {
    pub model: String,
    pub api_url: String,
    pub ordering: OrderingMode,
    pub request_timeout: Duration,
    /// Applied to every request that does not set its own.
    pub keep_alive: Option<KeepAlive>,
}

impl Default for OllamaQueueOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            ordering: OrderingMode::Priority,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            keep_alive: None,
        }
    }
}

/// A chat request plus its queueing options.
#[derive(Clone, Default)]
pub struct ChatOptions {
    pub messages: Vec<ChatMessage>,
    pub options: Option<Value>,
    pub format: Option<Value>,
    pub keep_alive: Option<KeepAlive>,
    pub priority: i64,
    pub on_position: Option<PositionCallback>,
}

impl fmt::Debug for ChatOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOptions")
            .field("messages", &self.messages.len())
            .field("priority", &self.priority)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

impl ChatOptions {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: Value) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<KeepAlive>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    #[must_use]
    pub fn on_position<F>(mut self, callback: F) -> Self
    where
        F: Fn(QueuePosition) + Send + Sync + 'static,
    {
        self.on_position = Some(Arc::new(callback));
        self
    }
}

/// A generate request plus its queueing options.
#[derive(Clone, Default)]
pub struct GenerateOptions {
    pub prompt: String,
    pub system: Option<String>,
    pub template: Option<String>,
    pub context: Option<Vec<i64>>,
    pub options: Option<Value>,
    pub format: Option<Value>,
    pub keep_alive: Option<KeepAlive>,
    pub priority: i64,
    pub on_position: Option<PositionCallback>,
}

impl fmt::Debug for GenerateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateOptions")
            .field("prompt_len", &self.prompt.len())
            .field("system", &self.system.is_some())
            .field("priority", &self.priority)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

impl GenerateOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Vec<i64>) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: Value) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<KeepAlive>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    #[must_use]
    pub fn on_position<F>(mut self, callback: F) -> Self
    where
        F: Fn(QueuePosition) + Send + Sync + 'static,
    {
        self.on_position = Some(Arc::new(callback));
        self
    }
}

/// Funnels chat and generate calls for one model through a single-flight
/// [`Dispatcher`], so the backend only ever sees one request at a time.
#[derive(Clone)]
pub struct OllamaQueue {
    dispatcher: Dispatcher,
    backend: Arc<dyn InferenceBackend>,
    model: String,
    keep_alive: Option<KeepAlive>,
}

impl fmt::Debug for OllamaQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaQueue")
            .field("model", &self.model)
            .field("keep_alive", &self.keep_alive)
            .field("dispatcher", &self.dispatcher)
            .field("backend", &"<dyn InferenceBackend>")
            .finish()
    }
}

impl OllamaQueue {
    /// Build a queue talking HTTP to an Ollama server.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(options: OllamaQueueOptions) -> Result<Self, SetupError> {
        let client = OllamaClient::with_timeout(&options.api_url, options.request_timeout)?;
        let dispatcher = Dispatcher::new(DispatcherConfig {
            ordering: options.ordering,
        })?;
        tracing::info!(
            model = %options.model,
            api_url = %client.base_url(),
            ordering = %options.ordering,
            "ollama queue ready"
        );
        Ok(Self::with_backend(options.model, Arc::new(client), dispatcher)
            .with_keep_alive(options.keep_alive))
    }

    /// Build a queue over any backend and an existing dispatcher.
    pub fn with_backend(
        model: impl Into<String>,
        backend: Arc<dyn InferenceBackend>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            dispatcher,
            backend,
            model: model.into(),
            keep_alive: None,
        }
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Option<KeepAlive>) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Queue a chat request and return its handle without waiting.
    pub fn submit_chat(&self, options: ChatOptions) -> Submission<ChatResponse, BackendError> {
        let ChatOptions {
            messages,
            options: model_options,
            format,
            keep_alive,
            priority,
            on_position,
        } = options;

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            format,
            options: model_options,
            stream: false,
            keep_alive: keep_alive.or_else(|| self.keep_alive.clone()),
        };
        self.enqueue(
            BackendRequest::Chat(request),
            priority,
            on_position,
            BackendResponse::into_chat,
        )
    }

    /// Queue a generate request and return its handle without waiting.
    pub fn submit_generate(
        &self,
        options: GenerateOptions,
    ) -> Submission<GenerateResponse, BackendError> {
        let GenerateOptions {
            prompt,
            system,
            template,
            context,
            options: model_options,
            format,
            keep_alive,
            priority,
            on_position,
        } = options;

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            system,
            template,
            context,
            format,
            options: model_options,
            stream: false,
            keep_alive: keep_alive.or_else(|| self.keep_alive.clone()),
        };
        self.enqueue(
            BackendRequest::Generate(request),
            priority,
            on_position,
            BackendResponse::into_generate,
        )
    }

    /// Send a chat request through the queue and wait for the reply.
    pub async fn chat(&self, options: ChatOptions) -> Result<ChatResponse, LlmError> {
        self.submit_chat(options).await
    }

    /// Send a generate request through the queue and wait for the reply.
    pub async fn generate(&self, options: GenerateOptions) -> Result<GenerateResponse, LlmError> {
        self.submit_generate(options).await
    }

    /// Requests waiting behind the one in flight.
    pub fn queue_length(&self) -> usize {
        self.dispatcher.queue_length()
    }

    pub fn is_idle(&self) -> bool {
        self.dispatcher.is_idle()
    }

    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    /// Reject everything still pending; see [`Dispatcher::shutdown`].
    pub fn shutdown(&self) -> usize {
        self.dispatcher.shutdown()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    fn enqueue<T, F>(
        &self,
        request: BackendRequest,
        priority: i64,
        on_position: Option<PositionCallback>,
        extract: F,
    ) -> Submission<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(BackendResponse) -> Result<T, BackendError> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let kind = request.kind();
        let submission = self.dispatcher.submit(
            move || async move { backend.call(request).await.and_then(extract) },
            SubmitOptions::new()
                .with_priority(priority)
                .with_position_callback(on_position),
        );
        tracing::debug!(
            id = %submission.id(),
            kind,
            model = %self.model,
            priority,
            "inference request submitted"
        );
        submission
    }
}
