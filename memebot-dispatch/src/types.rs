//! Core types for the dispatcher.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier assigned to every submitted request.
///
/// Combines a per-dispatcher sequence number with the submission time so ids
/// stay unique even when the sequence restarts with the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId {
    pub seq: u64,
    pub submitted_at_ms: i64,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req_{}_{}", self.seq, self.submitted_at_ms)
    }
}

/// 1-based rank of a pending request together with the pending total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    pub position: usize,
    pub total: usize,
}

/// How pending requests are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingMode {
    /// Execution order equals submission order.
    #[default]
    Fifo,
    /// Higher priority first, submission order within equal priorities.
    Priority,
}

impl OrderingMode {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Priority => "priority",
        }
    }
}

impl fmt::Display for OrderingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown ordering mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ordering mode: {0} (expected \"fifo\" or \"priority\")")]
pub struct ParseOrderingError(pub String);

impl FromStr for OrderingMode {
    type Err = ParseOrderingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "priority" => Ok(Self::Priority),
            other => Err(ParseOrderingError(other.to_string())),
        }
    }
}

/// Dispatcher construction options.
///
/// A bare dispatcher defaults to FIFO. The Ollama queue and the bot's
/// configuration opt into [`OrderingMode::Priority`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub ordering: OrderingMode,
}

impl DispatcherConfig {
    #[inline]
    pub const fn fifo() -> Self {
        Self {
            ordering: OrderingMode::Fifo,
        }
    }

    #[inline]
    pub const fn priority() -> Self {
        Self {
            ordering: OrderingMode::Priority,
        }
    }
}

/// Callback invoked whenever a pending request's rank is recomputed.
///
/// The rank is captured atomically with the queue change, but the callback
/// itself runs after the queue lock is released, so it may call back into
/// the dispatcher. Updates from concurrent submissions can arrive out of
/// order. A panic inside the callback is logged and ignored.
pub type PositionCallback = Arc<dyn Fn(QueuePosition) + Send + Sync>;

/// Per-submission options.
#[derive(Clone, Default)]
pub struct SubmitOptions {
    pub priority: i64,
    pub on_position: Option<PositionCallback>,
}

impl fmt::Debug for SubmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitOptions")
            .field("priority", &self.priority)
            .field("on_position", &self.on_position.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl SubmitOptions {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[inline]
    #[must_use]
    pub fn on_position<F>(mut self, callback: F) -> Self
    where
        F: Fn(QueuePosition) + Send + Sync + 'static,
    {
        self.on_position = Some(Arc::new(callback));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_position_callback(mut self, callback: Option<PositionCallback>) -> Self {
        self.on_position = callback;
        self
    }
}

/// Counters describing what the dispatcher has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub pending: usize,
    pub draining: bool,
}
