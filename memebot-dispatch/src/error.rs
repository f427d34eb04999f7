//! Error types for the dispatcher.

use thiserror::Error;

/// Errors raised while constructing a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher must be constructed inside a tokio runtime")]
    NoRuntime,
}

/// Failure delivered to the caller of a single submitted request.
///
/// Exactly one of `Ok(T)` or one of these variants is delivered per
/// submission.
#[derive(Debug, Error)]
pub enum RequestError<E> {
    /// The work ran and returned an error.
    #[error("request failed: {0}")]
    Work(#[source] E),

    /// The work panicked. Carries the panic message.
    #[error("request panicked: {0}")]
    Panicked(String),

    /// The request's task was cancelled, or its runtime went away, before
    /// it could settle.
    #[error("request was dropped before it settled")]
    Dropped,

    /// The dispatcher was shut down before the request started executing.
    #[error("dispatcher is shut down")]
    Shutdown,
}

impl<E> RequestError<E> {
    /// Returns the error produced by the work itself, if that is what failed.
    #[inline]
    pub fn into_work(self) -> Option<E> {
        match self {
            Self::Work(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if the request was rejected by a shutdown.
    #[inline]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}
