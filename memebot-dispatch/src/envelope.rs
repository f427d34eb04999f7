//! Request envelopes: a unit of work plus the means to settle it.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;

use crate::error::RequestError;
use crate::types::{PositionCallback, QueuePosition, RequestId};

/// Sender half of a request's settlement channel.
pub(crate) type SettleTx<T, E> = oneshot::Sender<Result<T, RequestError<E>>>;

/// How an executed unit finished, as seen by the drain loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeeded,
    Failed(String),
    Panicked(String),
}

/// Type-erased work that can be settled exactly once.
///
/// Both methods consume the unit, so a unit is either run or rejected, never
/// both and never twice.
pub(crate) trait Unit: Send {
    fn run(self: Box<Self>) -> BoxFuture<'static, Outcome>;

    fn reject(self: Box<Self>, error: Rejection);
}

/// Reasons a unit is settled without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    Shutdown,
}

/// Concrete unit wrapping the caller's closure and its settlement sender.
pub(crate) struct PendingWork<F, T, E> {
    work: F,
    tx: SettleTx<T, E>,
}

impl<F, T, E> PendingWork<F, T, E> {
    pub(crate) fn new(work: F, tx: SettleTx<T, E>) -> Self {
        Self { work, tx }
    }
}

impl<F, Fut, T, E> Unit for PendingWork<F, T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn run(self: Box<Self>) -> BoxFuture<'static, Outcome> {
        let Self { work, tx } = *self;
        async move {
            // Calling `work` happens inside the guarded future, so a panic while
            // building the future is caught as well as one while polling it.
            let result = AssertUnwindSafe(async move { work().await })
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(value)) => {
                    if tx.send(Ok(value)).is_err() {
                        tracing::debug!("caller stopped waiting before the request succeeded");
                    }
                    Outcome::Succeeded
                }
                Ok(Err(error)) => {
                    let message = error.to_string();
                    if tx.send(Err(RequestError::Work(error))).is_err() {
                        tracing::debug!("caller stopped waiting before the request failed");
                    }
                    Outcome::Failed(message)
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let _ = tx.send(Err(RequestError::Panicked(message.clone())));
                    Outcome::Panicked(message)
                }
            }
        }
        .boxed()
    }

    fn reject(self: Box<Self>, error: Rejection) {
        let result = match error {
            Rejection::Shutdown => RequestError::Shutdown,
        };
        let _ = self.tx.send(Err(result));
    }
}

/// A queued request.
pub(crate) struct Envelope {
    pub(crate) id: RequestId,
    pub(crate) priority: i64,
    pub(crate) unit: Box<dyn Unit>,
    pub(crate) on_position: Option<PositionCallback>,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("on_position", &self.on_position.is_some())
            .finish()
    }
}

impl Envelope {
    pub(crate) fn new(
        id: RequestId,
        priority: i64,
        unit: Box<dyn Unit>,
        on_position: Option<PositionCallback>,
    ) -> Self {
        Self {
            id,
            priority,
            unit,
            on_position,
        }
    }

    /// Snapshot of the update this envelope should receive, if it wants one.
    #[inline]
    pub(crate) fn position_update(&self, position: QueuePosition) -> Option<PositionUpdate> {
        self.on_position.as_ref().map(|callback| PositionUpdate {
            id: self.id,
            callback: Arc::clone(callback),
            position,
        })
    }
}

/// A rank change recorded under the queue lock and delivered after it is
/// released, so callbacks may call back into the dispatcher.
pub(crate) struct PositionUpdate {
    id: RequestId,
    callback: PositionCallback,
    position: QueuePosition,
}

impl PositionUpdate {
    /// Invoke the callback. A panicking callback is logged and otherwise
    /// ignored; it never affects the request or the queue.
    pub(crate) fn deliver(self) {
        let Self {
            id,
            callback,
            position,
        } = self;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(position))) {
            tracing::warn!(
                %id,
                position = position.position,
                total = position.total,
                panic = %panic_message(payload.as_ref()),
                "position callback panicked"
            );
        }
    }
}

pub(crate) fn deliver_all(updates: Vec<PositionUpdate>) {
    updates.into_iter().for_each(PositionUpdate::deliver);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Hands out [`RequestId`]s for one dispatcher.
#[derive(Debug, Default)]
pub(crate) struct RequestIdGenerator {
    counter: AtomicU64,
}

impl RequestIdGenerator {
    pub(crate) fn next(&self) -> RequestId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        RequestId {
            seq,
            submitted_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}
