//! Queue controller and the single-worker drain loop.

use std::fmt;
use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};

use crate::envelope::{
    deliver_all, Envelope, Outcome, PendingWork, Rejection, RequestIdGenerator, Unit,
};
use crate::error::{DispatchError, RequestError};
use crate::queue::DispatchQueue;
use crate::types::{DispatchStats, DispatcherConfig, OrderingMode, RequestId, SubmitOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Draining,
}

#[derive(Debug)]
struct State {
    queue: DispatchQueue,
    phase: Phase,
    closed: bool,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

struct Inner {
    state: Mutex<State>,
    ids: RequestIdGenerator,
    counters: Counters,
    idle: Notify,
    runtime: Handle,
}

impl Inner {
    /// Nothing foreign runs under this lock, but a poisoned guard still
    /// holds a consistent queue, so poisoning is ignored.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializes work against a backend that must never be called concurrently.
///
/// Cloning is cheap and every clone drives the same queue. Work is executed
/// one request at a time on the tokio runtime captured at construction.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Dispatcher")
            .field("ordering", &state.queue.ordering())
            .field("pending", &state.queue.len())
            .field("phase", &state.phase)
            .field("closed", &state.closed)
            .finish()
    }
}

impl Dispatcher {
    /// Build a dispatcher on the current tokio runtime.
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatchError> {
        let runtime = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Build a dispatcher that spawns its drain loop on `runtime`.
    pub fn with_runtime(config: DispatcherConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: DispatchQueue::new(config.ordering),
                    phase: Phase::Idle,
                    closed: false,
                }),
                ids: RequestIdGenerator::default(),
                counters: Counters::default(),
                idle: Notify::new(),
                runtime,
            }),
        }
    }

    /// Queue `work` and return a handle that resolves once it has settled.
    ///
    /// Never waits on the backend. If the drain loop is idle it is started;
    /// otherwise the running loop picks the request up in order.
    pub fn submit<F, Fut, T, E>(&self, work: F, options: SubmitOptions) -> Submission<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let id = self.inner.ids.next();
        let (tx, rx) = oneshot::channel();
        let unit: Box<dyn Unit> = Box::new(PendingWork::new(work, tx));
        self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let mut state = self.inner.lock();
        if state.closed {
            drop(state);
            self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%id, "rejecting request submitted after shutdown");
            unit.reject(Rejection::Shutdown);
            return Submission { id, rx };
        }

        let priority = options.priority;
        let (position, updates) = state
            .queue
            .insert(Envelope::new(id, priority, unit, options.on_position));
        let start = state.phase == Phase::Idle;
        if start {
            state.phase = Phase::Draining;
        }
        drop(state);

        if start {
            self.inner.runtime.spawn(drain(self.inner.clone()));
        }

        tracing::debug!(
            %id,
            priority,
            position = position.position,
            pending = position.total,
            "request queued"
        );
        deliver_all(updates);

        Submission { id, rx }
    }

    /// Number of requests waiting to execute, excluding the one in flight.
    pub fn queue_length(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// True when nothing is executing and nothing is pending.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        state.phase == Phase::Idle && state.queue.is_empty()
    }

    /// Wait until the drain loop has gone idle with an empty queue.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.inner.idle.notified());
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Tear the queue down.
    ///
    /// Every pending request settles with [`RequestError::Shutdown`] and so
    /// does every later submission. The request in flight, if any, finishes
    /// normally. Returns the number of pending requests rejected.
    pub fn shutdown(&self) -> usize {
        let drained = {
            let mut state = self.inner.lock();
            state.closed = true;
            state.queue.drain_all()
        };

        let rejected = drained.len();
        for envelope in drained {
            tracing::debug!(id = %envelope.id, "rejecting pending request on shutdown");
            envelope.unit.reject(Rejection::Shutdown);
        }
        self.inner
            .counters
            .rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);

        tracing::info!(rejected, "dispatcher shut down");
        rejected
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn ordering(&self) -> OrderingMode {
        self.inner.lock().queue.ordering()
    }

    /// Snapshot of the dispatcher's counters.
    pub fn stats(&self) -> DispatchStats {
        let (pending, draining) = {
            let state = self.inner.lock();
            (state.queue.len(), state.phase == Phase::Draining)
        };
        let counters = &self.inner.counters;
        DispatchStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            pending,
            draining,
        }
    }
}

/// The drain loop. Only ever one instance per dispatcher: it is spawned by
/// the submission that moves the phase from idle to draining, and it moves
/// the phase back to idle in the same critical section that finds the queue
/// empty.
async fn drain(inner: Arc<Inner>) {
    tracing::debug!("dispatch loop draining");
    loop {
        let (envelope, updates, remaining) = {
            let mut state = inner.lock();
            match state.queue.remove_front() {
                Some((envelope, updates)) => {
                    let remaining = state.queue.len();
                    (envelope, updates, remaining)
                }
                None => {
                    state.phase = Phase::Idle;
                    drop(state);
                    inner.idle.notify_waiters();
                    tracing::debug!("dispatch loop idle");
                    return;
                }
            }
        };

        let Envelope {
            id, priority, unit, ..
        } = envelope;
        tracing::debug!(%id, priority, remaining, "request started");
        deliver_all(updates);

        // A separate task keeps a panicking unit from taking the loop down.
        let counters = &inner.counters;
        match inner.runtime.spawn(unit.run()).await {
            Ok(Outcome::Succeeded) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%id, "request succeeded");
            }
            Ok(Outcome::Failed(error)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%id, %error, "request failed");
            }
            Ok(Outcome::Panicked(panic)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%id, %panic, "request work panicked");
            }
            Err(join_error) if join_error.is_panic() => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%id, "request task panicked outside its work");
            }
            Err(join_error) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%id, error = %join_error, "request task was cancelled");
            }
        }
    }
}

/// Handle to a submitted request. Resolves exactly once.
#[must_use = "dropping a submission discards the request's result"]
pub struct Submission<T, E> {
    id: RequestId,
    rx: oneshot::Receiver<Result<T, RequestError<E>>>,
}

impl<T, E> Submission<T, E> {
    #[inline]
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl<T, E> fmt::Debug for Submission<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission").field("id", &self.id).finish()
    }
}

impl<T, E> Future for Submission<T, E> {
    type Output = Result<T, RequestError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RequestError::Dropped)))
    }
}
