//! Serialized request dispatcher for single-concurrency inference backends.
//!
//! Local inference servers such as Ollama serve one model instance and behave
//! badly when called concurrently. This crate funnels every request through a
//! single drain loop while callers wait on a handle and, optionally, receive
//! updates about their place in line.
//!
//! # Architecture
//!
//! - [`Dispatcher`] - The queue controller: `submit`, `queue_length`, `is_idle`
//! - [`Submission`] - Future resolving exactly once with the request's result
//! - [`SubmitOptions`] - Priority and position callback for one submission
//! - [`OrderingMode`] - FIFO, or priority with stable ties
//!
//! Pending requests live in an ordered queue guarded by a mutex. The first
//! submission that finds the dispatcher idle spawns the drain loop; the loop
//! executes requests one at a time and goes idle again when the queue is
//! empty. A request that is already executing is never pre-empted.
//!
//! # Example
//!
//! ```rust,no_run
//! use memebot_dispatch::{Dispatcher, DispatcherConfig, SubmitOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::new(DispatcherConfig::priority()).unwrap();
//!
//!     let options = SubmitOptions::new()
//!         .with_priority(5)
//!         .on_position(|p| println!("position {}/{}", p.position, p.total));
//!
//!     let reply = dispatcher
//!         .submit(|| async { Ok::<_, std::io::Error>("pong") }, options)
//!         .await
//!         .unwrap();
//!     println!("{reply}");
//! }
//! ```

mod dispatcher;
mod envelope;
mod error;
mod queue;
mod types;

pub use dispatcher::{Dispatcher, Submission};
pub use error::{DispatchError, RequestError};
pub use types::{
    DispatchStats, DispatcherConfig, OrderingMode, ParseOrderingError, PositionCallback,
    QueuePosition, RequestId, SubmitOptions,
};
