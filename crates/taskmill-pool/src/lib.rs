//! # taskmill-pool
//!
//! A bounded pool of worker threads that consumes a stream of inputs, runs a
//! caller-supplied [`Processor`] on each, and hands results back either in
//! submission order or in arrival order.
//!
//! - one processor instance per worker thread, created via
//!   [`Processor::new_instance`] and owned by that thread
//! - `put` blocks on an idle-slot ticket; slot occupancy is the only
//!   backpressure and admission-control mechanism
//! - `peek`/`poll` drain completed results on the submitting thread
//! - [`InterruptibleWorkerPool`] adds a submission timeout, forced shutdown,
//!   and recovery of never-started inputs
//!
//! A job that panics is caught and logged; its result is simply absent, so
//! one malformed input cannot take down the pool or other in-flight work.

mod job;
mod queue;

pub mod interruptible;
pub mod pool;
pub mod processor;

pub use interruptible::InterruptibleWorkerPool;
pub use pool::WorkerPool;
pub use processor::Processor;

pub use taskmill_base::{Error, Result};
