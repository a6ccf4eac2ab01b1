//! The unit-of-work contract implemented by pool callers.

/// A stateful-but-replicated transformation applied to every input item.
///
/// The pool creates one instance per worker thread via [`new_instance`] and
/// moves it into that thread, so `process` is never invoked concurrently on
/// the same instance; instances may therefore keep mutable scratch state
/// (caches, buffers, per-thread models) without any locking.
///
/// [`new_instance`]: Processor::new_instance
pub trait Processor<I, O>: Send {
    /// Transforms one input item into an output.
    ///
    /// A panic here is caught by the pool, logged, and recorded as an absent
    /// result; it does not terminate the worker thread.
    fn process(&mut self, item: I) -> O;

    /// Produces an independent, equivalently-configured instance for another
    /// worker thread. Called once per additional thread at pool
    /// construction.
    fn new_instance(&self) -> Self
    where
        Self: Sized;
}
