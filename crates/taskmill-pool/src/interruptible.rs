//! A worker pool with bounded slot acquisition and orphan recovery.
//!
//! Decorates [`WorkerPool`] with a timeout on every idle-slot wait. When the
//! timeout fires the pool is forcibly shut down and every input that never
//! started (queued jobs plus timed-out or rejected submissions) is handed
//! back to the caller instead of being silently lost.

use std::time::Duration;

use taskmill_base::{Error, Result};

use crate::pool::WorkerPool;
use crate::processor::Processor;

/// A [`WorkerPool`] whose blocking waits are bounded by a timeout.
///
/// A timeout is a first-class control-flow outcome, not a failure:
/// [`join_with_timeout`](Self::join_with_timeout) reports the recovered
/// orphan inputs (empty if no timeout occurred). Jobs that already started
/// when the pool is forced down keep running on detached threads; use
/// [`await_termination`](Self::await_termination) to wait those out.
pub struct InterruptibleWorkerPool<I, O> {
    inner: WorkerPool<I, O>,
    timeout: Duration,
    orphans: Vec<I>,
}

impl<I: Send + 'static, O: Send + 'static> InterruptibleWorkerPool<I, O> {
    /// Creates a pool identical to [`WorkerPool::new`] except that every
    /// slot acquisition polls with `timeout` instead of blocking forever.
    pub fn new<P>(n_threads: usize, processor: P, order_results: bool, timeout: Duration) -> Self
    where
        P: Processor<I, O> + 'static,
    {
        Self {
            inner: WorkerPool::new(n_threads, processor, order_results),
            timeout,
            orphans: Vec::new(),
        }
    }

    /// Number of worker threads.
    pub fn n_threads(&self) -> usize {
        self.inner.n_threads()
    }

    /// Submits an item, waiting at most the configured timeout for an idle
    /// slot.
    ///
    /// On timeout the pool is forcibly shut down, the item joins the orphan
    /// list, and [`Error::SubmitTimeout`] is returned; submissions to an
    /// already-dead pool are likewise orphaned under
    /// [`Error::RejectedExecution`]. Either way the input is recoverable
    /// through [`join_with_timeout`](Self::join_with_timeout).
    pub fn put(&mut self, item: I) -> Result<()> {
        if self.inner.is_destroyed() {
            self.orphans.push(item);
            return Err(Error::RejectedExecution);
        }
        match self.inner.acquire_slot_timeout(self.timeout) {
            Ok(Some(slot)) => self.inner.submit_on(slot, item),
            Ok(None) => {
                let mut recovered = self.inner.force_shutdown();
                self.orphans.append(&mut recovered);
                self.orphans.push(item);
                Err(Error::SubmitTimeout(self.timeout))
            }
            Err(error) => {
                self.orphans.push(item);
                Err(error)
            }
        }
    }

    /// See [`WorkerPool::peek`].
    pub fn peek(&mut self) -> bool {
        self.inner.peek()
    }

    /// See [`WorkerPool::poll`].
    pub fn poll(&mut self) -> Option<O> {
        self.inner.poll()
    }

    /// Waits for outstanding jobs, bounding each slot re-acquisition by the
    /// configured timeout, and returns the orphaned inputs.
    ///
    /// If every slot comes back in time the pool is destroyed gracefully
    /// and the list is empty. On timeout the pool is forced down and the
    /// list holds every input that never started, in submission order; the
    /// stuck, already-started jobs are not included. This is a terminal
    /// operation either way.
    pub fn join_with_timeout(&mut self) -> Vec<I> {
        if self.inner.is_destroyed() {
            return std::mem::take(&mut self.orphans);
        }
        for _ in 0..self.inner.n_threads() {
            match self.inner.acquire_slot_timeout(self.timeout) {
                Ok(Some(_slot)) => {}
                _ => {
                    let mut recovered = self.inner.force_shutdown();
                    self.orphans.append(&mut recovered);
                    return std::mem::take(&mut self.orphans);
                }
            }
        }
        self.inner.shutdown_workers();
        Vec::new()
    }

    /// Waits up to `timeout` for in-flight jobs to finish after a forced
    /// shutdown. Returns whether every worker thread has exited; a job body
    /// that never checks for cancellation may keep a worker alive
    /// arbitrarily long.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.inner.await_termination(timeout)
    }
}

impl<I, O> std::fmt::Display for InterruptibleWorkerPool<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} timeout={:?}", self.inner, self.timeout)
    }
}
