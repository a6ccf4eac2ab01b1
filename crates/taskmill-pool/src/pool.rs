//! The bounded worker pool.
//!
//! `put` acquires an idle-slot ticket (the sole backpressure mechanism),
//! stamps the item with the next sequence id, and hands it to a fixed set of
//! worker threads over a shared dispatch queue. Workers publish completions
//! back over a channel before returning their ticket, so re-acquiring every
//! ticket doubles as a completion barrier.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use taskmill_base::{Error, Result};

use crate::job::{Completion, Job};
use crate::processor::Processor;
use crate::queue::{DispatchQueue, ExitLatch};

fn default_parallelism() -> usize {
    thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// A fixed-size pool dispatching items to replicated [`Processor`]s.
///
/// Driven from a single coordinating thread: `put` submits, `peek`/`poll`
/// drain, `join_with` barriers. With `order_results` the output sequence
/// exactly equals the input sequence regardless of completion order;
/// without it, results surface as they arrive.
pub struct WorkerPool<I, O> {
    n_threads: usize,
    ordered: bool,
    queue: Arc<DispatchQueue<Job<I>>>,
    workers: Vec<JoinHandle<()>>,
    idle_tx: Sender<usize>,
    idle_rx: Receiver<usize>,
    completion_rx: Receiver<Completion<O>>,
    /// Completions drained but not yet delivered, keyed by sequence id.
    /// `None` marks a job that panicked; it occupies its slot in the
    /// sequence but is never surfaced.
    pending: HashMap<u64, Option<O>>,
    next_sequence: u64,
    next_expected: u64,
    submitted: u64,
    completed: u64,
    delivered: u64,
    idle: Arc<AtomicUsize>,
    exit_latch: Arc<ExitLatch>,
    destroyed: bool,
}

impl<I: Send + 'static, O: Send + 'static> WorkerPool<I, O> {
    /// Creates a pool with `n_threads` workers (`0` selects the available
    /// parallelism). The given processor serves one worker; the remaining
    /// workers each get a [`Processor::new_instance`] replica.
    pub fn new<P>(n_threads: usize, processor: P, order_results: bool) -> Self
    where
        P: Processor<I, O> + 'static,
    {
        let n_threads = if n_threads == 0 {
            default_parallelism()
        } else {
            n_threads
        };

        let queue = Arc::new(DispatchQueue::new());
        let (idle_tx, idle_rx) = mpsc::channel();
        let (completion_tx, completion_rx) = mpsc::channel();
        let idle = Arc::new(AtomicUsize::new(n_threads));
        let exit_latch = Arc::new(ExitLatch::new(n_threads));

        let mut processors = Vec::with_capacity(n_threads);
        for _ in 1..n_threads {
            processors.push(processor.new_instance());
        }
        processors.push(processor);

        let workers = processors
            .into_iter()
            .enumerate()
            .map(|(id, processor)| {
                let queue = Arc::clone(&queue);
                let completions = completion_tx.clone();
                let tickets = idle_tx.clone();
                let idle = Arc::clone(&idle);
                let latch = Arc::clone(&exit_latch);
                thread::Builder::new()
                    .name(format!("taskmill-worker-{id}"))
                    .spawn(move || worker_loop(id, processor, queue, completions, tickets, idle, latch))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        for slot in 0..n_threads {
            idle_tx.send(slot).expect("idle channel open at construction");
        }

        Self {
            n_threads,
            ordered: order_results,
            queue,
            workers,
            idle_tx,
            idle_rx,
            completion_rx,
            pending: HashMap::new(),
            next_sequence: 0,
            next_expected: 0,
            submitted: 0,
            completed: 0,
            delivered: 0,
            idle,
            exit_latch,
            destroyed: false,
        }
    }

    /// Number of worker threads.
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Submits an item, blocking until an idle worker slot is available.
    ///
    /// This is the pool's only admission control: callers are throttled to
    /// at most `n_threads` in-flight items. Does not wait for the job to
    /// complete.
    pub fn put(&mut self, item: I) -> Result<()> {
        let slot = self.acquire_slot()?;
        self.submit_on(slot, item)
    }

    /// Returns whether a result is ready to deliver.
    ///
    /// In ordered mode a result counts as ready only if it carries the next
    /// expected sequence id; jobs that panicked are stepped over invisibly,
    /// so `peek()` is `true` exactly when `poll()` would return `Some`.
    pub fn peek(&mut self) -> bool {
        self.drain_completions();
        if self.ordered {
            while matches!(self.pending.get(&self.next_expected), Some(None)) {
                self.pending.remove(&self.next_expected);
                self.next_expected += 1;
            }
            matches!(self.pending.get(&self.next_expected), Some(Some(_)))
        } else {
            !self.pending.is_empty()
        }
    }

    /// Removes and returns the next deliverable result, or `None` if no
    /// result is currently ready.
    pub fn poll(&mut self) -> Option<O> {
        if !self.peek() {
            return None;
        }
        let sequence = if self.ordered {
            self.next_expected
        } else {
            *self.pending.keys().next().expect("peek found a result")
        };
        let output = self.pending.remove(&sequence).flatten();
        if self.ordered {
            self.next_expected += 1;
        }
        self.delivered += 1;
        output
    }

    /// Waits for every outstanding job, then shuts the pool down and joins
    /// the worker threads. Equivalent to `join_with(true)`.
    pub fn join(&mut self) -> Result<()> {
        self.join_with(true)
    }

    /// Waits for every outstanding job by re-acquiring all worker slots.
    ///
    /// With `destroy` the pool is shut down and its threads joined;
    /// otherwise the slots are returned and the pool is reusable for a
    /// subsequent batch. Either way, every result submitted before the call
    /// is drainable afterwards. Note there is no timeout here: a job that
    /// never returns its slot blocks this forever (see
    /// [`InterruptibleWorkerPool`](crate::InterruptibleWorkerPool)).
    pub fn join_with(&mut self, destroy: bool) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        let mut slots = Vec::with_capacity(self.n_threads);
        for _ in 0..self.n_threads {
            let slot = self
                .idle_rx
                .recv()
                .map_err(|_| Error::Disconnected("join barrier"))?;
            self.idle.fetch_sub(1, Ordering::Relaxed);
            slots.push(slot);
        }
        if destroy {
            self.shutdown_workers();
        } else {
            for slot in slots {
                self.idle_tx
                    .send(slot)
                    .map_err(|_| Error::Disconnected("slot repopulation"))?;
                self.idle.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Takes an idle-slot ticket, blocking indefinitely.
    pub(crate) fn acquire_slot(&mut self) -> Result<usize> {
        if self.destroyed {
            return Err(Error::RejectedExecution);
        }
        let slot = self
            .idle_rx
            .recv()
            .map_err(|_| Error::Disconnected("slot acquisition"))?;
        self.idle.fetch_sub(1, Ordering::Relaxed);
        Ok(slot)
    }

    /// Takes an idle-slot ticket with a bounded wait. `Ok(None)` means the
    /// timeout elapsed.
    pub(crate) fn acquire_slot_timeout(&mut self, timeout: Duration) -> Result<Option<usize>> {
        if self.destroyed {
            return Err(Error::RejectedExecution);
        }
        match self.idle_rx.recv_timeout(timeout) {
            Ok(slot) => {
                self.idle.fetch_sub(1, Ordering::Relaxed);
                Ok(Some(slot))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Disconnected("slot acquisition")),
        }
    }

    /// Stamps the item with the next sequence id and enqueues it bound to
    /// the already-acquired `slot`.
    pub(crate) fn submit_on(&mut self, slot: usize, item: I) -> Result<()> {
        let sequence = self.next_sequence;
        let job = Job { item, sequence, slot };
        if self.queue.push(job).is_err() {
            return Err(Error::RejectedExecution);
        }
        self.next_sequence += 1;
        self.submitted += 1;
        Ok(())
    }

    /// Forcibly shuts the pool down and returns the inputs of jobs that
    /// were admitted but never started. Already-running jobs are left to
    /// finish (or not) on their own; their threads are detached.
    pub(crate) fn force_shutdown(&mut self) -> Vec<I> {
        if self.destroyed {
            return Vec::new();
        }
        let unstarted = self.queue.close_and_drain();
        warn!(
            orphaned = unstarted.len(),
            "forced pool shutdown; recovering unstarted jobs"
        );
        self.workers.clear();
        self.destroyed = true;
        unstarted.into_iter().map(|job| job.item).collect()
    }

    /// Graceful shutdown: close the (empty) queue and join every worker.
    pub(crate) fn shutdown_workers(&mut self) {
        self.queue.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        self.destroyed = true;
        debug!("pool destroyed after {} jobs", self.submitted);
    }

    /// Waits up to `timeout` for every worker thread to exit.
    pub(crate) fn await_termination(&self, timeout: Duration) -> bool {
        self.exit_latch.await_idle(timeout)
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.completed += 1;
            match completion.output {
                Some(output) => {
                    self.pending.insert(completion.sequence, Some(output));
                }
                // A panicked job only matters for ordered reassembly, where
                // its sequence id must still be consumed.
                None if self.ordered => {
                    self.pending.insert(completion.sequence, None);
                }
                None => {}
            }
        }
    }
}

impl<I, O> fmt::Display for WorkerPool<I, O> {
    /// Status report. `completed`/`delivered` reflect results drained so
    /// far; `active`/`idle`/`queued` are live.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idle = self.idle.load(Ordering::Relaxed).min(self.n_threads);
        write!(
            f,
            "WorkerPool[threads={}, active={}, idle={}, queued={}, submitted={}, completed={}, delivered={}]",
            self.n_threads,
            self.n_threads - idle,
            idle,
            self.queue.len(),
            self.submitted,
            self.completed,
            self.delivered,
        )
    }
}

impl<I, O> Drop for WorkerPool<I, O> {
    /// Closes the dispatch queue so idle workers exit; does not join, so a
    /// stuck job cannot hang the dropping thread.
    fn drop(&mut self) {
        if !self.destroyed {
            self.queue.close();
        }
    }
}

fn worker_loop<I, O, P>(
    id: usize,
    mut processor: P,
    queue: Arc<DispatchQueue<Job<I>>>,
    completions: Sender<Completion<O>>,
    tickets: Sender<usize>,
    idle: Arc<AtomicUsize>,
    latch: Arc<ExitLatch>,
) where
    P: Processor<I, O>,
{
    debug!("worker {id} started");
    while let Some(job) = queue.take() {
        let Job { item, sequence, slot } = job;
        let output = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(item))) {
            Ok(output) => Some(output),
            Err(payload) => {
                warn!(
                    "worker {id}: job {sequence} panicked: {}; recording absent result",
                    panic_message(payload.as_ref())
                );
                None
            }
        };
        // Completion before ticket: a caller that has re-acquired every
        // ticket must already be able to drain every result.
        if completions.send(Completion { sequence, output }).is_err() {
            break;
        }
        idle.fetch_add(1, Ordering::Relaxed);
        if tickets.send(slot).is_err() {
            break;
        }
    }
    debug!("worker {id} exiting");
    latch.worker_exited();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Negate;

    impl Processor<i64, i64> for Negate {
        fn process(&mut self, item: i64) -> i64 {
            -item
        }

        fn new_instance(&self) -> Self {
            Negate
        }
    }

    #[test]
    fn test_single_item_round_trip() {
        let mut pool = WorkerPool::new(2, Negate, true);
        pool.put(5).unwrap();
        pool.join_with(false).unwrap();
        assert!(pool.peek());
        assert_eq!(pool.poll(), Some(-5));
        assert!(!pool.peek());
        assert_eq!(pool.poll(), None);
        pool.join().unwrap();
    }

    #[test]
    fn test_put_after_destroy_rejected() {
        let mut pool = WorkerPool::new(1, Negate, false);
        pool.join().unwrap();
        assert!(matches!(pool.put(1), Err(Error::RejectedExecution)));
    }

    #[test]
    fn test_auto_parallelism() {
        let pool: WorkerPool<i64, i64> = WorkerPool::new(0, Negate, false);
        assert!(pool.n_threads() >= 1);
    }

    #[test]
    fn test_status_report() {
        let mut pool = WorkerPool::new(3, Negate, false);
        pool.put(1).unwrap();
        pool.join_with(false).unwrap();
        let status = pool.to_string();
        assert!(status.contains("threads=3"), "{status}");
        assert!(status.contains("idle=3"), "{status}");
        assert!(status.contains("submitted=1"), "{status}");
    }
}
