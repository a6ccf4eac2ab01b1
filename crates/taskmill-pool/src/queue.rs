//! Internal synchronization plumbing: the closeable blocking dispatch queue
//! and the worker-exit latch.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A blocking FIFO handing jobs from the submitting thread to the workers.
///
/// Closing the queue wakes every blocked taker with `None`. Takers check the
/// closed flag before popping, so once the queue is closed no queued job is
/// ever started; `close_and_drain` hands those jobs back for orphan
/// recovery.
pub(crate) struct DispatchQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> DispatchQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Enqueues an item, or gives it back if the queue is closed.
    pub(crate) fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Blocks until an item is available or the queue is closed.
    pub(crate) fn take(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .ready
                .wait(state)
                .expect("dispatch queue lock poisoned");
        }
    }

    /// Closes the queue and wakes all blocked takers.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Closes the queue and returns every job that never started.
    pub(crate) fn close_and_drain(&self) -> Vec<T> {
        let mut state = self.lock();
        state.closed = true;
        let drained = state.items.drain(..).collect();
        drop(state);
        self.ready.notify_all();
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().expect("dispatch queue lock poisoned")
    }
}

/// Counts live worker threads so a caller can wait out in-flight jobs after
/// a forced shutdown.
pub(crate) struct ExitLatch {
    remaining: Mutex<usize>,
    all_exited: Condvar,
}

impl ExitLatch {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            remaining: Mutex::new(workers),
            all_exited: Condvar::new(),
        }
    }

    /// Called by each worker on its way out.
    pub(crate) fn worker_exited(&self) {
        let mut remaining = self.remaining.lock().expect("exit latch lock poisoned");
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.all_exited.notify_all();
        }
    }

    /// Waits until every worker has exited, up to `timeout`. Returns whether
    /// full termination was reached.
    pub(crate) fn await_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.remaining.lock().expect("exit latch lock poisoned");
        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .all_exited
                .wait_timeout(remaining, deadline - now)
                .expect("exit latch lock poisoned");
            remaining = guard;
        }
        true
    }
}
