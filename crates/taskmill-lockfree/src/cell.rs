//! Atomically updatable f64 cell.
//!
//! Native CAS operates on integer words, so the double is stored as its raw
//! bit pattern in an `AtomicU64`. Composite read-modify-write operations are
//! retry loops: decode, compute, encode, CAS, retry on failure. This keeps
//! them linearizable without blocking, at the cost of unbounded (in practice
//! rare) retries under contention.

use std::sync::atomic::{AtomicU64, Ordering};

/// An f64 value that can be read, written, and compare-and-swapped
/// atomically.
///
/// `compare_and_set` compares *bit patterns*, not IEEE values: a NaN matches
/// only the same NaN payload, and `+0.0` does not match `-0.0`.
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Creates a new cell holding `value`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Returns the current value.
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Sets the value.
    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Sets the value and returns the previous one.
    #[inline]
    pub fn get_and_set(&self, value: f64) -> f64 {
        f64::from_bits(self.bits.swap(value.to_bits(), Ordering::AcqRel))
    }

    /// Sets the value to `update` if the current bit pattern equals the bit
    /// pattern of `expect`. Returns whether the swap happened.
    #[inline]
    pub fn compare_and_set(&self, expect: f64, update: f64) -> bool {
        self.bits
            .compare_exchange(
                expect.to_bits(),
                update.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Adds `delta` and returns the *previous* value.
    pub fn get_and_add(&self, delta: f64) -> f64 {
        let mut current = self.get();
        loop {
            let next = current + delta;
            match self.bits.compare_exchange_weak(
                current.to_bits(),
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current,
                Err(actual) => current = f64::from_bits(actual),
            }
        }
    }

    /// Adds `delta` and returns the *new* value.
    #[inline]
    pub fn add_and_get(&self, delta: f64) -> f64 {
        self.get_and_add(delta) + delta
    }

    /// Consumes the cell and returns the contained value.
    #[must_use]
    pub fn into_inner(self) -> f64 {
        f64::from_bits(self.bits.into_inner())
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl From<f64> for AtomicF64 {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicF64").field(&self.get()).finish()
    }
}
