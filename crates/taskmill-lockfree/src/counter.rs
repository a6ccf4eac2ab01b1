//! Thread-safe counter keyed by arbitrary objects.
//!
//! Every key maps to an [`AtomicF64`] cell, and a separate cell carries the
//! running total. Mutations touch the cell and the total as two individually
//! atomic steps, so `total_count() == sum of counts` is guaranteed once
//! writers quiesce, not at arbitrary interleavings.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cell::AtomicF64;

const ZERO_BITS: u64 = 0;

/// A concurrent map from key to atomic double count, with an atomically
/// maintained running total.
///
/// Cells holding exactly `0.0` are treated as logically removed: a removal
/// zeroes the cell before detaching it from the map, and a writer that finds
/// a zero cell replaces the whole map entry (guarded by cell identity)
/// instead of CAS-ing the possibly-superseded cell in place. Callers must
/// not assume identity stability of the cell behind a key.
pub struct ConcurrentCounter<K: Eq + Hash + Clone> {
    cells: DashMap<K, Arc<AtomicF64>>,
    total: AtomicF64,
    absent_default: f64,
}

impl<K: Eq + Hash + Clone> ConcurrentCounter<K> {
    /// Creates an empty counter where absent keys count as `0.0`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default(0.0)
    }

    /// Creates an empty counter where absent keys count as `default`.
    #[must_use]
    pub fn with_default(default: f64) -> Self {
        Self {
            cells: DashMap::new(),
            total: AtomicF64::new(0.0),
            absent_default: default,
        }
    }

    /// Returns the count for `key`, or the configured default if absent.
    pub fn get_count(&self, key: &K) -> f64 {
        self.cells
            .get(key)
            .map_or(self.absent_default, |cell| cell.get())
    }

    /// Returns whether `key` has an entry (including zero-valued residue).
    pub fn contains_key(&self, key: &K) -> bool {
        self.cells.contains_key(key)
    }

    /// Sets the count for `key` to `value`, adjusting the total by the
    /// difference from the previous count.
    pub fn set_count(&self, key: K, value: f64) {
        loop {
            let cell = match self.cells.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(AtomicF64::new(value)));
                    self.total.get_and_add(value);
                    return;
                }
                Entry::Occupied(slot) => Arc::clone(slot.get()),
            };
            let current = cell.get();
            if current.to_bits() == ZERO_BITS {
                if self.replace_zero_cell(&key, &cell, value) {
                    self.total.get_and_add(value);
                    return;
                }
            } else if cell.compare_and_set(current, value) {
                self.total.get_and_add(value - current);
                return;
            }
        }
    }

    /// Adds `delta` to the count for `key` and returns the new count.
    ///
    /// Installs a fresh cell if the key is absent; retries on any lost race.
    pub fn increment_count(&self, key: K, delta: f64) -> f64 {
        loop {
            let cell = match self.cells.get(&key) {
                Some(cell) => Arc::clone(&cell),
                None => match self.cells.entry(key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::new(AtomicF64::new(delta)));
                        self.total.get_and_add(delta);
                        return delta;
                    }
                    Entry::Occupied(slot) => Arc::clone(slot.get()),
                },
            };
            let current = cell.get();
            if current.to_bits() == ZERO_BITS {
                // A zero cell may be mid-removal; replace the entry wholesale
                // rather than writing into a cell the map may already have
                // dropped.
                if self.replace_zero_cell(&key, &cell, delta) {
                    self.total.get_and_add(delta);
                    return delta;
                }
            } else if cell.compare_and_set(current, current + delta) {
                self.total.get_and_add(delta);
                return current + delta;
            }
        }
    }

    /// Subtracts `delta` from the count for `key` and returns the new count.
    pub fn decrement_count(&self, key: K, delta: f64) -> f64 {
        self.increment_count(key, -delta)
    }

    /// Removes `key` and returns the count it held, or the absent default.
    ///
    /// The cell is zeroed first so concurrent writers fall into the
    /// replace-a-zero path, then the entry is detached only if it still
    /// holds that exact cell. A detach that loses the race is accepted,
    /// leaving a zero-valued entry behind; the total is adjusted either way,
    /// so the quiescent total stays consistent.
    pub fn remove(&self, key: &K) -> f64 {
        let Some(cell) = self.cells.get(key).map(|c| Arc::clone(&c)) else {
            return self.absent_default;
        };
        let removed = cell.get_and_set(0.0);
        self.cells.remove_if(key, |_, held| Arc::ptr_eq(held, &cell));
        self.total.get_and_add(-removed);
        removed
    }

    /// Returns the running total across all keys.
    ///
    /// Consistent with the per-key counts once mutations quiesce.
    pub fn total_count(&self) -> f64 {
        self.total.get()
    }

    /// Number of entries, counting zero-valued residue left by lost removal
    /// races.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns whether the counter has no entries.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates over `(key, count)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (K, f64)> + '_ {
        self.cells
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
    }

    /// Snapshot of all keys.
    pub fn keys(&self) -> Vec<K> {
        self.cells.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of all counts.
    pub fn values(&self) -> Vec<f64> {
        self.cells.iter().map(|e| e.value().get()).collect()
    }

    /// Snapshot of all `(key, count)` pairs.
    pub fn entries(&self) -> Vec<(K, f64)> {
        self.iter().collect()
    }

    /// Removes every entry.
    ///
    /// The total is driven to zero first; the backing map is only cleared
    /// once a CAS confirms the total was observed at exactly `0.0`, so an
    /// increment landing mid-clear is either folded in before the wipe or
    /// arrives after it as a fresh entry.
    pub fn clear(&self) {
        loop {
            if self.total.compare_and_set(0.0, 0.0) {
                break;
            }
            let observed = self.total.get();
            self.total.compare_and_set(observed, 0.0);
        }
        self.cells.clear();
    }

    /// Swaps the entry for `key` with a fresh cell holding `value`, guarded
    /// on the entry still referencing `expected`.
    fn replace_zero_cell(&self, key: &K, expected: &Arc<AtomicF64>, value: f64) -> bool {
        match self.cells.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if Arc::ptr_eq(slot.get(), expected) {
                    slot.insert(Arc::new(AtomicF64::new(value)));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }
}

impl<K: Eq + Hash + Clone> Default for ConcurrentCounter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> std::fmt::Debug for ConcurrentCounter<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_basic_counts() {
        let counter = ConcurrentCounter::new();
        assert_eq!(counter.get_count(&"a"), 0.0);

        assert_eq!(counter.increment_count("a", 2.0), 2.0);
        assert_eq!(counter.increment_count("a", 3.0), 5.0);
        assert_eq!(counter.decrement_count("a", 1.0), 4.0);
        assert_eq!(counter.total_count(), 4.0);

        counter.set_count("b", 6.0);
        assert_eq!(counter.get_count(&"b"), 6.0);
        assert_eq!(counter.total_count(), 10.0);
        assert_eq!(counter.len(), 2);
    }

    #[test]
    fn test_absent_default() {
        let counter = ConcurrentCounter::with_default(f64::NEG_INFINITY);
        assert_eq!(counter.get_count(&1), f64::NEG_INFINITY);
        counter.set_count(1, 3.0);
        assert_eq!(counter.get_count(&1), 3.0);
    }

    #[test]
    fn test_remove_adjusts_total() {
        let counter = ConcurrentCounter::new();
        counter.increment_count("x", 5.0);
        counter.increment_count("y", 7.0);

        assert_eq!(counter.remove(&"x"), 5.0);
        assert!(!counter.contains_key(&"x"));
        assert_eq!(counter.total_count(), 7.0);
        assert_eq!(counter.remove(&"x"), 0.0);
    }

    #[test]
    fn test_increment_after_remove() {
        let counter = ConcurrentCounter::new();
        counter.increment_count("k", 4.0);
        counter.remove(&"k");
        assert_eq!(counter.increment_count("k", 1.5), 1.5);
        assert_eq!(counter.total_count(), 1.5);
    }

    #[test]
    fn test_clear() {
        let counter = ConcurrentCounter::new();
        for i in 0..10 {
            counter.increment_count(i, i as f64);
        }
        counter.clear();
        assert!(counter.is_empty());
        assert_eq!(counter.total_count(), 0.0);
    }

    #[test]
    fn test_snapshots() {
        let counter = ConcurrentCounter::new();
        counter.set_count("a", 1.0);
        counter.set_count("b", 2.0);

        let mut entries = counter.entries();
        entries.sort_by(|x, y| x.0.cmp(y.0));
        assert_eq!(entries, vec![("a", 1.0), ("b", 2.0)]);
        assert_eq!(counter.keys().len(), 2);
        assert_eq!(counter.values().iter().sum::<f64>(), 3.0);
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = std::sync::Arc::new(ConcurrentCounter::new());
        let threads = 8;
        let per_thread = 2000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let c = std::sync::Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        c.increment_count("shared", 1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let expected = (threads * per_thread) as f64;
        assert_eq!(counter.get_count(&"shared"), expected);
        assert_eq!(counter.total_count(), expected);
    }

    #[test]
    fn test_concurrent_remove_and_increment() {
        let counter = std::sync::Arc::new(ConcurrentCounter::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let c = std::sync::Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..500 {
                        c.increment_count("hot", 1.0);
                        c.remove(&"hot");
                    }
                })
            })
            .collect();
        for h in writers {
            h.join().unwrap();
        }

        // Mutations have quiesced: total must equal the surviving counts.
        let surviving: f64 = counter.values().iter().sum();
        assert_eq!(counter.total_count(), surviving);
    }
}
