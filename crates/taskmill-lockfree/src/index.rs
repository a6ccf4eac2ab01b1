//! Thread-safe bidirectional object/id index.
//!
//! Forward lookups (`index_of`) go through a concurrent map; reverse lookups
//! (`get`) read an append-only slab published behind an atomically swapped
//! snapshot pointer. Only id *assignment* takes a lock; reads never block.

use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use once_cell::sync::OnceCell;

const INITIAL_CAPACITY: usize = 16;

/// Append-only backing store. Slots are write-once so a published slab can
/// be filled in place without readers ever observing a torn entry.
struct Slab<T> {
    slots: Box<[OnceCell<Arc<T>>]>,
}

impl<T> Slab<T> {
    fn with_capacity(capacity: usize) -> Self {
        let slots: Vec<OnceCell<Arc<T>>> = (0..capacity).map(|_| OnceCell::new()).collect();
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn read(&self, index: usize) -> Option<Arc<T>> {
        self.slots.get(index).and_then(OnceCell::get).cloned()
    }
}

/// A bidirectional mapping between items and dense small-integer ids.
///
/// `add_to_index` is idempotent: concurrent registrations of equal items all
/// observe the same id, and ids are dense over `[0, len())`. Growth copies
/// the slab into a doubled allocation and publishes it with a single pointer
/// swap, so a reader holding the old snapshot still sees a fully valid (if
/// stale-in-length) store.
pub struct ConcurrentIndex<T: Eq + Hash> {
    ids: DashMap<Arc<T>, usize>,
    slab: ArcSwap<Slab<T>>,
    len: AtomicUsize,
    assign: Mutex<()>,
}

impl<T: Eq + Hash> ConcurrentIndex<T> {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Creates an empty index with room for `capacity` items before the
    /// first slab growth.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: DashMap::new(),
            slab: ArcSwap::from_pointee(Slab::with_capacity(capacity.max(1))),
            len: AtomicUsize::new(0),
            assign: Mutex::new(()),
        }
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the item registered under `index`, or `None` if `index` is
    /// out of range.
    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        // The length is released only after the slot write and any slab
        // publication, so observing `index < len` guarantees a subsequent
        // snapshot load covers the slot.
        if index >= self.len.load(Ordering::Acquire) {
            return None;
        }
        self.slab.load().read(index)
    }

    /// Returns the id registered for `item`, if any. Never blocks on the
    /// assignment lock.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.ids.get(item).map(|entry| *entry)
    }

    /// Returns whether `item` has been registered.
    pub fn contains(&self, item: &T) -> bool {
        self.ids.contains_key(item)
    }

    /// Registers `item`, assigning the next dense id, and returns its id.
    /// Returns the existing id if the item is already registered.
    pub fn add_to_index(&self, item: T) -> usize {
        // Fast path: already registered, no lock.
        if let Some(existing) = self.ids.get(&item) {
            return *existing;
        }

        let _guard = self.assign.lock().expect("index assignment lock poisoned");

        // Double-checked: another thread may have won the slow path.
        if let Some(existing) = self.ids.get(&item) {
            return *existing;
        }

        let id = self.len.load(Ordering::Relaxed);
        let slab = self.slab.load();
        if id == slab.capacity() {
            let grown = Slab::with_capacity(slab.capacity() * 2);
            for i in 0..id {
                if let Some(existing) = slab.slots[i].get() {
                    let _ = grown.slots[i].set(Arc::clone(existing));
                }
            }
            self.slab.store(Arc::new(grown));
        }

        let entry = Arc::new(item);
        let _ = self.slab.load().slots[id].set(Arc::clone(&entry));
        self.len.store(id + 1, Ordering::Release);
        self.ids.insert(entry, id);
        id
    }

    /// Iterates over the registered items in index order.
    ///
    /// The iterator holds a snapshot: items registered after the call are
    /// not yielded.
    pub fn iter(&self) -> impl Iterator<Item = Arc<T>> {
        let len = self.len.load(Ordering::Acquire);
        let slab = self.slab.load_full();
        (0..len).filter_map(move |i| slab.read(i))
    }

    /// Removes every registration and resets ids to start from zero.
    pub fn clear(&self) {
        let _guard = self.assign.lock().expect("index assignment lock poisoned");
        self.len.store(0, Ordering::Release);
        self.ids.clear();
        self.slab.store(Arc::new(Slab::with_capacity(INITIAL_CAPACITY)));
    }
}

impl<T: Eq + Hash> Default for ConcurrentIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + std::fmt::Debug> std::fmt::Debug for ConcurrentIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_add_and_lookup() {
        let index = ConcurrentIndex::new();
        let a = index.add_to_index("alpha".to_string());
        let b = index.add_to_index("beta".to_string());

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.index_of(&"alpha".to_string()), Some(0));
        assert_eq!(index.get(0).as_deref(), Some(&"alpha".to_string()));
        assert_eq!(index.get(2), None);
    }

    #[test]
    fn test_idempotent_add() {
        let index = ConcurrentIndex::new();
        assert_eq!(index.add_to_index(42), 0);
        assert_eq!(index.add_to_index(42), 0);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_growth_preserves_contents() {
        let index = ConcurrentIndex::with_capacity(4);
        for i in 0..100 {
            assert_eq!(index.add_to_index(i), i);
        }
        assert_eq!(index.len(), 100);
        for i in 0..100 {
            assert_eq!(index.get(i).as_deref(), Some(&i));
            assert_eq!(index.index_of(&i), Some(i));
        }
    }

    #[test]
    fn test_iter_in_index_order() {
        let index = ConcurrentIndex::new();
        for word in ["c", "a", "b"] {
            index.add_to_index(word.to_string());
        }
        let items: Vec<String> = index.iter().map(|a| (*a).clone()).collect();
        assert_eq!(items, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_clear() {
        let index = ConcurrentIndex::new();
        index.add_to_index(1);
        index.add_to_index(2);
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.index_of(&1), None);
        assert_eq!(index.get(0), None);
        assert_eq!(index.add_to_index(3), 0);
    }

    #[test]
    fn test_concurrent_dedup() {
        let index = std::sync::Arc::new(ConcurrentIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let idx = std::sync::Arc::clone(&index);
                thread::spawn(move || idx.add_to_index("same".to_string()))
            })
            .collect();

        let ids: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(ids[0]).as_deref(), Some(&"same".to_string()));
    }

    #[test]
    fn test_concurrent_distinct_values_dense() {
        let index = std::sync::Arc::new(ConcurrentIndex::new());
        let threads = 8;
        let per_thread = 200;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let idx = std::sync::Arc::clone(&index);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        // Half the keys collide across threads.
                        let key = if i % 2 == 0 { i } else { t * per_thread + i };
                        let id = idx.add_to_index(key);
                        assert_eq!(idx.get(id).as_deref(), Some(&key));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Dense ids: every id below len resolves, and ids round-trip.
        let len = index.len();
        for id in 0..len {
            let item = index.get(id).expect("dense ids");
            assert_eq!(index.index_of(&*item), Some(id));
        }
    }
}
