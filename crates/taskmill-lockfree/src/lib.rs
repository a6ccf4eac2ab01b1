//! # taskmill-lockfree
//!
//! Concurrent data structures for aggregating shared state across worker
//! threads without a caller-managed lock.
//!
//! - **AtomicF64**: an atomically updatable double with bit-pattern CAS
//! - **ConcurrentCounter**: keyed atomic double counts with a running total
//! - **ConcurrentIndex**: a bidirectional object/id mapping with lock-free
//!   reads and serialized, amortized O(1) assignment
//!
//! All synchronization is internal: every public operation is atomic at its
//! own granularity, and none of them panic, deadlock, or corrupt state under
//! contention. Cross-structure invariants (for example a counter total
//! versus an index length) are individually, not jointly, atomic.

pub mod cell;
pub mod counter;
pub mod index;

pub use cell::AtomicF64;
pub use counter::ConcurrentCounter;
pub use index::ConcurrentIndex;
