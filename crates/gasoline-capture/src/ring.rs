//! Bounded FIFO ring buffer with eviction-aware monotonic sequencing.
//!
//! A single writer appends; many readers snapshot. Sequence numbers never
//! reset when items are evicted, so a cursor pointing at an evicted sequence
//! can be detected as stale rather than silently wrapping to a live one.

use parking_lot::RwLock;
use std::collections::VecDeque;

/// A live entry paired with the sequence it was assigned at ingest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequenced<T> {
    /// Monotonic sequence number, starting at 1 for the first item ever
    /// appended to this ring in the current process.
    pub sequence: i64,
    /// The stored value.
    pub item: T,
}

struct Inner<T> {
    items: VecDeque<Sequenced<T>>,
    capacity: usize,
    total_added: i64,
    evicted: u64,
}

/// A bounded, single-producer/multi-reader ring buffer over `T`.
///
/// `Append` never blocks and never fails: once at capacity, the oldest
/// element is dropped to make room and `evicted` is incremented.
pub struct RingBuffer<T> {
    inner: RwLock<Inner<T>>,
}

/// An immutable view of a ring's contents at one instant.
#[derive(Clone, Debug)]
pub struct Snapshot<T> {
    /// Live items, oldest first.
    pub items: Vec<Sequenced<T>>,
    /// Total number of items ever appended (including evicted ones).
    pub total_added: i64,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a ring with the given fixed capacity.
    ///
    /// # Panics
    /// Panics if `capacity` is zero — a zero-capacity ring can never hold a
    /// readable item and is always a caller bug.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be non-zero");
        Self {
            inner: RwLock::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
                total_added: 0,
                evicted: 0,
            }),
        }
    }

    /// Append an item, evicting the oldest if at capacity. Returns the
    /// sequence number assigned to the new item.
    pub fn append(&self, item: T) -> i64 {
        let mut inner = self.inner.write();
        inner.total_added += 1;
        let sequence = inner.total_added;
        if inner.items.len() == inner.capacity {
            inner.items.pop_front();
            inner.evicted += 1;
        }
        inner.items.push_back(Sequenced { sequence, item });
        sequence
    }

    /// Take a consistent snapshot of the live items and the running total.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T> {
        let inner = self.inner.read();
        Snapshot {
            items: inner.items.iter().cloned().collect(),
            total_added: inner.total_added,
        }
    }

    /// Number of items evicted since the ring (or its last `clear`) started.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.inner.read().evicted
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.read().capacity
    }

    /// Number of live items currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Whether the ring currently holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sequence of the oldest live item, if any.
    #[must_use]
    pub fn oldest_live_sequence(&self) -> Option<i64> {
        self.inner.read().items.front().map(|e| e.sequence)
    }

    /// Drop all live items and reset the counters to zero.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.items.clear();
        inner.total_added = 0;
        inner.evicted = 0;
    }
}
