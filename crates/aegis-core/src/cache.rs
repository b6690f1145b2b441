//! Bounded recency-ordered maps.
//!
//! Thin wrapper over [`lru::LruCache`] pinning the semantics the engine
//! relies on: `get` promotes to most-recently-used, `insert` is a no-op when
//! the key is already present, and a full map evicts its least-recently-used
//! entry on insert. Not internally synchronized; owners hold their own lock.

use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

/// A fixed-capacity key→value map with least-recently-used eviction.
#[derive(Debug)]
pub struct RecencyMap<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> RecencyMap<K, V> {
    /// Create a map holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Look up a value, promoting the key to most-recently-used on a hit.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key)
    }

    /// Insert a value at the most-recently-used position.
    ///
    /// A no-op when the key is already present (the existing value and its
    /// recency are both left untouched). When the map is full the
    /// least-recently-used entry is evicted first.
    pub fn insert(&mut self, key: K, value: V) {
        if self.inner.contains(&key) {
            return;
        }
        self.inner.push(key, value);
    }

    /// Whether the key is present. Does not affect recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains(key)
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
