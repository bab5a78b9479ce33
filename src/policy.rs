//! Eviction policy. Today only `"lru"` exists, matching the Go source
//! (`policy.go`/`policy_lru.go`), but the contract is expressed as a trait
//! so a different policy could be plugged in without the Cache Worker
//! (`src/worker.rs`) changing.

use std::sync::Arc;

use crate::entry::Entry;
use crate::list::{Handle, List};

/// Contract for an eviction policy over entries keyed by `K`.
///
/// Only the Cache Worker thread ever calls these methods — no locking is
/// required inside an implementation.
pub trait EvictionPolicy<K, V> {
    /// Allocate a handle bound to `entry`. Does not insert it into the
    /// recency structure yet.
    fn pack(&mut self, entry: Arc<Entry<K, V>>) -> Handle;

    /// Insert a packed handle. Returns the key of a victim to evict, if
    /// inserting pushed the policy over capacity. The caller (the Cache
    /// Worker) is responsible for turning that into a `del`; this method
    /// does not remove the victim itself.
    fn add(&mut self, handle: Handle) -> Option<K>;

    /// Record a hit, promoting the handle's recency. A no-op if the handle
    /// was concurrently removed.
    fn hit(&mut self, handle: Handle);

    /// Remove a handle.
    fn del(&mut self, handle: Handle);

    /// Discard all entries.
    fn flush(&mut self);

    /// Retrieve the entry bound to a handle.
    fn unpack(&self, handle: Handle) -> Option<Arc<Entry<K, V>>>;

    fn len(&self) -> usize;
}

pub struct LruPolicy<K, V> {
    list: List<K, V>,
    capacity: usize,
}

impl<K, V> LruPolicy<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            list: List::new(),
            capacity,
        }
    }
}

impl<K: Clone, V> EvictionPolicy<K, V> for LruPolicy<K, V> {
    fn pack(&mut self, entry: Arc<Entry<K, V>>) -> Handle {
        self.list.alloc(entry)
    }

    fn add(&mut self, handle: Handle) -> Option<K> {
        self.list.push_front(handle);
        if self.list.len() > self.capacity {
            // Victim is whatever sits at the back now; it may be the entry
            // we just inserted if capacity is 0, but capacity is always >=1
            // in practice (coerced by CacheBuilder).
            if let Some(victim) = self.list.back() {
                return self.list.get(victim).map(|n| n.entry.key.clone());
            }
        }
        None
    }

    fn hit(&mut self, handle: Handle) {
        self.list.move_to_front(handle);
    }

    fn del(&mut self, handle: Handle) {
        self.list.remove(handle);
    }

    fn flush(&mut self) {
        self.list.flush();
    }

    fn unpack(&self, handle: Handle) -> Option<Arc<Entry<K, V>>> {
        self.list.get(handle).map(|n| n.entry.clone())
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}
