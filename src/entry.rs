//! The unit stored in the dict: an immutable key plus a value/expire_time
//! pair guarded by a single reader/writer lock, so a concurrent get and set
//! on the same live key never tear.

use parking_lot::RwLock;

/// Mutable half of an entry: the opaque value and its absolute expiry time
/// (seconds since the Unix epoch).
struct Mutable<V> {
    value: V,
    expire_time: i64,
}

pub struct Entry<K, V> {
    pub key: K,
    inner: RwLock<Mutable<V>>,
}

impl<K, V: Clone> Entry<K, V> {
    pub fn new(key: K, value: V, expire_time: i64) -> Self {
        Self {
            key,
            inner: RwLock::new(Mutable { value, expire_time }),
        }
    }

    /// Snapshot the value and whether it is expired as of `now`, in one
    /// read-locked critical section.
    pub fn snapshot(&self, now: i64) -> (V, bool) {
        let inner = self.inner.read();
        (inner.value.clone(), now > inner.expire_time)
    }

    /// Overwrite the value and expire_time under the write lock.
    pub fn set(&self, value: V, expire_time: i64) {
        let mut inner = self.inner.write();
        inner.value = value;
        inner.expire_time = expire_time;
    }

    pub fn expire_time(&self) -> i64 {
        self.inner.read().expire_time
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.inner.read().expire_time
    }
}
