//! A single concurrent-safe shard of the sharded dict.
//!
//! Grounded on the Go source's `shard.go`/`datastruct/dict/dict.go` shard
//! type (a `sync.RWMutex`-guarded `map[string]interface{}`), translated to
//! `parking_lot::RwLock<HashMap<...>>` the way `colander-cache`'s
//! `sharded.rs` guards each of its shards.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::seq::IteratorRandom;

pub struct Shard<T> {
    store: RwLock<HashMap<String, T>>,
}

impl<T: Clone> Shard<T> {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.store.read().get(key).cloned()
    }

    pub fn set(&self, key: String, value: T) {
        self.store.write().insert(key, value);
    }

    /// Returns whether the key existed.
    pub fn del(&self, key: &str) -> bool {
        self.store.write().remove(key).is_some()
    }

    /// Remove and return the value for `key`, if present, under one write lock.
    pub fn take(&self, key: &str) -> Option<T> {
        self.store.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) {
        *self.store.write() = HashMap::new();
    }

    /// Pick one key uniformly at random. Iteration order is otherwise
    /// arbitrary; returns `None` when the shard is empty.
    pub fn rand_key(&self) -> Option<String> {
        let store = self.store.read();
        store.keys().choose(&mut rand::thread_rng()).cloned()
    }

    /// Pick one `(key, value)` pair uniformly at random, cloning the value
    /// under the same read lock so the TTL sampler (`src/ttl.rs`) never
    /// observes a key without its value.
    pub fn rand_entry(&self) -> Option<(String, T)> {
        let store = self.store.read();
        let key = store.keys().choose(&mut rand::thread_rng())?;
        store.get(key).map(|v| (key.clone(), v.clone()))
    }
}

impl<T: Clone> Default for Shard<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_del_roundtrip() {
        let shard: Shard<i32> = Shard::new();
        assert_eq!(shard.get("a"), None);
        shard.set("a".to_string(), 1);
        assert_eq!(shard.get("a"), Some(1));
        assert!(shard.del("a"));
        assert!(!shard.del("a"));
        assert_eq!(shard.get("a"), None);
    }

    #[test]
    fn len_and_flush() {
        let shard: Shard<i32> = Shard::new();
        shard.set("a".to_string(), 1);
        shard.set("b".to_string(), 2);
        assert_eq!(shard.len(), 2);
        shard.flush();
        assert_eq!(shard.len(), 0);
        assert!(shard.is_empty());
    }

    #[test]
    fn rand_key_on_empty_is_none() {
        let shard: Shard<i32> = Shard::new();
        assert_eq!(shard.rand_key(), None);
    }

    #[test]
    fn rand_key_returns_a_present_key() {
        let shard: Shard<i32> = Shard::new();
        shard.set("only".to_string(), 1);
        assert_eq!(shard.rand_key(), Some("only".to_string()));
    }

    #[test]
    fn rand_entry_returns_key_and_value_together() {
        let shard: Shard<i32> = Shard::new();
        shard.set("only".to_string(), 7);
        assert_eq!(shard.rand_entry(), Some(("only".to_string(), 7)));
    }

    #[test]
    fn rand_entry_on_empty_is_none() {
        let shard: Shard<i32> = Shard::new();
        assert_eq!(shard.rand_entry(), None);
    }
}
