//! Sharded dict: N independent shards selected by `hash(key) & (N-1)`.
//! Used twice by the cache core — once for `key -> Handle` (the main dict)
//! and once for `key -> expire_time` (the TTL dict), matching the Go
//! source's `datastruct/dict/dict.go`; the TTL dict is a second instance
//! rather than fused into the main one so the random sampler can walk it
//! without taking the main dict's per-entry locks.

use rand::Rng;

use crate::hash::shard_index;
use crate::shard::Shard;

/// Round `n` up to the next power of two, minimum 1. Used to coerce a
/// non-power-of-two user-supplied shard count up.
pub fn coerce_shard_count(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        n.next_power_of_two()
    }
}

pub struct ShardedDict<T> {
    shards: Vec<Shard<T>>,
    shard_count: usize,
}

impl<T: Clone> ShardedDict<T> {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = coerce_shard_count(shard_count);
        let shards = (0..shard_count).map(|_| Shard::new()).collect();
        Self { shards, shard_count }
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    fn shard_for(&self, key: &str) -> &Shard<T> {
        &self.shards[shard_index(key, self.shard_count)]
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.shard_for(key).get(key)
    }

    pub fn set(&self, key: String, value: T) {
        self.shard_for(&key).set(key, value);
    }

    pub fn del(&self, key: &str) -> bool {
        self.shard_for(key).del(key)
    }

    /// Remove and return the value for `key`, if present, in one locked step.
    pub fn take(&self, key: &str) -> Option<T> {
        self.shard_for(key).take(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush(&self) {
        for shard in &self.shards {
            shard.flush();
        }
    }

    /// Up to `count` keys, picked by repeatedly choosing a random shard and
    /// asking it for one key, until `count` non-empty picks are collected.
    /// May contain duplicates and returns fewer than `count` if
    /// the dict holds fewer live keys than requested.
    pub fn rand_keys(&self, count: usize) -> Vec<String> {
        let max = self.len().min(count);
        if max == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(max);
        let mut rng = rand::thread_rng();
        // Bounded retries: a dict that isn't empty but whose shards are all
        // transiently empty (mid-flush) would otherwise spin forever.
        let mut attempts = 0usize;
        let max_attempts = max * 64 + 1000;
        while out.len() < max && attempts < max_attempts {
            attempts += 1;
            let idx = rng.gen_range(0..self.shard_count);
            if let Some(key) = self.shards[idx].rand_key() {
                out.push(key);
            }
        }
        out
    }

    /// Like `rand_keys`, but returns `(key, value)` pairs. Used by the TTL
    /// Expirer (`src/ttl.rs`) to sample `(key, expire_time)` without a
    /// second lookup per key.
    pub fn rand_entries(&self, count: usize) -> Vec<(String, T)> {
        let max = self.len().min(count);
        if max == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(max);
        let mut rng = rand::thread_rng();
        let mut attempts = 0usize;
        let max_attempts = max * 64 + 1000;
        while out.len() < max && attempts < max_attempts {
            attempts += 1;
            let idx = rng.gen_range(0..self.shard_count);
            if let Some(entry) = self.shards[idx].rand_entry() {
                out.push(entry);
            }
        }
        out
    }
}
