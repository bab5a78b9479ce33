//! Cache Core: the public API, wiring together the sharded dict, the TTL
//! dict, the eviction policy, and the two background threads (Cache Worker,
//! TTL Expirer).
//!
//! Grounded on the Go source's `localCache` struct and `cacheProcess()` in
//! `cache.go` (shardCnt/cap/ttl fields, hitChan/opChan/stopChan, the
//! constructor-then-goroutine wiring), expressed as an idiomatic Rust
//! builder the way `colander-cache/src/sharded.rs` constructs its own
//! `ShardedCache`.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::dict::{coerce_shard_count, ShardedDict};
use crate::entry::Entry;
use crate::list::Handle;
use crate::policy::{EvictionPolicy, LruPolicy};
use crate::singleflight::Group;
use crate::stats::{Statistic, Stats};

const HIT_CHANNEL_CAPACITY: usize = 32_768;
const OP_CHANNEL_CAPACITY: usize = 32_768;

const DEFAULT_CAPACITY: usize = 1024;
const DEFAULT_SHARD_COUNT: usize = 256;
const DEFAULT_TTL_SECONDS: i64 = 60;

pub(crate) fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as i64
}

/// What the dict actually stores for a live key: the entry's stable arena
/// handle plus a direct `Arc` to the entry itself, so `get` never has to
/// take the policy's mutex just to read a value — only the Cache Worker and
/// `flush`/`stop` touch the policy directly.
#[derive(Clone)]
pub(crate) struct DictEntry<V> {
    pub handle: Handle,
    pub entry: Arc<Entry<String, V>>,
}

/// Events the public API posts to the Cache Worker over the op channel.
pub(crate) enum Op {
    Add(Handle),
    Del(String),
}

#[derive(Clone, Debug)]
struct Config {
    capacity: usize,
    shard_count: usize,
    default_ttl_seconds: i64,
    policy: &'static str,
    stats_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            shard_count: DEFAULT_SHARD_COUNT,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            policy: "lru",
            stats_enabled: false,
        }
    }
}

/// Builder for [`Cache`]. Each `with_*` setter validates and
/// coerces its argument immediately, so a bad value is visible at the call
/// site via a `warn!` rather than deferred to `build()`.
pub struct CacheBuilder {
    config: Config,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Maximum live entries. Non-positive values are coerced to the default.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        if capacity == 0 {
            warn!(requested = capacity, default = DEFAULT_CAPACITY, "capacity coerced to default");
            self.config.capacity = DEFAULT_CAPACITY;
        } else {
            self.config.capacity = capacity;
        }
        self
    }

    /// Number of dict shards. Coerced up to the next power of two.
    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        let coerced = coerce_shard_count(shard_count);
        if coerced != shard_count {
            warn!(requested = shard_count, coerced, "shard_count rounded up to a power of two");
        }
        self.config.shard_count = coerced;
        self
    }

    /// Default lifetime, in seconds, applied by `set()`. Non-positive values
    /// are coerced to the default.
    pub fn with_global_ttl(mut self, ttl_seconds: i64) -> Self {
        if ttl_seconds <= 0 {
            warn!(requested = ttl_seconds, default = DEFAULT_TTL_SECONDS, "default_ttl_seconds coerced to default");
            self.config.default_ttl_seconds = DEFAULT_TTL_SECONDS;
        } else {
            self.config.default_ttl_seconds = ttl_seconds;
        }
        self
    }

    /// Eviction policy name. Only `"lru"` exists today; anything else falls
    /// back to it with a warning.
    pub fn with_policy(mut self, policy: &str) -> Self {
        match policy {
            "lru" => self.config.policy = "lru",
            other => {
                warn!(requested = other, "unknown eviction policy, falling back to \"lru\"");
                self.config.policy = "lru";
            }
        }
        self
    }

    /// Whether hit/miss counters are maintained. Default `false`.
    pub fn with_statist(mut self, enabled: bool) -> Self {
        self.config.stats_enabled = enabled;
        self
    }

    /// Build the cache and start its background threads.
    pub fn build<V>(self) -> Cache<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        Cache::from_config(self.config)
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn new_policy<V>(capacity: usize) -> Box<dyn EvictionPolicy<String, V> + Send>
where
    V: Send + 'static,
{
    Box::new(LruPolicy::new(capacity))
}

/// The channels and background-thread handles for one "run" of a cache.
/// Replaced wholesale on `flush()`.
struct Runtime {
    hit_tx: Sender<Handle>,
    op_tx: Sender<Op>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    ttl: Option<JoinHandle<()>>,
}

struct Inner<V> {
    config: Config,
    dict: Arc<ShardedDict<DictEntry<V>>>,
    ttl_dict: Arc<ShardedDict<i64>>,
    policy: Arc<Mutex<Box<dyn EvictionPolicy<String, V> + Send>>>,
    stats: Stats,
    single_flight: Group,
    runtime: Mutex<Runtime>,
}

/// A process-local, concurrent, in-memory key-value cache with bounded
/// capacity, TTL expiration, and pluggable eviction.
///
/// Cheaply cloneable — clones share the same underlying state, channels,
/// and background threads (`Arc` all the way down).
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// A builder for configuring capacity, shard count, TTL, policy, and
    /// stats before construction.
    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    /// A cache with every default (capacity 1024, 256 shards, 60s TTL, LRU,
    /// stats disabled).
    pub fn new() -> Self {
        CacheBuilder::new().build()
    }

    fn from_config(config: Config) -> Self {
        let dict = Arc::new(ShardedDict::new(config.shard_count));
        let ttl_dict = Arc::new(ShardedDict::new(config.shard_count));
        let policy: Arc<Mutex<Box<dyn EvictionPolicy<String, V> + Send>>> =
            Arc::new(Mutex::new(new_policy(config.capacity)));
        let stats = Stats::new(config.stats_enabled);

        info!(
            capacity = config.capacity,
            shard_count = config.shard_count,
            default_ttl_seconds = config.default_ttl_seconds,
            policy = config.policy,
            stats_enabled = config.stats_enabled,
            "cache: constructed"
        );

        let runtime = Mutex::new(Self::spawn_runtime(dict.clone(), ttl_dict.clone(), policy.clone()));

        Self {
            inner: Arc::new(Inner {
                config,
                dict,
                ttl_dict,
                policy,
                stats,
                single_flight: Group::new(),
                runtime,
            }),
        }
    }

    fn spawn_runtime(
        dict: Arc<ShardedDict<DictEntry<V>>>,
        ttl_dict: Arc<ShardedDict<i64>>,
        policy: Arc<Mutex<Box<dyn EvictionPolicy<String, V> + Send>>>,
    ) -> Runtime {
        let (hit_tx, hit_rx) = bounded::<Handle>(HIT_CHANNEL_CAPACITY);
        let (op_tx, op_rx) = bounded::<Op>(OP_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let worker_dict = dict.clone();
        let worker_ttl_dict = ttl_dict.clone();
        let worker_policy = policy;
        let worker_stop_rx = stop_rx.clone();
        let worker = std::thread::Builder::new()
            .name("cache-worker".into())
            .spawn(move || crate::worker::run(worker_dict, worker_ttl_dict, worker_policy, hit_rx, op_rx, worker_stop_rx))
            .expect("failed to spawn cache worker thread");

        let ttl_op_tx = op_tx.clone();
        let ttl = std::thread::Builder::new()
            .name("ttl-expirer".into())
            .spawn(move || crate::ttl::run(ttl_dict, ttl_op_tx, stop_rx))
            .expect("failed to spawn ttl expirer thread");

        Runtime {
            hit_tx,
            op_tx,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
            ttl: Some(ttl),
        }
    }

    /// Look up `key`. Returns `None` on a miss or if the stored value has
    /// expired (an expired hit also posts an asynchronous `del`).
    pub fn get(&self, key: &str) -> Option<V> {
        let dict_entry = match self.inner.dict.get(key) {
            Some(dict_entry) => dict_entry,
            None => {
                self.inner.stats.record_miss();
                return None;
            }
        };
        let now = now_unix();
        let (value, expired) = dict_entry.entry.snapshot(now);

        if expired {
            self.del(key);
            self.inner.stats.record_miss();
            return None;
        }

        let hit_tx = self.inner.runtime.lock().hit_tx.clone();
        let _ = hit_tx.try_send(dict_entry.handle);
        self.inner.stats.record_hit();
        Some(value)
    }

    /// `get`, falling back to `loader` on a miss. Concurrent callers for the
    /// same key collapse into a single `loader` invocation. A
    /// successful load is cached with the default TTL; an error is returned
    /// verbatim and never cached.
    pub fn get_or_load<E, F>(&self, key: &str, loader: F) -> Result<V, E>
    where
        E: Clone + Send + 'static,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let cache = self.clone();
        let owned_key = key.to_string();
        self.inner.single_flight.do_call(key, move || {
            let result = loader();
            if let Ok(value) = &result {
                cache.set(&owned_key, value.clone());
            }
            result
        })
    }

    /// `set_with_expire` using the cache's configured default TTL.
    pub fn set(&self, key: &str, value: V) {
        self.set_with_expire(key, value, self.inner.config.default_ttl_seconds);
    }

    /// Insert or overwrite `key` with an explicit TTL. `ttl_seconds <= 0`
    /// means "already expired".
    pub fn set_with_expire(&self, key: &str, value: V, ttl_seconds: i64) {
        let now = now_unix();
        let expire_time = if ttl_seconds <= 0 { now } else { now + ttl_seconds };

        if let Some(existing) = self.inner.dict.get(key) {
            existing.entry.set(value, expire_time);
            let hit_tx = self.inner.runtime.lock().hit_tx.clone();
            let _ = hit_tx.try_send(existing.handle);
            return;
        }

        let entry = Arc::new(Entry::new(key.to_string(), value, expire_time));
        let handle = self.inner.policy.lock().pack(entry);
        let op_tx = self.inner.runtime.lock().op_tx.clone();
        op_tx
            .send(Op::Add(handle))
            .expect("cache: op channel send failed (cache stopped?)");
    }

    /// Delete `key`. Asynchronous: the key may still be visible to a `get`
    /// that races ahead of the Cache Worker draining this event.
    pub fn del(&self, key: &str) {
        let op_tx = self.inner.runtime.lock().op_tx.clone();
        op_tx
            .send(Op::Del(key.to_string()))
            .expect("cache: op channel send failed (cache stopped?)");
    }

    /// Approximate live key count (sum of shard lengths).
    pub fn len(&self) -> usize {
        self.inner.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the background threads, drop every key, reset the policy list,
    /// and restart with fresh channels.
    pub fn flush(&self) {
        info!("cache: flush");
        self.stop_runtime();
        self.inner.dict.flush();
        self.inner.ttl_dict.flush();
        self.inner.policy.lock().flush();

        let mut runtime = self.inner.runtime.lock();
        *runtime = Self::spawn_runtime(
            self.inner.dict.clone(),
            self.inner.ttl_dict.clone(),
            self.inner.policy.clone(),
        );
    }

    /// Stop the Cache Worker and TTL Expirer. Idempotent.
    pub fn stop(&self) {
        info!("cache: stop");
        self.stop_runtime();
    }

    fn stop_runtime(&self) {
        let mut runtime = self.inner.runtime.lock();
        // Dropping the sender disconnects the (rendezvous) stop channel;
        // both background threads' `Select`/`select!` wake on that and exit.
        runtime.stop_tx.take();
        if let Some(handle) = runtime.worker.take() {
            let _ = handle.join();
        }
        if let Some(handle) = runtime.ttl.take() {
            let _ = handle.join();
        }
    }

    /// Current hit/miss counters (all zero if stats are disabled).
    pub fn statistic(&self) -> Statistic {
        self.inner.stats.snapshot()
    }
}

impl<V> Default for Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn quiesce() {
        std::thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache: Cache<i32> = Cache::new();
        cache.set("k", 1);
        quiesce();
        assert_eq!(cache.get("k"), Some(1));
        cache.stop();
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache: Cache<i32> = Cache::new();
        assert_eq!(cache.get("nope"), None);
        cache.stop();
    }

    #[test]
    fn expired_entry_reads_as_absent() {
        let cache: Cache<i32> = Cache::builder().with_capacity(8).build();
        cache.set_with_expire("k", 2, 0);
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(cache.get("k"), None);
        cache.stop();
    }

    #[test]
    fn overwrite_existing_key_keeps_latest_value() {
        let cache: Cache<i32> = Cache::new();
        cache.set("k", 1);
        quiesce();
        cache.set("k", 3);
        assert_eq!(cache.get("k"), Some(3));
        assert_eq!(cache.len(), 1);
        cache.stop();
    }

    #[test]
    fn capacity_two_lru_evicts_least_recently_used() {
        let cache: Cache<i32> = Cache::builder().with_capacity(2).build();
        cache.set("1", 1);
        cache.set("2", 2);
        cache.set("3", 3);
        quiesce();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("1"), None);
        assert_eq!(cache.get("2"), Some(2));
        assert_eq!(cache.get("3"), Some(3));
        cache.stop();
    }

    #[test]
    fn del_removes_key() {
        let cache: Cache<i32> = Cache::new();
        cache.set("k", 1);
        quiesce();
        cache.del("k");
        quiesce();
        assert_eq!(cache.get("k"), None);
        cache.stop();
    }

    #[test]
    fn flush_clears_everything() {
        let cache: Cache<i32> = Cache::new();
        for i in 0..10 {
            cache.set(&format!("k{i}"), i);
        }
        quiesce();
        assert_eq!(cache.len(), 10);
        cache.flush();
        assert_eq!(cache.len(), 0);
        cache.set("k", 1);
        quiesce();
        assert_eq!(cache.get("k"), Some(1));
        cache.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let cache: Cache<i32> = Cache::new();
        cache.stop();
        cache.stop();
    }

    #[test]
    fn get_or_load_caches_the_loaded_value() {
        let cache: Cache<i32> = Cache::new();
        let calls = AtomicUsize::new(0);
        let result: Result<i32, String> = cache.get_or_load("k", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        });
        assert_eq!(result, Ok(42));
        quiesce();
        assert_eq!(cache.get("k"), Some(42));
        cache.stop();
    }

    #[test]
    fn get_or_load_does_not_cache_errors() {
        let cache: Cache<i32> = Cache::new();
        let result: Result<i32, String> = cache.get_or_load("k", || Err("boom".to_string()));
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(cache.get("k"), None);
        cache.stop();
    }

    #[test]
    fn statistics_track_hits_and_misses() {
        let cache: Cache<i32> = Cache::builder().with_statist(true).build();
        cache.set("k", 1);
        quiesce();
        cache.get("k");
        cache.get("missing");
        let stats = cache.statistic();
        assert_eq!(stats.hit, 1);
        assert_eq!(stats.miss, 1);
        cache.stop();
    }

    #[test]
    fn builder_coerces_invalid_config() {
        let cache: Cache<i32> = Cache::builder()
            .with_capacity(0)
            .with_shard_count(3)
            .with_global_ttl(-5)
            .with_policy("unknown")
            .build();
        assert_eq!(cache.inner.config.capacity, DEFAULT_CAPACITY);
        assert_eq!(cache.inner.config.shard_count, 4);
        assert_eq!(cache.inner.config.default_ttl_seconds, DEFAULT_TTL_SECONDS);
        assert_eq!(cache.inner.config.policy, "lru");
        cache.stop();
    }
}
