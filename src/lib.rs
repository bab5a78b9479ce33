//! A process-local, concurrent, in-memory key-value cache with bounded
//! capacity, TTL expiration, and pluggable eviction.
//!
//! The public surface is [`Cache`], built with [`CacheBuilder`]:
//!
//! ```no_run
//! use localcache::Cache;
//!
//! let cache: Cache<String> = Cache::builder()
//!     .with_capacity(10_000)
//!     .with_global_ttl(300)
//!     .build();
//!
//! cache.set("greeting", "hello".to_string());
//! assert_eq!(cache.get("greeting"), Some("hello".to_string()));
//! cache.stop();
//! ```
//!
//! Internally this is four tightly coupled pieces: a sharded concurrent
//! dict for high read/write throughput, an LRU policy whose recency list is
//! mutated by a single serializing background thread (the Cache Worker) to
//! keep the hot path lock-free, an active TTL expirer that amortizes
//! expiration over random samples instead of scanning the keyspace, and a
//! single-flight primitive that collapses concurrent cache-miss loads of
//! the same key into one backing call.
//!
//! This crate has no opinion on wire protocols, persistence, or
//! distribution — it is a library, not a server. It also takes no
//! dependency on a `tracing` subscriber; it only emits events.

mod cache;
mod dict;
mod entry;
mod hash;
mod list;
mod policy;
mod shard;
mod singleflight;
mod stats;
mod ttl;
mod worker;

pub use cache::{Cache, CacheBuilder};
pub use list::Handle;
pub use policy::{EvictionPolicy, LruPolicy};
pub use stats::Statistic;
