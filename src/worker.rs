//! Cache Worker: the single background thread that serializes every
//! mutation of the eviction policy's recency list, so the list itself
//! needs no lock that the hot get/set path would contend on.
//!
//! Grounded on the Go source's `cacheProcess()` `select` loop in `cache.go`,
//! translated to `crossbeam_channel::Select` the way
//! `other_examples/...PaperCache-paper-cache__src-worker-policy.rs.rs`
//! structures its dedicated policy-worker thread.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Select};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::{DictEntry, Op};
use crate::dict::ShardedDict;
use crate::list::Handle;
use crate::policy::EvictionPolicy;

type Policy<V> = Mutex<Box<dyn EvictionPolicy<String, V> + Send>>;

pub(crate) fn run<V>(
    dict: Arc<ShardedDict<DictEntry<V>>>,
    ttl_dict: Arc<ShardedDict<i64>>,
    policy: Arc<Policy<V>>,
    hit_rx: Receiver<Handle>,
    op_rx: Receiver<Op>,
    stop_rx: Receiver<()>,
) where
    V: Clone + Send + Sync + 'static,
{
    let mut sel = Select::new();
    let hit_idx = sel.recv(&hit_rx);
    let op_idx = sel.recv(&op_rx);
    let stop_idx = sel.recv(&stop_rx);

    loop {
        let oper = sel.select();
        match oper.index() {
            i if i == hit_idx => match oper.recv(&hit_rx) {
                Ok(handle) => {
                    trace!(handle, "cache worker: hit");
                    policy.lock().hit(handle);
                }
                Err(_) => break,
            },
            i if i == op_idx => match oper.recv(&op_rx) {
                Ok(Op::Add(handle)) => handle_add(&dict, &ttl_dict, &policy, handle),
                Ok(Op::Del(key)) => evict(&dict, &ttl_dict, &policy, &key),
                Err(_) => break,
            },
            i if i == stop_idx => {
                let _ = oper.recv(&stop_rx);
                break;
            }
            _ => unreachable!("Select only registered three receivers"),
        }
    }
    trace!("cache worker: exiting");
}

fn handle_add<V>(dict: &ShardedDict<DictEntry<V>>, ttl_dict: &ShardedDict<i64>, policy: &Policy<V>, handle: Handle)
where
    V: Clone,
{
    let mut guard = policy.lock();
    let entry = match guard.unpack(handle) {
        Some(entry) => entry,
        // The node was already evicted (e.g. the policy was flushed between
        // `pack` and this event draining); nothing left to install.
        None => return,
    };
    let key = entry.key.clone();
    let expire_time = entry.expire_time();

    // A concurrent Set for the same new key can race two `Add` events
    // through the op channel; whichever lands second must unlink the
    // first's now-stale node so it doesn't become a ghost in the list.
    if let Some(stale) = dict.get(&key) {
        if stale.handle != handle {
            guard.del(stale.handle);
        }
    }

    dict.set(key.clone(), DictEntry { handle, entry });
    ttl_dict.set(key.clone(), expire_time);

    let victim = guard.add(handle);
    drop(guard);

    if let Some(victim_key) = victim {
        debug!(key = %victim_key, "cache worker: evicting over capacity");
        evict(dict, ttl_dict, policy, &victim_key);
    }
}

fn evict<V>(dict: &ShardedDict<DictEntry<V>>, ttl_dict: &ShardedDict<i64>, policy: &Policy<V>, key: &str)
where
    V: Clone,
{
    if let Some(removed) = dict.take(key) {
        ttl_dict.del(key);
        policy.lock().del(removed.handle);
    }
}
