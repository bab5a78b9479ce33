//! TTL Expirer: a background thread that periodically samples random keys
//! and deletes the ones that have expired, instead of scanning the whole
//! keyspace. Shaped like Redis's probabilistic expirer.
//!
//! There is no TTL expirer in the Go source this crate otherwise tracks
//! closely (`go-localcache` only expires lazily, on `Get`) — this is an
//! active addition, grounded in the same dedicated-background-thread
//! pattern as `src/worker.rs`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use tracing::debug;

use crate::cache::{now_unix, Op};
use crate::dict::ShardedDict;

const TICK_INTERVAL: Duration = Duration::from_millis(100);
const TICK_BUDGET: Duration = Duration::from_millis(50);
const SAMPLE_SIZE: usize = 100;
const RESAMPLE_THRESHOLD: u32 = 25;

pub(crate) fn run(ttl_dict: Arc<ShardedDict<i64>>, op_tx: Sender<Op>, stop_rx: Receiver<()>) {
    let ticker = crossbeam_channel::tick(TICK_INTERVAL);
    loop {
        select! {
            recv(ticker) -> _ => sweep(&ttl_dict, &op_tx),
            recv(stop_rx) -> _ => break,
        }
    }
}

fn sweep(ttl_dict: &ShardedDict<i64>, op_tx: &Sender<Op>) {
    let tick_start = Instant::now();
    let mut passes = 0u32;
    let mut total_sampled = 0usize;
    let mut total_expired = 0u32;

    loop {
        passes += 1;
        let now = now_unix();
        let sample = ttl_dict.rand_entries(SAMPLE_SIZE);
        let mut seen = HashSet::with_capacity(sample.len());
        let mut expired_in_sample = 0u32;

        total_sampled += sample.len();
        for (key, expire_time) in sample {
            if !seen.insert(key.clone()) {
                continue;
            }
            if now > expire_time {
                // Best-effort: if the op channel has been torn down (cache
                // stopping concurrently) there is nothing useful to do with
                // the error here; the dict will be dropped with the cache.
                let _ = op_tx.send(Op::Del(key));
                expired_in_sample += 1;
            }
        }
        total_expired += expired_in_sample;

        if expired_in_sample <= RESAMPLE_THRESHOLD || tick_start.elapsed() >= TICK_BUDGET {
            break;
        }
    }

    debug!(
        passes,
        sampled = total_sampled,
        expired = total_expired,
        elapsed_ms = tick_start.elapsed().as_millis() as u64,
        "ttl expirer: sweep complete"
    );
}

