//! FNV-1a 64-bit hashing, used for shard routing.
//!
//! Deliberately not `std::hash::BuildHasher`-based: shard placement must be
//! stable across the life of the process (and reproducible in tests), which
//! a per-process-seeded hasher like `ahash::RandomState` cannot give us.

const OFFSET64: u64 = 0xCBF2_9CE4_8422_2325;
const PRIME64: u64 = 0x0000_0100_0000_01B3;

/// FNV-1a 64-bit hash of a key's raw bytes.
pub fn sum64(key: &str) -> u64 {
    let mut hash = OFFSET64;
    for b in key.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(PRIME64);
    }
    hash
}

/// Shard index for `key` among `shard_count` shards. `shard_count` must be a
/// power of two; callers are expected to enforce that (see `dict::coerce_shard_count`).
pub fn shard_index(key: &str, shard_count: usize) -> usize {
    (sum64(key) & (shard_count as u64 - 1)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn deterministic() {
        assert_eq!(sum64("hello"), sum64("hello"));
        assert_ne!(sum64("hello"), sum64("world"));
    }

    #[test]
    fn known_vector() {
        // FNV-1a 64 of the empty string is the offset basis itself.
        assert_eq!(sum64(""), OFFSET64);
    }

    #[test]
    fn shard_distribution_10k_sequential_keys_into_4_shards() {
        let mut counts = [0usize; 4];
        for i in 0..10_000 {
            let key = format!("1234567890k{i}");
            counts[shard_index(&key, 4)] += 1;
        }
        for (idx, count) in counts.iter().enumerate() {
            assert!(*count <= 2600, "shard {idx} got {count} keys");
        }
    }

    #[test]
    fn distributes_reasonably_across_256_shards() {
        let mut seen: HashMap<usize, usize> = HashMap::new();
        for i in 0..10_000 {
            let key = format!("key-{i}");
            *seen.entry(shard_index(&key, 256)).or_insert(0) += 1;
        }
        // With 256 shards and 10,000 keys, expect broad spread, not a handful of shards.
        assert!(seen.len() > 200, "only {} distinct shards touched", seen.len());
    }
}
