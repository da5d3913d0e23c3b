//! Merge key for the deterministic cross-shard total order.
//!
//! The merged timeline is ordered by `(timestamp, shard_id, shard_seq)`.
//! There is no cross-shard logical clock, so this is an approximation of
//! wall-clock order, not a causal order: timestamps decide, and when two
//! shards report the same millisecond the shard id breaks the tie.
//!
//! Within one shard the key is never consulted on its own. The merge only
//! compares shard heads, so records of a shard keep their file order even
//! when the producer's clock went backwards.

use std::cmp::Ordering;
use std::fmt;

use super::types::{ShardId, Timestamp};

// ---------------------------------------------------------------------------
// MergeKey
// ---------------------------------------------------------------------------

/// Composite ordering key for one shard head during the k-way merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeKey {
    /// Producer wall clock.
    pub timestamp: Timestamp,
    /// Stable tie-break across shards.
    pub shard_id: ShardId,
    /// Position within the shard.
    pub shard_seq: u64,
}

impl MergeKey {
    /// Create a new merge key.
    #[must_use]
    pub const fn new(timestamp: Timestamp, shard_id: ShardId, shard_seq: u64) -> Self {
        Self {
            timestamp,
            shard_id,
            shard_seq,
        }
    }
}

impl PartialOrd for MergeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.shard_id.cmp(&other.shard_id))
            .then_with(|| self.shard_seq.cmp(&other.shard_seq))
    }
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.timestamp.as_millis(),
            self.shard_id,
            self.shard_seq
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ts: i64, shard: &str, seq: u64) -> MergeKey {
        MergeKey::new(Timestamp::from_millis(ts), ShardId::new(shard), seq)
    }

    #[test]
    fn timestamp_is_primary() {
        assert!(key(1, "z", 9) < key(2, "a", 0));
    }

    #[test]
    fn shard_id_breaks_timestamp_ties() {
        assert!(key(5, "alpha.jsonl", 7) < key(5, "beta.jsonl", 0));
    }

    #[test]
    fn shard_seq_is_last_resort() {
        assert!(key(5, "a", 1) < key(5, "a", 2));
        assert_eq!(key(5, "a", 1).cmp(&key(5, "a", 1)), Ordering::Equal);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(key(12, "s/1.jsonl", 3).to_string(), "12:s/1.jsonl:3");
    }
}
