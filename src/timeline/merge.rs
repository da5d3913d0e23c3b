//! K-way merge of decoded shards into one global timeline.
//!
//! Each shard is a queue whose internal order is fixed. The merge repeatedly
//! takes the shard head with the smallest [`MergeKey`]
//! `(timestamp, shard_id, shard_seq)`. Only heads are compared, so a record
//! never overtakes an earlier record of its own shard, even when its
//! timestamp is smaller.
//!
//! The merge is single-threaded and a pure function of its input: the same
//! shards always produce the same sequence indices.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet, VecDeque};

use tracing::{debug, instrument};

use crate::model::ordering::MergeKey;
use crate::model::types::{Operation, OperationId, ProducerId, ShardId, TimelineEntry};

/// Operations of one shard, in file order.
#[derive(Clone, Debug)]
pub struct DecodedShard {
    /// The shard id (merge tie-break).
    pub id: ShardId,
    /// The shard's discovered producer.
    pub producer: ProducerId,
    /// Decoded operations with their intra-shard sequence numbers.
    pub operations: Vec<(u64, Operation)>,
}

/// An operation dropped because its id was already merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateOperation {
    /// The repeated id.
    pub id: OperationId,
    /// The shard holding the dropped copy.
    pub shard: ShardId,
    /// The position of the dropped copy in its shard.
    pub shard_seq: u64,
}

/// Output of [`merge`].
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// The merged timeline, `seq` assigned in output order.
    pub entries: Vec<TimelineEntry>,
    /// Later copies of already-seen ids.
    pub duplicates: Vec<DuplicateOperation>,
}

struct Cursor {
    id: ShardId,
    queue: VecDeque<(u64, Operation)>,
}

impl Cursor {
    fn head_key(&self) -> Option<MergeKey> {
        self.queue
            .front()
            .map(|(seq, op)| MergeKey::new(op.timestamp, self.id.clone(), *seq))
    }
}

/// Merge shards into one deterministic sequence.
#[instrument(skip_all, fields(shards = shards.len()))]
#[must_use]
pub fn merge(shards: Vec<DecodedShard>) -> MergeOutcome {
    let mut cursors: Vec<Cursor> = shards
        .into_iter()
        .map(|shard| Cursor {
            id: shard.id,
            queue: shard.operations.into(),
        })
        .collect();

    let mut heap: BinaryHeap<Reverse<(MergeKey, usize)>> = cursors
        .iter()
        .enumerate()
        .filter_map(|(idx, cursor)| cursor.head_key().map(|key| Reverse((key, idx))))
        .collect();

    let mut outcome = MergeOutcome::default();
    let mut seen: HashSet<OperationId> = HashSet::new();

    while let Some(Reverse((_, idx))) = heap.pop() {
        let cursor = &mut cursors[idx];
        let Some((shard_seq, operation)) = cursor.queue.pop_front() else {
            continue;
        };

        if seen.contains(&operation.id) {
            debug!(id = %operation.id, shard = %cursor.id, "dropping duplicate operation id");
            outcome.duplicates.push(DuplicateOperation {
                id: operation.id,
                shard: cursor.id.clone(),
                shard_seq,
            });
        } else {
            seen.insert(operation.id.clone());
            outcome.entries.push(TimelineEntry {
                seq: outcome.entries.len(),
                shard: cursor.id.clone(),
                shard_seq,
                producer: operation.producer.clone(),
                operation,
                snapshot: false,
            });
        }

        if let Some(key) = cursor.head_key() {
            heap.push(Reverse((key, idx)));
        }
    }

    debug!(
        entries = outcome.entries.len(),
        duplicates = outcome.duplicates.len(),
        "merge complete"
    );
    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{OpKind, Timestamp};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn op(id: &str, producer: &str, ts: i64) -> Operation {
        Operation {
            id: OperationId::new(id).unwrap(),
            producer: ProducerId::new(producer).unwrap(),
            timestamp: Timestamp::from_millis(ts),
            parent: None,
            kind: OpKind::Write,
            path: PathBuf::from("foo.txt"),
            content: Some(id.as_bytes().to_vec()),
            extra: BTreeMap::new(),
        }
    }

    fn shard(id: &str, ops: Vec<Operation>) -> DecodedShard {
        let producer = ops
            .first()
            .map_or_else(|| ProducerId::new(id).unwrap(), |o| o.producer.clone());
        DecodedShard {
            id: ShardId::new(id),
            producer,
            operations: ops.into_iter().enumerate().map(|(i, o)| (i as u64, o)).collect(),
        }
    }

    fn ids(outcome: &MergeOutcome) -> Vec<&str> {
        outcome.entries.iter().map(|e| e.id().as_str()).collect()
    }

    #[test]
    fn interleaves_by_timestamp() {
        let out = merge(vec![
            shard("s1", vec![op("A", "p1", 1), op("C", "p1", 3)]),
            shard("s2", vec![op("B", "p2", 2)]),
        ]);
        assert_eq!(ids(&out), vec!["A", "B", "C"]);
        let seqs: Vec<usize> = out.entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(out.entries[1].producer.as_str(), "p2");
    }

    #[test]
    fn equal_timestamps_break_on_shard_id() {
        let out = merge(vec![
            shard("zeta", vec![op("Z", "p1", 5)]),
            shard("alpha", vec![op("A", "p2", 5)]),
        ]);
        assert_eq!(ids(&out), vec!["A", "Z"]);
    }

    #[test]
    fn backwards_clock_never_reorders_a_shard() {
        let out = merge(vec![
            shard("s1", vec![op("first", "p1", 10), op("second", "p1", 1)]),
            shard("s2", vec![op("other", "p2", 5)]),
        ]);
        assert_eq!(ids(&out), vec!["other", "first", "second"]);
    }

    #[test]
    fn empty_shards_contribute_nothing() {
        let out = merge(vec![shard("s1", vec![]), shard("s2", vec![op("X", "p", 1)])]);
        assert_eq!(ids(&out), vec!["X"]);
        assert!(merge(vec![]).entries.is_empty());
    }

    #[test]
    fn duplicate_ids_keep_first_in_merge_order() {
        let out = merge(vec![
            shard("s1", vec![op("dup", "p1", 1)]),
            shard("s2", vec![op("dup", "p2", 2), op("Y", "p2", 3)]),
        ]);
        assert_eq!(ids(&out), vec!["dup", "Y"]);
        assert_eq!(out.entries[0].shard.as_str(), "s1");
        assert_eq!(out.duplicates.len(), 1);
        assert_eq!(out.duplicates[0].shard.as_str(), "s2");
        assert_eq!(out.entries[1].seq, 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_shards() -> impl Strategy<Value = Vec<Vec<i64>>> {
            prop::collection::vec(prop::collection::vec(0i64..20, 0..8), 0..5)
        }

        fn build(timestamps: &[Vec<i64>]) -> Vec<DecodedShard> {
            timestamps
                .iter()
                .enumerate()
                .map(|(s, stamps)| {
                    let ops = stamps
                        .iter()
                        .enumerate()
                        .map(|(i, ts)| op(&format!("s{s}-{i}"), &format!("p{s}"), *ts))
                        .collect();
                    shard(&format!("shard-{s}"), ops)
                })
                .collect()
        }

        proptest! {
            #[test]
            fn intra_shard_order_is_preserved(stamps in arb_shards()) {
                let out = merge(build(&stamps));
                let total: usize = stamps.iter().map(Vec::len).sum();
                prop_assert_eq!(out.entries.len(), total);

                let mut last: BTreeMap<String, u64> = BTreeMap::new();
                for entry in &out.entries {
                    if let Some(prev) = last.get(entry.shard.as_str()) {
                        prop_assert!(entry.shard_seq > *prev);
                    }
                    last.insert(entry.shard.as_str().to_owned(), entry.shard_seq);
                }
            }

            #[test]
            fn merge_is_deterministic(stamps in arb_shards()) {
                let a = merge(build(&stamps));
                let b = merge(build(&stamps));
                prop_assert_eq!(a.entries, b.entries);
            }

            #[test]
            fn shard_input_order_does_not_matter(stamps in arb_shards()) {
                let forward = merge(build(&stamps));
                let mut reversed = build(&stamps);
                reversed.reverse();
                let backward = merge(reversed);
                prop_assert_eq!(forward.entries, backward.entries);
            }
        }
    }
}
