//! Cross-producer conflict analysis for restores.
//!
//! Read-only scan over the index: after restoring `path` to a snapshot made by
//! producer P, any later mutating operation on `path` by a producer other
//! than P is reported. Conflicts never block the restore.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::model::path::display_relative;
use crate::model::types::{ProducerId, TimelineEntry};
use crate::timeline::TimelineIndex;

/// Later writes by one competing producer to a restored path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConflictWarning {
    /// The restored path (project-relative when inside the project).
    pub path: String,
    /// The competing producer.
    pub producer: String,
    /// Its later operations on the path, in timeline order.
    pub ops: Vec<String>,
}

impl fmt::Display for ConflictWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "warning: {} was also modified later by {} in {}",
            self.path,
            self.producer,
            self.ops.join(", ")
        )
    }
}

/// Competing later writes to `path` after position `target_seq`.
#[must_use]
pub fn later_conflicts(
    index: &TimelineIndex,
    path: &Path,
    target_seq: usize,
    restored_by: &ProducerId,
) -> Vec<ConflictWarning> {
    let rel = display_relative(index.root(), path);
    let mut by_producer: Vec<(&ProducerId, Vec<&TimelineEntry>)> = Vec::new();
    for entry in index.mutations_after(path, target_seq) {
        if entry.producer == *restored_by {
            continue;
        }
        match by_producer.iter_mut().find(|(p, _)| **p == entry.producer) {
            Some((_, ops)) => ops.push(entry),
            None => by_producer.push((&entry.producer, vec![entry])),
        }
    }
    by_producer
        .into_iter()
        .map(|(producer, ops)| ConflictWarning {
            path: rel.clone(),
            producer: producer.to_string(),
            ops: ops.iter().map(|e| e.id().to_string()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{OpKind, Operation, OperationId, ShardId, Timestamp};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn entry(seq: usize, id: &str, producer: &str, kind: OpKind) -> TimelineEntry {
        let producer = ProducerId::new(producer).unwrap();
        TimelineEntry {
            seq,
            shard: ShardId::new(producer.as_str()),
            shard_seq: 0,
            producer: producer.clone(),
            operation: Operation {
                id: OperationId::new(id).unwrap(),
                producer,
                timestamp: Timestamp::from_millis(seq as i64),
                parent: None,
                kind,
                path: PathBuf::from("foo.txt"),
                content: None,
                extra: BTreeMap::new(),
            },
            snapshot: kind.mutates_file(),
        }
    }

    #[test]
    fn groups_later_writes_by_other_producers() {
        let index = TimelineIndex::new(
            Path::new("/proj"),
            vec![
                entry(0, "a", "p1", OpKind::Write),
                entry(1, "b", "p2", OpKind::Write),
                entry(2, "c", "p1", OpKind::Write),
                entry(3, "d", "p3", OpKind::Read),
                entry(4, "e", "p3", OpKind::Delete),
                entry(5, "f", "p1", OpKind::MultiWrite),
            ],
            1,
        );
        let p2 = ProducerId::new("p2").unwrap();
        let warnings = later_conflicts(&index, Path::new("/proj/foo.txt"), 1, &p2);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].producer, "p1");
        assert_eq!(warnings[0].ops, vec!["c", "f"]);
        assert_eq!(warnings[1].producer, "p3");
        assert_eq!(
            warnings[0].to_string(),
            "warning: foo.txt was also modified later by p1 in c, f"
        );
    }

    #[test]
    fn same_producer_is_not_a_conflict() {
        let index = TimelineIndex::new(
            Path::new("/proj"),
            vec![entry(0, "a", "p1", OpKind::Write), entry(1, "b", "p1", OpKind::Write)],
            1,
        );
        let p1 = ProducerId::new("p1").unwrap();
        assert!(later_conflicts(&index, Path::new("/proj/foo.txt"), 0, &p1).is_empty());
    }
}
