//! Timeline index: id, prefix and per-file lookups over the merged timeline.
//!
//! Built once per pipeline run (or loaded from `timeline.json`) and read-only
//! afterwards. Lookups:
//!
//! - full id → entry: `HashMap`, O(1)
//! - abbreviated id → entry: sorted id map, O(log n) range scan
//! - path → entries with a snapshot for it, in timeline order
//! - path → every mutating entry for it (conflict analysis)

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RetraceError;
use crate::model::path::normalize;
use crate::model::types::{OperationId, TimelineEntry};
use crate::store::{StoreError, write_atomic};

const TIMELINE_VERSION: u32 = 1;

/// Read-only index over one materialised timeline.
#[derive(Clone, Debug)]
pub struct TimelineIndex {
    root: PathBuf,
    entries: Vec<TimelineEntry>,
    paths: Vec<PathBuf>,
    by_id: HashMap<OperationId, usize>,
    sorted_ids: BTreeMap<String, usize>,
    snapshots_by_path: BTreeMap<PathBuf, Vec<usize>>,
    mutations_by_path: BTreeMap<PathBuf, Vec<usize>>,
    min_prefix_len: usize,
}

#[derive(Serialize, Deserialize)]
struct PersistedTimeline {
    version: u32,
    root: PathBuf,
    entries: Vec<TimelineEntry>,
}

impl TimelineIndex {
    /// Index `entries` (already in timeline order) for a project rooted at
    /// `root`.
    #[must_use]
    pub fn new(root: &Path, entries: Vec<TimelineEntry>, min_prefix_len: usize) -> Self {
        let paths: Vec<PathBuf> = entries
            .iter()
            .map(|e| normalize(root, &e.operation.path))
            .collect();

        let mut by_id = HashMap::with_capacity(entries.len());
        let mut sorted_ids = BTreeMap::new();
        let mut snapshots_by_path: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();
        let mut mutations_by_path: BTreeMap<PathBuf, Vec<usize>> = BTreeMap::new();

        for (pos, entry) in entries.iter().enumerate() {
            by_id.insert(entry.id().clone(), pos);
            sorted_ids.insert(entry.id().as_str().to_owned(), pos);
            if entry.kind().mutates_file() {
                mutations_by_path
                    .entry(paths[pos].clone())
                    .or_default()
                    .push(pos);
                if entry.snapshot {
                    snapshots_by_path
                        .entry(paths[pos].clone())
                        .or_default()
                        .push(pos);
                }
            }
        }

        debug!(
            entries = entries.len(),
            paths = snapshots_by_path.len(),
            "timeline index built"
        );
        Self {
            root: root.to_path_buf(),
            entries,
            paths,
            by_id,
            sorted_ids,
            snapshots_by_path,
            mutations_by_path,
            min_prefix_len: min_prefix_len.max(1),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The project root paths were normalised against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All entries in timeline order.
    #[must_use]
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the timeline is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at a sequence position.
    #[must_use]
    pub fn entry(&self, seq: usize) -> Option<&TimelineEntry> {
        self.entries.get(seq)
    }

    /// Entry for a full id.
    #[must_use]
    pub fn get(&self, id: &OperationId) -> Option<&TimelineEntry> {
        self.by_id.get(id).map(|pos| &self.entries[*pos])
    }

    /// The latest entry.
    #[must_use]
    pub fn last(&self) -> Option<&TimelineEntry> {
        self.entries.last()
    }

    /// Normalised target path of the entry at `seq`.
    #[must_use]
    pub fn path_of(&self, seq: usize) -> Option<&Path> {
        self.paths.get(seq).map(PathBuf::as_path)
    }

    /// Normalise a user-supplied path the way entries are keyed.
    #[must_use]
    pub fn normalize(&self, path: &Path) -> PathBuf {
        normalize(&self.root, path)
    }

    // -----------------------------------------------------------------------
    // Identifier resolution
    // -----------------------------------------------------------------------

    /// Resolve a full id or an unambiguous prefix.
    ///
    /// # Errors
    /// - [`RetraceError::PrefixTooShort`] for a non-exact input shorter than
    ///   the minimum prefix length
    /// - [`RetraceError::NotFound`] if nothing matches
    /// - [`RetraceError::AmbiguousIdentifier`] listing every match
    pub fn resolve(&self, input: &str) -> Result<&TimelineEntry, RetraceError> {
        if let Some(pos) = self.sorted_ids.get(input) {
            return Ok(&self.entries[*pos]);
        }
        if input.chars().count() < self.min_prefix_len {
            return Err(RetraceError::PrefixTooShort {
                prefix: input.to_owned(),
                min: self.min_prefix_len,
            });
        }

        let matches: Vec<usize> = self
            .sorted_ids
            .range::<str, _>((Bound::Included(input), Bound::Unbounded))
            .take_while(|(id, _)| id.starts_with(input))
            .map(|(_, pos)| *pos)
            .collect();

        match matches.as_slice() {
            [] => Err(RetraceError::NotFound {
                id: input.to_owned(),
            }),
            [pos] => Ok(&self.entries[*pos]),
            many => Err(RetraceError::AmbiguousIdentifier {
                prefix: input.to_owned(),
                candidates: many.iter().map(|p| self.entries[*p].id().clone()).collect(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Per-file queries
    // -----------------------------------------------------------------------

    /// Every path some operation changed, sorted.
    pub fn mutated_paths(&self) -> impl Iterator<Item = &Path> {
        self.mutations_by_path.keys().map(PathBuf::as_path)
    }

    /// Latest mutating entry for `path` at or before `seq`.
    ///
    /// This is the operation that determined the file's state at `seq`. Its
    /// `snapshot` flag says whether that state can be restored; an earlier
    /// snapshot never stands in for it.
    #[must_use]
    pub fn state_at_or_before(&self, path: &Path, seq: usize) -> Option<&TimelineEntry> {
        let positions = self.mutation_positions(path);
        let idx = positions.partition_point(|p| *p <= seq);
        idx.checked_sub(1).map(|i| &self.entries[positions[i]])
    }

    /// Latest mutating entry for `path` strictly before `seq`.
    #[must_use]
    pub fn predecessor(&self, path: &Path, seq: usize) -> Option<&TimelineEntry> {
        seq.checked_sub(1)
            .and_then(|before| self.state_at_or_before(path, before))
    }

    /// Mutating entries for `path` positioned after `seq`, whether or not
    /// their snapshot was stored.
    #[must_use]
    pub fn mutations_after(&self, path: &Path, seq: usize) -> Vec<&TimelineEntry> {
        let positions = self.mutation_positions(path);
        let start = positions.partition_point(|p| *p <= seq);
        positions[start..]
            .iter()
            .map(|pos| &self.entries[*pos])
            .collect()
    }

    /// Snapshot-bearing entries at or before `head`, optionally limited to
    /// one path, in timeline order.
    #[must_use]
    pub fn snapshots_up_to(&self, head: usize, path: Option<&Path>) -> Vec<&TimelineEntry> {
        let upto = |positions: &[usize]| {
            let end = positions.partition_point(|p| *p <= head);
            positions[..end].to_vec()
        };
        let mut positions: Vec<usize> = match path {
            Some(path) => upto(self.snapshot_positions(path)),
            None => self
                .snapshots_by_path
                .values()
                .flat_map(|p| upto(p))
                .collect(),
        };
        positions.sort_unstable();
        positions.iter().map(|pos| &self.entries[*pos]).collect()
    }

    fn snapshot_positions(&self, path: &Path) -> &[usize] {
        self.snapshots_by_path
            .get(path)
            .map_or(&[][..], Vec::as_slice)
    }

    fn mutation_positions(&self, path: &Path) -> &[usize] {
        self.mutations_by_path
            .get(path)
            .map_or(&[][..], Vec::as_slice)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the timeline to `path` atomically.
    ///
    /// # Errors
    /// Returns an error if serialisation or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let persisted = PersistedTimeline {
            version: TIMELINE_VERSION,
            root: self.root.clone(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&persisted).map_err(|source| StoreError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &json)
    }

    /// Load a timeline saved by [`save`](Self::save). `Ok(None)` if the file
    /// does not exist or was written by an incompatible version.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path, min_prefix_len: usize) -> Result<Option<Self>, StoreError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let persisted: PersistedTimeline =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialize {
                path: path.to_path_buf(),
                source,
            })?;
        if persisted.version != TIMELINE_VERSION {
            warn!(
                path = %path.display(),
                found = persisted.version,
                expected = TIMELINE_VERSION,
                "stored timeline has an incompatible version; ignoring it"
            );
            return Ok(None);
        }
        Ok(Some(Self::new(
            &persisted.root,
            persisted.entries,
            min_prefix_len,
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{OpKind, Operation, ProducerId, ShardId, Timestamp};
    use std::collections::BTreeMap;

    fn entry(seq: usize, id: &str, producer: &str, kind: OpKind, path: &str) -> TimelineEntry {
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
                path: PathBuf::from(path),
                content: None,
                extra: BTreeMap::new(),
            },
            snapshot: kind.mutates_file(),
        }
    }

    fn sample() -> TimelineIndex {
        TimelineIndex::new(
            Path::new("/proj"),
            vec![
                entry(0, "aaaa1111", "p1", OpKind::Write, "foo.txt"),
                entry(1, "aaaa2222", "p2", OpKind::Write, "foo.txt"),
                entry(2, "bbbb3333", "p1", OpKind::Read, "foo.txt"),
                entry(3, "cccc4444", "p1", OpKind::Write, "/proj/bar.txt"),
                entry(4, "dddd5555", "p1", OpKind::Write, "./foo.txt"),
            ],
            4,
        )
    }

    #[test]
    fn full_id_resolves() {
        let index = sample();
        assert_eq!(index.resolve("cccc4444").unwrap().seq, 3);
    }

    #[test]
    fn unique_prefix_resolves() {
        let index = sample();
        assert_eq!(index.resolve("bbbb").unwrap().seq, 2);
        assert_eq!(index.resolve("aaaa2").unwrap().seq, 1);
    }

    #[test]
    fn ambiguous_prefix_lists_all_candidates() {
        let index = sample();
        let err = index.resolve("aaaa").unwrap_err();
        match err {
            RetraceError::AmbiguousIdentifier { candidates, .. } => {
                let ids: Vec<&str> = candidates.iter().map(OperationId::as_str).collect();
                assert_eq!(ids, vec!["aaaa1111", "aaaa2222"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn short_and_unknown_prefixes() {
        let index = sample();
        assert!(matches!(
            index.resolve("aa"),
            Err(RetraceError::PrefixTooShort { min: 4, .. })
        ));
        assert!(matches!(
            index.resolve("zzzz"),
            Err(RetraceError::NotFound { .. })
        ));
    }

    #[test]
    fn exact_id_wins_even_below_minimum() {
        let index = TimelineIndex::new(
            Path::new("/proj"),
            vec![
                entry(0, "ab", "p1", OpKind::Write, "a"),
                entry(1, "abcd", "p1", OpKind::Write, "a"),
            ],
            4,
        );
        assert_eq!(index.resolve("ab").unwrap().seq, 0);
        assert_eq!(index.resolve("abcd").unwrap().seq, 1);
    }

    #[test]
    fn path_state_is_per_normalised_path_and_skips_reads() {
        let index = sample();
        let foo = Path::new("/proj/foo.txt");
        let changed: Vec<usize> = index.mutations_after(foo, 0).iter().map(|e| e.seq).collect();
        assert_eq!(changed, vec![1, 4]);
        assert_eq!(index.state_at_or_before(foo, 3).unwrap().seq, 1);
        assert!(index.state_at_or_before(Path::new("/proj/none"), 4).is_none());
    }

    #[test]
    fn state_neighbours() {
        let index = sample();
        let foo = Path::new("/proj/foo.txt");
        assert_eq!(index.state_at_or_before(foo, 2).unwrap().seq, 1);
        assert_eq!(index.state_at_or_before(foo, 4).unwrap().seq, 4);
        assert_eq!(index.predecessor(foo, 4).unwrap().seq, 1);
        assert!(index.predecessor(foo, 0).is_none());
        let later: Vec<usize> = index.mutations_after(foo, 0).iter().map(|e| e.seq).collect();
        assert_eq!(later, vec![1, 4]);
    }

    #[test]
    fn snapshots_up_to_head() {
        let index = sample();
        let all: Vec<usize> = index.snapshots_up_to(3, None).iter().map(|e| e.seq).collect();
        assert_eq!(all, vec![0, 1, 3]);
        let foo: Vec<usize> = index
            .snapshots_up_to(4, Some(Path::new("/proj/foo.txt")))
            .iter()
            .map(|e| e.seq)
            .collect();
        assert_eq!(foo, vec![0, 1, 4]);
    }

    #[test]
    fn unstored_snapshot_still_determines_state() {
        let mut failed = entry(1, "ffff0000", "p2", OpKind::Write, "foo.txt");
        failed.snapshot = false;
        let index = TimelineIndex::new(
            Path::new("/proj"),
            vec![entry(0, "aaaa0000", "p1", OpKind::Write, "foo.txt"), failed],
            4,
        );
        let foo = Path::new("/proj/foo.txt");
        assert_eq!(index.mutations_after(foo, 0).len(), 1);

        let state = index.state_at_or_before(foo, 1).unwrap();
        assert_eq!(state.id().as_str(), "ffff0000");
        assert!(!state.snapshot);
        assert_eq!(index.mutated_paths().count(), 1);
        assert_eq!(index.snapshots_up_to(1, Some(foo)).len(), 1);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("timeline.json");
        let index = sample();
        index.save(&path).unwrap();
        let loaded = TimelineIndex::load(&path, 4).unwrap().unwrap();
        assert_eq!(loaded.entries(), index.entries());
        assert_eq!(loaded.root(), Path::new("/proj"));
        assert!(TimelineIndex::load(&dir.path().join("missing.json"), 4)
            .unwrap()
            .is_none());
    }

    #[test]
    fn incompatible_version_loads_as_absent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("timeline.json");
        std::fs::write(&path, r#"{"version":99,"root":"/proj","entries":[]}"#).unwrap();
        assert!(TimelineIndex::load(&path, 4).unwrap().is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        proptest! {
            #[test]
            fn prefix_resolution_agrees_with_full_id(
                ids in prop::collection::btree_set("[0-9a-f]{8}", 1..20),
                pick in any::<prop::sample::Index>(),
                len in 4usize..=8,
            ) {
                let ids: Vec<String> = ids.into_iter().collect();
                let entries = ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| entry(i, id, "p", OpKind::Write, "f"))
                    .collect();
                let index = TimelineIndex::new(Path::new("/proj"), entries, 4);

                let target = pick.get(&ids);
                let prefix = &target[..len];
                let matching: BTreeSet<&String> =
                    ids.iter().filter(|id| id.starts_with(prefix)).collect();

                match index.resolve(prefix) {
                    Ok(found) => {
                        prop_assert!(matching.len() == 1 || found.id().as_str() == prefix);
                        prop_assert_eq!(found.id(), index.resolve(target).unwrap().id());
                    }
                    Err(RetraceError::AmbiguousIdentifier { candidates, .. }) => {
                        let got: BTreeSet<&str> = candidates.iter().map(OperationId::as_str).collect();
                        let want: BTreeSet<&str> = matching.iter().map(|s| s.as_str()).collect();
                        prop_assert_eq!(got, want);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }
        }
    }
}
