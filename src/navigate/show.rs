//! `show`: full operation detail plus its diff against the previous state of
//! the same file.

use std::collections::BTreeMap;

use serde::Serialize;

use super::diff::unified;
use super::{EntryView, SHORT_ID_LEN, snapshot_content};
use crate::error::RetraceError;
use crate::model::path::display_relative;
use crate::model::types::FileSnapshot;
use crate::project::Project;
use crate::store::SnapshotStore;

/// Detail of one operation.
#[derive(Clone, Debug, Serialize)]
pub struct ShowReport {
    /// The entry.
    pub entry: EntryView,
    /// Shard the operation came from.
    pub shard: String,
    /// Position within the shard.
    pub shard_seq: u64,
    /// Recorded causal parent.
    pub parent: Option<String>,
    /// The stored snapshot, if any.
    pub snapshot: Option<FileSnapshot>,
    /// Previous operation that changed the same path.
    pub predecessor: Option<String>,
    /// Unified diff against the predecessor (or empty content). `None` for
    /// reads and when either side's snapshot is unavailable.
    pub diff: Option<String>,
    /// Producer fields the timeline does not interpret.
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Describe an operation.
///
/// # Errors
/// [`RetraceError::NotFound`], [`RetraceError::AmbiguousIdentifier`] or
/// [`RetraceError::PrefixTooShort`] if `id` does not resolve; a store error
/// if a snapshot cannot be read.
pub fn show(project: &Project, id: &str) -> Result<ShowReport, RetraceError> {
    let index = project.index();
    let entry = index.resolve(id)?;
    let path = index
        .path_of(entry.seq)
        .map_or_else(|| index.normalize(&entry.operation.path), ToOwned::to_owned);

    let rel = display_relative(index.root(), &path);

    let snapshot = if entry.snapshot {
        project.store().lookup(entry.id(), &path)
    } else {
        None
    };
    let predecessor = if entry.kind().mutates_file() {
        index.predecessor(&path, entry.seq)
    } else {
        None
    };

    let diff = match (&snapshot, predecessor) {
        (None, _) => None,
        // The previous state was never stored, so there is nothing to diff against.
        (Some(_), Some(prev)) if !prev.snapshot => None,
        (Some(_), prev) => {
            let new = snapshot_content(project.store(), entry, &path)?.unwrap_or_default();
            let (old, old_label) = match prev {
                Some(prev) => (
                    snapshot_content(project.store(), prev, &path)?.unwrap_or_default(),
                    format!("{}/{rel}", prev.id().short(SHORT_ID_LEN)),
                ),
                None => (Vec::new(), "/dev/null".to_owned()),
            };
            let new_label = format!("{}/{rel}", entry.id().short(SHORT_ID_LEN));
            Some(unified(&old, &new, &old_label, &new_label))
        }
    };

    Ok(ShowReport {
        entry: EntryView::new(index, entry),
        shard: entry.shard.to_string(),
        shard_seq: entry.shard_seq,
        parent: entry.operation.parent.as_ref().map(ToString::to_string),
        snapshot,
        predecessor: predecessor.map(|p| p.id().to_string()),
        diff,
        extra: entry.operation.extra.clone(),
    })
}
