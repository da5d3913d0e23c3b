//! Snapshot extraction: which file state each timeline entry produces.
//!
//! Reads produce nothing. Writes snapshot the content the producer recorded
//! (no diff recomputation). Deletes produce a tombstone. Consecutive identical
//! states are not collapsed; every mutating entry gets its own snapshot.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::model::path::normalize;
use crate::model::types::{OpKind, OperationId, TimelineEntry};

/// Content to store for one entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotContent<'a> {
    /// The file's bytes after the operation.
    Bytes(&'a [u8]),
    /// The file did not exist after the operation.
    Tombstone,
}

/// One snapshot the store must hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRequest<'a> {
    /// Timeline position of the producing entry.
    pub seq: usize,
    /// The producing operation.
    pub op: &'a OperationId,
    /// Normalised absolute target path.
    pub path: PathBuf,
    /// What to store.
    pub content: SnapshotContent<'a>,
}

/// Walk `entries` in timeline order and list the snapshots they produce.
#[instrument(skip_all, fields(entries = entries.len()))]
#[must_use]
pub fn extract<'a>(entries: &'a [TimelineEntry], project_root: &Path) -> Vec<SnapshotRequest<'a>> {
    let requests: Vec<SnapshotRequest<'a>> = entries
        .iter()
        .filter_map(|entry| {
            let op = &entry.operation;
            let content = match op.kind {
                OpKind::Read => return None,
                OpKind::Delete => SnapshotContent::Tombstone,
                OpKind::Write | OpKind::MultiWrite => {
                    let Some(bytes) = op.content.as_deref() else {
                        debug!(op = %op.id, "mutating entry carries no content; no snapshot");
                        return None;
                    };
                    SnapshotContent::Bytes(bytes)
                }
            };
            Some(SnapshotRequest {
                seq: entry.seq,
                op: &op.id,
                path: normalize(project_root, &op.path),
                content,
            })
        })
        .collect();
    debug!(snapshots = requests.len(), "extraction complete");
    requests
}
