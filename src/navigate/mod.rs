//! Navigation engine: read-mostly queries and restores over a project.
//!
//! | Operation | Module |
//! |---|---|
//! | `status` | [`status`] |
//! | `log` | [`log`] |
//! | `show` | [`show`] |
//! | `diff` | [`diff`] |
//! | `checkout`, `undo`, `reset` | [`restore`] |
//!
//! The timeline and store are never rewritten here. Only `checkout`, `undo`
//! and `reset --hard` touch working files, and `reset`/`undo` move the view
//! head.

pub mod conflict;
pub mod diff;
pub mod log;
pub mod restore;
pub mod show;
pub mod status;

use std::path::Path;

use serde::Serialize;

use crate::error::RetraceError;
use crate::model::path::display_relative;
use crate::model::types::TimelineEntry;
use crate::store::SnapshotStore;
use crate::timeline::TimelineIndex;

pub use conflict::ConflictWarning;
pub use diff::{DiffReport, DiffSide};
pub use log::LogQuery;
pub use restore::{RestoreAction, RestoreReport, RestoredPath};
pub use show::ShowReport;
pub use status::StatusReport;

/// Length of the abbreviated ids shown in listings.
pub const SHORT_ID_LEN: usize = 12;

/// Display form of one timeline entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryView {
    /// Timeline position.
    pub seq: usize,
    /// Full operation id.
    pub id: String,
    /// Abbreviated id.
    pub short_id: String,
    /// Producer id.
    pub producer: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Operation kind.
    pub kind: &'static str,
    /// Target path, relative to the project root when inside it.
    pub path: String,
    /// Whether a snapshot is available.
    pub snapshot: bool,
}

impl EntryView {
    /// Build the view of `entry`.
    #[must_use]
    pub fn new(index: &TimelineIndex, entry: &TimelineEntry) -> Self {
        let path = index
            .path_of(entry.seq)
            .map_or_else(|| entry.operation.path.display().to_string(), |p| {
                display_relative(index.root(), p)
            });
        Self {
            seq: entry.seq,
            id: entry.id().to_string(),
            short_id: entry.id().short(SHORT_ID_LEN).to_owned(),
            producer: entry.producer.to_string(),
            timestamp: entry.operation.timestamp.to_rfc3339(),
            kind: entry.kind().as_str(),
            path,
            snapshot: entry.snapshot,
        }
    }
}

/// Recorded state of a path: `None` means the file did not exist.
pub(crate) fn snapshot_content(
    store: &dyn SnapshotStore,
    entry: &TimelineEntry,
    path: &Path,
) -> Result<Option<Vec<u8>>, RetraceError> {
    let no_snapshot = || RetraceError::NoSnapshot {
        op: entry.id().clone(),
        path: path.to_path_buf(),
    };
    let snapshot = store.lookup(entry.id(), path).ok_or_else(no_snapshot)?;
    if snapshot.deleted {
        return Ok(None);
    }
    store.get(entry.id(), path)?.map(Some).ok_or_else(no_snapshot)
}

// ---------------------------------------------------------------------------
// Shared test fixture
// ---------------------------------------------------------------------------
