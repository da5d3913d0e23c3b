//! `status`: shard count, operation count, per-shard last operation, head.

use serde::Serialize;

use super::EntryView;
use crate::error::RetraceError;
use crate::pipeline::ShardSummary;
use crate::project::Project;

/// Project summary. Always available, even for an empty project.
#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    /// Project root.
    pub root: String,
    /// Contributing shards.
    pub shards: Vec<ShardSummary>,
    /// Timeline length.
    pub operations: usize,
    /// Entries with a stored snapshot.
    pub snapshots: usize,
    /// The view head.
    pub head: Option<EntryView>,
    /// Whether `HEAD` pins the view before the latest entry.
    pub detached: bool,
    /// Entries after the view head.
    pub beyond_head: usize,
    /// Non-fatal problems found while loading.
    pub warnings: usize,
}

/// Summarise a project.
///
/// # Errors
/// Returns an error only if the view pointer cannot be read.
pub fn status(project: &Project) -> Result<StatusReport, RetraceError> {
    let index = project.index();
    let head = project.head()?;
    let beyond_head = head.map_or(0, |h| index.len() - h.seq - 1);
    Ok(StatusReport {
        root: project.root().display().to_string(),
        shards: project.report().shards.clone(),
        operations: index.len(),
        snapshots: index.entries().iter().filter(|e| e.snapshot).count(),
        head: head.map(|h| EntryView::new(index, h)),
        detached: beyond_head > 0,
        beyond_head,
        warnings: project.report().warnings.len(),
    })
}
