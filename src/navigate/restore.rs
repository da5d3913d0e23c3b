//! `checkout`, `undo` and `reset`: restore working files from snapshots.
//!
//! Every restore is planned first (ids resolved, snapshot content read from
//! the store) and only then applied, so a failing request leaves the working
//! tree untouched. Restoring a tombstone deletes the file.
//!
//! A path's state at a point is decided by the latest operation that changed
//! it. When that operation's snapshot failed to store, the path is never
//! restored from an older snapshot: `checkout` fails and `undo`/`reset --hard`
//! leave the file alone and report it as unavailable.
//!
//! Each restored path is checked for later writes by other producers; those
//! are reported as [`ConflictWarning`]s and never block the restore.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::conflict::{ConflictWarning, later_conflicts};
use super::{EntryView, snapshot_content};
use crate::error::RetraceError;
use crate::model::path::display_relative;
use crate::model::types::TimelineEntry;
use crate::project::Project;

/// What happened to one path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreAction {
    /// Content written.
    Written,
    /// File removed (tombstone).
    Deleted,
    /// Left alone: no recorded state at or before the target.
    Skipped,
    /// Left alone: the operation that decided the state has no stored
    /// snapshot.
    Unavailable,
}

/// One path of a restore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RestoredPath {
    /// The path (project-relative when inside the project).
    pub path: String,
    /// What was done.
    pub action: RestoreAction,
    /// Operation whose snapshot was restored (or is unavailable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_op: Option<String>,
    /// Bytes written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

/// Outcome of `checkout`, `undo` or `reset`.
#[derive(Clone, Debug, Serialize)]
pub struct RestoreReport {
    /// The operation restored to (`None` for a no-op undo on an empty project).
    pub target: Option<EntryView>,
    /// Per-path results.
    pub restored: Vec<RestoredPath>,
    /// Later writes by other producers to restored paths.
    pub conflicts: Vec<ConflictWarning>,
    /// The view head after the command.
    pub head: Option<String>,
}

impl RestoreReport {
    /// Paths actually changed on disk.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.restored
            .iter()
            .filter(|r| matches!(r.action, RestoreAction::Written | RestoreAction::Deleted))
            .count()
    }

    /// Paths left alone because their snapshot is unavailable.
    pub fn unavailable(&self) -> impl Iterator<Item = &RestoredPath> {
        self.restored
            .iter()
            .filter(|r| r.action == RestoreAction::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

struct Planned<'a> {
    path: PathBuf,
    state: PlannedState<'a>,
}

enum PlannedState<'a> {
    /// Nothing changed the path at or before the target.
    Unknown,
    /// The deciding operation's snapshot failed to store.
    Unavailable(&'a TimelineEntry),
    /// Recorded content; `None` is a tombstone.
    Recorded(&'a TimelineEntry, Option<Vec<u8>>),
}

fn plan_path<'a>(
    project: &'a Project,
    path: PathBuf,
    target_seq: usize,
) -> Result<(Planned<'a>, Vec<ConflictWarning>), RetraceError> {
    let index = project.index();
    let state = match index.state_at_or_before(&path, target_seq) {
        None => PlannedState::Unknown,
        Some(entry) if !entry.snapshot => PlannedState::Unavailable(entry),
        Some(entry) => {
            let content = snapshot_content(project.store(), entry, &path)?;
            PlannedState::Recorded(entry, content)
        }
    };
    let conflicts = match &state {
        PlannedState::Recorded(entry, _) => {
            later_conflicts(index, &path, target_seq, &entry.producer)
        }
        PlannedState::Unknown | PlannedState::Unavailable(_) => Vec::new(),
    };
    Ok((Planned { path, state }, conflicts))
}

fn apply(project: &Project, plans: Vec<Planned<'_>>) -> Result<Vec<RestoredPath>, RetraceError> {
    let root = project.root();
    plans
        .into_iter()
        .map(|plan| {
            let rel = display_relative(root, &plan.path);
            let (state, content) = match plan.state {
                PlannedState::Unknown => {
                    debug!(path = %rel, "no recorded state at target; skipped");
                    return Ok(RestoredPath {
                        path: rel,
                        action: RestoreAction::Skipped,
                        from_op: None,
                        bytes: None,
                    });
                }
                PlannedState::Unavailable(entry) => {
                    debug!(path = %rel, op = %entry.id(), "snapshot unavailable; left unchanged");
                    return Ok(RestoredPath {
                        path: rel,
                        action: RestoreAction::Unavailable,
                        from_op: Some(entry.id().to_string()),
                        bytes: None,
                    });
                }
                PlannedState::Recorded(entry, content) => (entry, content),
            };
            let from_op = Some(state.id().to_string());
            match content {
                Some(bytes) => {
                    if let Some(parent) = plan.path.parent() {
                        fs::create_dir_all(parent).map_err(|e| RetraceError::io(parent, e))?;
                    }
                    fs::write(&plan.path, &bytes).map_err(|e| RetraceError::io(&plan.path, e))?;
                    debug!(path = %rel, op = %state.id(), bytes = bytes.len(), "restored");
                    Ok(RestoredPath {
                        path: rel,
                        action: RestoreAction::Written,
                        from_op,
                        bytes: Some(bytes.len() as u64),
                    })
                }
                None => {
                    match fs::remove_file(&plan.path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(RetraceError::io(&plan.path, e)),
                    }
                    debug!(path = %rel, op = %state.id(), "removed (tombstone)");
                    Ok(RestoredPath {
                        path: rel,
                        action: RestoreAction::Deleted,
                        from_op,
                        bytes: None,
                    })
                }
            }
        })
        .collect()
}

fn current_head(project: &Project) -> Result<Option<String>, RetraceError> {
    Ok(project.head()?.map(|h| h.id().to_string()))
}

// ---------------------------------------------------------------------------
// checkout
// ---------------------------------------------------------------------------

/// Overwrite `path` with its recorded state at operation `id`.
///
/// The state is decided by the latest operation on `path` at or before `id`,
/// so checking out a mutating operation on `path` restores exactly the
/// content it recorded.
///
/// # Errors
/// - identifier resolution errors
/// - [`RetraceError::NoSnapshot`] if `path` has no recorded state at `id`
/// - [`RetraceError::SnapshotUnavailable`] if the deciding operation's
///   snapshot failed to store
/// - I/O errors writing the working file
#[instrument(skip(project, path), fields(path = %path.display()))]
pub fn checkout(project: &Project, id: &str, path: &Path) -> Result<RestoreReport, RetraceError> {
    let index = project.index();
    let entry = index.resolve(id)?;
    let abs = index.normalize(path);

    let (plan, conflicts) = plan_path(project, abs.clone(), entry.seq)?;
    match plan.state {
        PlannedState::Unknown => {
            return Err(RetraceError::NoSnapshot {
                op: entry.id().clone(),
                path: abs,
            });
        }
        PlannedState::Unavailable(state) => {
            return Err(RetraceError::SnapshotUnavailable {
                op: state.id().clone(),
                path: abs,
            });
        }
        PlannedState::Recorded(..) => {}
    }
    let restored = apply(project, vec![plan])?;
    info!(op = %entry.id(), "checkout complete");

    Ok(RestoreReport {
        target: Some(EntryView::new(index, entry)),
        restored,
        conflicts,
        head: current_head(project)?,
    })
}

// ---------------------------------------------------------------------------
// undo
// ---------------------------------------------------------------------------

/// Step the view back `n` mutating operations and restore every path touched
/// since.
///
/// Positions count snapshot-bearing entries at or before the view head,
/// limited to `path` when given. `undo 0` changes nothing. Without a path
/// filter the view head moves to the target; with one, only that file is
/// restored and the head stays. Files whose state at the target has no stored
/// snapshot are left alone and reported as unavailable.
///
/// # Errors
/// [`RetraceError::HistoryExhausted`] if `n` reaches past the first tracked
/// operation; nothing is modified in that case.
#[instrument(skip(project, path))]
pub fn undo(project: &Project, n: usize, path: Option<&Path>) -> Result<RestoreReport, RetraceError> {
    let index = project.index();
    let head = project.head()?;
    let filter = path.map(|p| index.normalize(p));

    if n == 0 {
        return Ok(RestoreReport {
            target: head.map(|h| EntryView::new(index, h)),
            restored: Vec::new(),
            conflicts: Vec::new(),
            head: current_head(project)?,
        });
    }

    let tracked = head.map_or_else(Vec::new, |h| index.snapshots_up_to(h.seq, filter.as_deref()));
    if n >= tracked.len() {
        return Err(RetraceError::HistoryExhausted {
            requested: n,
            available: tracked.len().saturating_sub(1),
        });
    }
    let target = tracked[tracked.len() - 1 - n];
    let head_seq = head.map_or(target.seq, |h| h.seq);

    // Every file changed since the target, including writes whose snapshot
    // failed to store.
    let touched: BTreeSet<PathBuf> = index.entries()[target.seq + 1..=head_seq]
        .iter()
        .filter(|e| e.kind().mutates_file())
        .filter_map(|e| index.path_of(e.seq))
        .filter(|p| filter.as_deref().is_none_or(|f| *p == f))
        .map(Path::to_path_buf)
        .collect();

    let mut plans = Vec::with_capacity(touched.len());
    let mut conflicts = Vec::new();
    for path in touched {
        let (plan, found) = plan_path(project, path, target.seq)?;
        plans.push(plan);
        conflicts.extend(found);
    }
    let restored = apply(project, plans)?;

    if filter.is_none() {
        project.store().write_head(target.id())?;
    }
    info!(op = %target.id(), steps = n, "undo complete");

    Ok(RestoreReport {
        target: Some(EntryView::new(index, target)),
        restored,
        conflicts,
        head: current_head(project)?,
    })
}

// ---------------------------------------------------------------------------
// reset
// ---------------------------------------------------------------------------

/// Move the view head to `id`; with `hard`, also restore every recorded path
/// to its state at that point.
///
/// Resetting to the latest entry re-attaches the view so it follows new
/// entries again. Under `hard`, paths first recorded after the target are
/// skipped: their earlier state is unknown. Paths whose state at the target
/// has no stored snapshot are left alone and reported as unavailable.
///
/// # Errors
/// Identifier resolution errors, store errors, or I/O errors.
#[instrument(skip(project))]
pub fn reset(project: &Project, id: &str, hard: bool) -> Result<RestoreReport, RetraceError> {
    let index = project.index();
    let entry = index.resolve(id)?;

    let mut restored = Vec::new();
    let mut conflicts = Vec::new();
    if hard {
        let mut plans = Vec::new();
        for path in index.mutated_paths() {
            let (plan, found) = plan_path(project, path.to_path_buf(), entry.seq)?;
            plans.push(plan);
            conflicts.extend(found);
        }
        restored = apply(project, plans)?;
    }

    let is_latest = index.last().is_some_and(|last| last.seq == entry.seq);
    if is_latest {
        project.store().clear_head()?;
    } else {
        project.store().write_head(entry.id())?;
    }
    info!(op = %entry.id(), hard, "reset complete");

    Ok(RestoreReport {
        target: Some(EntryView::new(index, entry)),
        restored,
        conflicts,
        head: current_head(project)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigate::fixture::{Fixture, three_writes};

    #[test]
    fn checkout_restores_content_and_warns_about_later_producer() {
        let fx = three_writes();
        fx.write("foo.txt", "3");
        let project = fx.open();
        let report = checkout(&project, "op-B", Path::new("foo.txt")).unwrap();
        assert_eq!(fx.read("foo.txt").as_deref(), Some("2"));
        assert_eq!(report.restored[0].action, RestoreAction::Written);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].producer, "p1");
        assert_eq!(report.conflicts[0].ops, vec!["op-C-0003"]);
        assert!(report.conflicts[0]
            .to_string()
            .starts_with("warning: foo.txt was also modified later by p1"));
    }

    #[test]
    fn checkout_of_every_write_reproduces_its_content() {
        let fx = three_writes();
        let project = fx.open();
        for (id, want) in [("op-A", "1"), ("op-B", "2"), ("op-C", "3")] {
            checkout(&project, id, &fx.file("foo.txt")).unwrap();
            assert_eq!(fx.read("foo.txt").as_deref(), Some(want));
        }
    }

    #[test]
    fn checkout_without_state_is_no_snapshot_and_touches_nothing() {
        let fx = three_writes();
        let project = fx.open();
        let err = checkout(&project, "op-A", Path::new("other.txt")).unwrap_err();
        assert!(matches!(err, RetraceError::NoSnapshot { .. }));
        assert!(fx.read("other.txt").is_none());
    }

    #[test]
    fn checkout_of_tombstone_deletes_the_file() {
        let fx = Fixture::new();
        fx.shard(
            "s1",
            "p1",
            &[
                ("op-w001", 1, "write", "gone.txt", Some("here")),
                ("op-d001", 2, "delete", "gone.txt", None),
            ],
        );
        fx.write("gone.txt", "here");
        let project = fx.open();
        let report = checkout(&project, "op-d001", Path::new("gone.txt")).unwrap();
        assert_eq!(report.restored[0].action, RestoreAction::Deleted);
        assert!(fx.read("gone.txt").is_none());
        checkout(&project, "op-w001", Path::new("gone.txt")).unwrap();
        assert_eq!(fx.read("gone.txt").as_deref(), Some("here"));
    }

    #[test]
    fn undo_beyond_history_is_exhausted_and_modifies_nothing() {
        let fx = three_writes();
        fx.write("foo.txt", "live");
        let project = fx.open();
        let err = undo(&project, 5, None).unwrap_err();
        assert!(matches!(
            err,
            RetraceError::HistoryExhausted {
                requested: 5,
                available: 2
            }
        ));
        assert_eq!(fx.read("foo.txt").as_deref(), Some("live"));
        assert!(project.store().read_head().unwrap().is_none());
    }

    #[test]
    fn undo_zero_is_a_no_op() {
        let fx = three_writes();
        fx.write("foo.txt", "live");
        let project = fx.open();
        let report = undo(&project, 0, None).unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(fx.read("foo.txt").as_deref(), Some("live"));
        assert!(undo(&Fixture::new().open(), 0, None).is_ok());
    }

    #[test]
    fn undo_steps_back_from_the_view_head() {
        let fx = three_writes();
        let project = fx.open();
        let report = undo(&project, 1, None).unwrap();
        assert_eq!(report.target.unwrap().id, "op-B-0002");
        assert_eq!(fx.read("foo.txt").as_deref(), Some("2"));
        assert_eq!(report.head.as_deref(), Some("op-B-0002"));

        let report = undo(&project, 1, None).unwrap();
        assert_eq!(report.target.unwrap().id, "op-A-0001");
        assert_eq!(fx.read("foo.txt").as_deref(), Some("1"));
    }

    #[test]
    fn undo_is_reverted_by_checkout_of_the_prior_head() {
        let fx = three_writes();
        let project = fx.open();
        checkout(&project, "op-C", Path::new("foo.txt")).unwrap();
        undo(&project, 2, Some(Path::new("foo.txt"))).unwrap();
        assert_eq!(fx.read("foo.txt").as_deref(), Some("1"));
        assert!(project.store().read_head().unwrap().is_none());
        checkout(&project, "op-C", Path::new("foo.txt")).unwrap();
        assert_eq!(fx.read("foo.txt").as_deref(), Some("3"));
    }

    #[test]
    fn undo_with_path_filter_counts_only_that_path() {
        let fx = Fixture::new();
        fx.shard(
            "s1",
            "p1",
            &[
                ("op-a001", 1, "write", "a.txt", Some("a1")),
                ("op-b001", 2, "write", "b.txt", Some("b1")),
                ("op-a002", 3, "write", "a.txt", Some("a2")),
                ("op-b002", 4, "write", "b.txt", Some("b2")),
            ],
        );
        fx.write("a.txt", "a2");
        fx.write("b.txt", "b2");
        let project = fx.open();
        undo(&project, 1, Some(Path::new("a.txt"))).unwrap();
        assert_eq!(fx.read("a.txt").as_deref(), Some("a1"));
        assert_eq!(fx.read("b.txt").as_deref(), Some("b2"));
        assert!(matches!(
            undo(&project, 2, Some(Path::new("a.txt"))),
            Err(RetraceError::HistoryExhausted { .. })
        ));
    }

    #[test]
    fn soft_reset_moves_head_only() {
        let fx = three_writes();
        fx.write("foo.txt", "live");
        let project = fx.open();
        let report = reset(&project, "op-A", false).unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.head.as_deref(), Some("op-A-0001"));
        assert_eq!(fx.read("foo.txt").as_deref(), Some("live"));

        let report = reset(&project, "op-C", false).unwrap();
        assert_eq!(report.head.as_deref(), Some("op-C-0003"));
        assert!(project.store().read_head().unwrap().is_none());
    }

    #[test]
    fn hard_reset_restores_and_skips_later_files() {
        let fx = Fixture::new();
        fx.shard(
            "s1",
            "p1",
            &[
                ("op-a001", 1, "write", "a.txt", Some("a1")),
                ("op-a002", 2, "write", "a.txt", Some("a2")),
                ("op-n001", 3, "write", "new.txt", Some("n")),
            ],
        );
        fx.write("a.txt", "a2");
        fx.write("new.txt", "n");
        let project = fx.open();
        let report = reset(&project, "op-a001", true).unwrap();
        assert_eq!(fx.read("a.txt").as_deref(), Some("a1"));
        assert_eq!(fx.read("new.txt").as_deref(), Some("n"));
        let skipped: Vec<&str> = report
            .restored
            .iter()
            .filter(|r| r.action == RestoreAction::Skipped)
            .map(|r| r.path.as_str())
            .collect();
        assert_eq!(skipped, vec!["new.txt"]);
        assert_eq!(report.changed(), 1);
    }

    #[test]
    fn undo_warns_about_later_producer() {
        let fx = three_writes();
        let project = fx.open();
        let report = undo(&project, 1, None).unwrap();
        assert_eq!(fx.read("foo.txt").as_deref(), Some("2"));
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].path, "foo.txt");
        assert_eq!(report.conflicts[0].producer, "p1");
        assert_eq!(report.conflicts[0].ops, vec!["op-C-0003"]);
    }

    #[test]
    fn hard_reset_warns_about_later_producer() {
        let fx = three_writes();
        let project = fx.open();
        let report = reset(&project, "op-B", true).unwrap();
        assert_eq!(fx.read("foo.txt").as_deref(), Some("2"));
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].producer, "p1");
        assert_eq!(report.conflicts[0].ops, vec!["op-C-0003"]);
    }

    #[test]
    fn checkout_of_failed_snapshot_errors_instead_of_using_older_state() {
        let fx = three_writes();
        fx.conflicting_snapshot("op-B-0002", "foo.txt");
        fx.write("foo.txt", "3");
        let project = fx.open();
        assert!(!project.index().resolve("op-B-0002").unwrap().snapshot);

        let err = checkout(&project, "op-B", Path::new("foo.txt")).unwrap_err();
        match err {
            RetraceError::SnapshotUnavailable { op, .. } => assert_eq!(op.as_str(), "op-B-0002"),
            other => panic!("expected SnapshotUnavailable, got {other:?}"),
        }
        assert_eq!(fx.read("foo.txt").as_deref(), Some("3"));

        checkout(&project, "op-A", Path::new("foo.txt")).unwrap();
        assert_eq!(fx.read("foo.txt").as_deref(), Some("1"));
    }

    #[test]
    fn undo_leaves_file_alone_when_its_state_was_never_stored() {
        let fx = Fixture::new();
        fx.shard(
            "s1",
            "p1",
            &[
                ("op-a001", 1, "write", "foo.txt", Some("1")),
                ("op-d001", 3, "write", "bar.txt", Some("b")),
                ("op-c001", 4, "write", "foo.txt", Some("3")),
            ],
        );
        fx.shard("s2", "p2", &[("op-b001", 2, "write", "foo.txt", Some("2"))]);
        fx.conflicting_snapshot("op-b001", "foo.txt");
        fx.write("foo.txt", "3");
        fx.write("bar.txt", "b");
        let project = fx.open();

        let report = undo(&project, 1, None).unwrap();
        assert_eq!(report.target.as_ref().unwrap().id, "op-d001");
        let foo = report.restored.iter().find(|r| r.path == "foo.txt").unwrap();
        assert_eq!(foo.action, RestoreAction::Unavailable);
        assert_eq!(foo.from_op.as_deref(), Some("op-b001"));
        assert_eq!(report.unavailable().count(), 1);
        assert_eq!(fx.read("foo.txt").as_deref(), Some("3"));
        assert_eq!(report.head.as_deref(), Some("op-d001"));
    }

    #[test]
    fn hard_reset_leaves_file_alone_when_its_state_was_never_stored() {
        let fx = three_writes();
        fx.conflicting_snapshot("op-B-0002", "foo.txt");
        fx.write("foo.txt", "3");
        let project = fx.open();

        let report = reset(&project, "op-B", true).unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(report.restored[0].action, RestoreAction::Unavailable);
        assert_eq!(report.changed(), 0);
        assert!(report.conflicts.is_empty());
        assert_eq!(fx.read("foo.txt").as_deref(), Some("3"));
        assert_eq!(report.head.as_deref(), Some("op-B-0002"));
    }
}
