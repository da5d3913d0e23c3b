//! `diff`: textual diff between two recorded file states, or one recorded
//! state and the live working file.

use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

use super::snapshot_content;
use crate::error::RetraceError;
use crate::model::path::display_relative;
use crate::model::types::TimelineEntry;
use crate::project::Project;

/// Sentinel naming the live working file.
pub const CURRENT: &str = "current";

/// One side of a diff as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffSide {
    /// An operation id or prefix.
    Op(String),
    /// The live working file.
    Current,
}

impl DiffSide {
    /// Parse a command-line argument; `current` selects the working file.
    #[must_use]
    pub fn parse(arg: &str) -> Self {
        if arg == CURRENT {
            Self::Current
        } else {
            Self::Op(arg.to_owned())
        }
    }
}

/// Result of a diff.
#[derive(Clone, Debug, Serialize)]
pub struct DiffReport {
    /// Label of the old side.
    pub from: String,
    /// Label of the new side.
    pub to: String,
    /// The compared path (project-relative when inside the project).
    pub path: String,
    /// `true` if both sides hold the same content.
    pub identical: bool,
    /// Unified diff text; empty when identical.
    pub diff: String,
}

/// Compare two sides.
///
/// Without `path`, each operation side uses its own target path and a
/// `current` side uses the other side's path. A side names the file state at
/// that point in the timeline, as recorded by the latest operation on the
/// path at or before the operation.
///
/// # Errors
/// - [`RetraceError::NothingToCompare`] if both sides are `current`
/// - [`RetraceError::NotFound`] / [`RetraceError::AmbiguousIdentifier`] for
///   unresolvable ids
/// - [`RetraceError::NoSnapshot`] if a side has no recorded state for the path
/// - [`RetraceError::SnapshotUnavailable`] if a side's state was never stored
pub fn diff(
    project: &Project,
    from: &DiffSide,
    to: &DiffSide,
    path: Option<&Path>,
) -> Result<DiffReport, RetraceError> {
    let index = project.index();
    let resolve = |side: &DiffSide| match side {
        DiffSide::Op(id) => index.resolve(id).map(Some),
        DiffSide::Current => Ok(None),
    };
    let (from_entry, to_entry) = (resolve(from)?, resolve(to)?);

    let target: PathBuf = match (path, from_entry, to_entry) {
        (_, None, None) => return Err(RetraceError::NothingToCompare),
        (Some(p), _, _) => index.normalize(p),
        (None, Some(e), _) | (None, None, Some(e)) => index
            .path_of(e.seq)
            .map_or_else(|| index.normalize(&e.operation.path), Path::to_path_buf),
    };
    // A second operation side without an explicit path compares its own file.
    let to_path = match (path, from_entry, to_entry) {
        (None, Some(_), Some(e)) => index
            .path_of(e.seq)
            .map_or_else(|| index.normalize(&e.operation.path), Path::to_path_buf),
        _ => target.clone(),
    };

    let (old, from_label) = side_state(project, from_entry, &target)?;
    let (new, to_label) = side_state(project, to_entry, &to_path)?;

    let identical = old == new;
    let diff = if identical {
        String::new()
    } else {
        unified(
            old.as_deref().unwrap_or_default(),
            new.as_deref().unwrap_or_default(),
            &from_label,
            &to_label,
        )
    };

    Ok(DiffReport {
        from: from_label,
        to: to_label,
        path: display_relative(index.root(), &target),
        identical,
        diff,
    })
}

/// Content of one side (`None` = file absent) and its label.
fn side_state(
    project: &Project,
    entry: Option<&TimelineEntry>,
    path: &Path,
) -> Result<(Option<Vec<u8>>, String), RetraceError> {
    let rel = display_relative(project.root(), path);
    match entry {
        None => {
            let content = match std::fs::read(path) {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(RetraceError::io(path, e)),
            };
            Ok((content, format!("{CURRENT}/{rel}")))
        }
        Some(entry) => {
            let state = project
                .index()
                .state_at_or_before(path, entry.seq)
                .ok_or_else(|| RetraceError::NoSnapshot {
                    op: entry.id().clone(),
                    path: path.to_path_buf(),
                })?;
            if !state.snapshot {
                return Err(RetraceError::SnapshotUnavailable {
                    op: state.id().clone(),
                    path: path.to_path_buf(),
                });
            }
            let content = snapshot_content(project.store(), state, path)?;
            Ok((content, format!("{}/{rel}", entry.id().short(super::SHORT_ID_LEN))))
        }
    }
}

/// Unified diff of two byte strings (lossy UTF-8), three lines of context.
#[must_use]
pub fn unified(old: &[u8], new: &[u8], old_label: &str, new_label: &str) -> String {
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);
    TextDiff::from_lines(old.as_ref(), new.as_ref())
        .unified_diff()
        .context_radius(3)
        .header(old_label, new_label)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigate::fixture::three_writes;

    fn op(s: &str) -> DiffSide {
        DiffSide::parse(s)
    }

    #[test]
    fn two_operations_diff() {
        let fx = three_writes();
        let report = diff(&fx.open(), &op("op-A"), &op("op-C"), None).unwrap();
        assert!(!report.identical);
        assert!(report.diff.contains("-1"), "{}", report.diff);
        assert!(report.diff.contains("+3"), "{}", report.diff);
        assert_eq!(report.path, "foo.txt");
    }

    #[test]
    fn identical_states_are_not_an_error() {
        let fx = three_writes();
        let report = diff(&fx.open(), &op("op-B"), &op("op-B"), None).unwrap();
        assert!(report.identical);
        assert!(report.diff.is_empty());
    }

    #[test]
    fn current_side_reads_working_file() {
        let fx = three_writes();
        fx.write("foo.txt", "3");
        let project = fx.open();
        assert!(diff(&project, &op("op-C"), &DiffSide::Current, None)
            .unwrap()
            .identical);
        fx.write("foo.txt", "local edit\n");
        let report = diff(&project, &op("op-C"), &DiffSide::Current, None).unwrap();
        assert!(report.diff.contains("+local edit"));
        assert!(report.to.starts_with("current/"));
    }

    #[test]
    fn both_current_is_rejected() {
        let fx = three_writes();
        assert!(matches!(
            diff(&fx.open(), &DiffSide::Current, &DiffSide::Current, None),
            Err(RetraceError::NothingToCompare)
        ));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let fx = three_writes();
        assert!(matches!(
            diff(&fx.open(), &op("nope-nope"), &op("op-A"), None),
            Err(RetraceError::NotFound { .. })
        ));
    }

    #[test]
    fn unified_output_has_headers() {
        let text = unified(b"a\nb\n", b"a\nc\n", "old", "new");
        assert!(text.contains("--- old"));
        assert!(text.contains("+++ new"));
        assert!(text.contains("-b"));
        assert!(text.contains("+c"));
    }

    #[test]
    fn failed_snapshot_side_is_unavailable_not_an_older_state() {
        let fx = three_writes();
        fx.conflicting_snapshot("op-B-0002", "foo.txt");
        let project = fx.open();
        let err = diff(&project, &op("op-A"), &op("op-B"), None).unwrap_err();
        assert!(matches!(err, RetraceError::SnapshotUnavailable { .. }));
        assert!(diff(&project, &op("op-A"), &op("op-C"), None).is_ok());
    }
}
