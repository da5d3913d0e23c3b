//! `log`: timeline entries, newest first, with optional filters.

use glob::Pattern;

use super::EntryView;
use crate::error::RetraceError;
use crate::model::path::display_relative;
use crate::project::Project;

/// Filters for [`log`].
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    /// Glob matched against the project-relative path (or the absolute path
    /// for files outside the project).
    pub path: Option<String>,
    /// Only entries from this producer.
    pub producer: Option<String>,
    /// Maximum entries; `None` uses `navigation.default_log_limit` (unlimited
    /// unless configured), `Some(0)` means unlimited.
    pub limit: Option<usize>,
}

/// Entries in reverse chronological order. No match is an empty list.
///
/// # Errors
/// Returns [`RetraceError::InvalidPattern`] for a malformed glob.
pub fn log(project: &Project, query: &LogQuery) -> Result<Vec<EntryView>, RetraceError> {
    let index = project.index();
    let pattern = query
        .path
        .as_deref()
        .map(|p| {
            Pattern::new(p).map_err(|e| RetraceError::InvalidPattern {
                pattern: p.to_owned(),
                detail: e.to_string(),
            })
        })
        .transpose()?;

    let limit = match query.limit.unwrap_or(project.config().navigation.default_log_limit) {
        0 => usize::MAX,
        n => n,
    };

    Ok(index
        .entries()
        .iter()
        .rev()
        .filter(|entry| {
            query
                .producer
                .as_deref()
                .is_none_or(|p| entry.producer.as_str() == p)
        })
        .filter(|entry| {
            pattern.as_ref().is_none_or(|pattern| {
                index.path_of(entry.seq).is_some_and(|abs| {
                    pattern.matches(&display_relative(index.root(), abs))
                        || pattern.matches_path(abs)
                })
            })
        })
        .take(limit)
        .map(|entry| EntryView::new(index, entry))
        .collect())
}
