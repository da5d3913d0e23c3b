//! Error types for retrace.
//!
//! [`RetraceError`] covers every failure surfaced to a caller of the
//! navigation engine. Messages are agent-friendly: each names the offending
//! identifier or path and ends with guidance on what to do next.
//!
//! Partial pipeline failures (undecodable lines, unreadable shards, failed
//! snapshot writes) are not errors; they are collected as
//! [`PipelineWarning`](crate::pipeline::PipelineWarning)s.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::types::OperationId;
use crate::store::StoreError;

/// Unified error type for timeline navigation.
#[derive(Debug, Error)]
pub enum RetraceError {
    /// No operation matches the identifier.
    #[error(
        "no operation matches '{id}'.\n  To fix: list recorded operations:\n    retrace log"
    )]
    NotFound {
        /// The identifier or prefix as supplied.
        id: String,
    },

    /// A prefix matches several operations.
    #[error(
        "operation prefix '{prefix}' is ambiguous; it matches {} operations:\n{}\n  To fix: supply more characters of the id.",
        candidates.len(),
        format_candidates(candidates)
    )]
    AmbiguousIdentifier {
        /// The supplied prefix.
        prefix: String,
        /// Every full id starting with `prefix`, sorted.
        candidates: Vec<OperationId>,
    },

    /// A prefix is shorter than the configured minimum.
    #[error(
        "operation prefix '{prefix}' is too short (minimum {min} characters).\n  To fix: supply at least {min} characters of the id."
    )]
    PrefixTooShort {
        /// The supplied prefix.
        prefix: String,
        /// The configured minimum length.
        min: usize,
    },

    /// The operation exists but recorded no snapshot for the path.
    #[error(
        "operation '{op}' has no snapshot for '{}'.\n  To fix: list operations for that file:\n    retrace log --path {}",
        path.display(),
        path.display()
    )]
    NoSnapshot {
        /// The resolved operation.
        op: OperationId,
        /// The requested path.
        path: PathBuf,
    },

    /// The operation determined the file's state but its snapshot failed to
    /// store.
    #[error(
        "operation '{op}' changed '{}' but its snapshot is unavailable (the store write failed during the scan).\n  To fix: pick another operation for that file:\n    retrace log --path {}",
        path.display(),
        path.display()
    )]
    SnapshotUnavailable {
        /// The operation whose snapshot is missing.
        op: OperationId,
        /// The affected path.
        path: PathBuf,
    },

    /// `undo N` reaches past the start of tracked history.
    #[error(
        "cannot undo {requested} operation(s): only {available} step(s) of history are tracked.\n  To fix: use a smaller count, or inspect history with `retrace log`."
    )]
    HistoryExhausted {
        /// The requested step count.
        requested: usize,
        /// The largest step count that would succeed.
        available: usize,
    },

    /// Both sides of a diff named the live working file.
    #[error("diff needs at least one recorded operation; both sides were 'current'.")]
    NothingToCompare,

    /// A `--path` filter is not a valid glob.
    #[error("invalid path pattern '{pattern}': {detail}\n  To fix: use a glob such as 'src/**/*.rs'.")]
    InvalidPattern {
        /// The pattern as supplied.
        pattern: String,
        /// The parser's complaint.
        detail: String,
    },

    /// The snapshot store failed.
    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),

    /// A configuration file could not be loaded or parsed.
    #[error(
        "configuration error in '{}': {detail}\n  To fix: edit the config file and correct the issue.",
        path.display()
    )]
    Config {
        /// Path to the configuration file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// The run was cancelled between shards; nothing was indexed.
    #[error("pipeline run cancelled; no partial state was indexed")]
    Cancelled,

    /// An I/O error on a working file.
    #[error("I/O error on '{}': {source}\n  To fix: check file permissions and disk space.", path.display())]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

impl RetraceError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_candidates(candidates: &[OperationId]) -> String {
    candidates
        .iter()
        .map(|c| format!("    {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
