//! Snapshot store: content-addressed file states keyed by `(operation, path)`.
//!
//! The [`SnapshotStore`] trait is the only seam the pipeline and navigation
//! depend on. [`FsStore`] is the on-disk implementation:
//!
//! ```text
//! <store>/objects/<2 hex>/<62 hex>   blob, SHA-256 addressed
//! <store>/snapshots.jsonl            append-only (op, path) -> hash index
//! <store>/timeline.json              last materialised timeline
//! <store>/HEAD                       optional view pointer
//! ```
//!
//! Writes are append-only and idempotent. A blob is durable before the index
//! line naming it is appended, so a crash never leaves an index entry pointing
//! at missing content.

mod fs;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use fs::{FsStore, write_atomic};

use crate::model::types::{ContentHash, FileSnapshot, OperationId};

/// Reference returned by a successful `put`.
pub type StoreRef = FileSnapshot;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failures of the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(op, path)` key already holds different content.
    #[error(
        "snapshot for '{op}' at '{}' already exists with different content (stored {existing}, offered {offered})",
        path.display()
    )]
    SnapshotConflict {
        /// The operation.
        op: OperationId,
        /// The path.
        path: PathBuf,
        /// Hash already recorded.
        existing: ContentHash,
        /// Hash of the rejected content.
        offered: ContentHash,
    },

    /// A blob named by the index is missing or does not match its hash.
    #[error("blob {hash} is missing or corrupt: {detail}")]
    CorruptBlob {
        /// The content address.
        hash: ContentHash,
        /// What was wrong.
        detail: String,
    },

    /// Filesystem failure inside the store directory.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// The store file involved.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// An index or timeline file could not be (de)serialised.
    #[error("cannot encode or decode '{}': {source}", path.display())]
    Serialize {
        /// The store file involved.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Durable, content-addressed snapshot storage.
///
/// Implementations must be safe to call from several threads: writes to the
/// same key are serialised, reads never block on writes to other keys.
pub trait SnapshotStore: Send + Sync {
    /// Store `content` as the state of `path` after `op`.
    ///
    /// Re-putting identical content is a no-op returning the existing ref.
    ///
    /// # Errors
    /// [`StoreError::SnapshotConflict`] if the key holds different content,
    /// or an I/O error if the blob or index could not be written.
    fn put(&self, op: &OperationId, path: &Path, content: &[u8]) -> Result<StoreRef, StoreError>;

    /// Record that `path` did not exist after `op`.
    ///
    /// # Errors
    /// As for [`put`](Self::put).
    fn put_tombstone(&self, op: &OperationId, path: &Path) -> Result<StoreRef, StoreError>;

    /// The recorded snapshot for a key, without reading content.
    fn lookup(&self, op: &OperationId, path: &Path) -> Option<StoreRef>;

    /// Content recorded for a key. A tombstone yields empty content; use
    /// [`lookup`](Self::lookup) to tell it apart from an empty file.
    ///
    /// # Errors
    /// Returns an error if the blob cannot be read or fails verification.
    fn get(&self, op: &OperationId, path: &Path) -> Result<Option<Vec<u8>>, StoreError>;
}
