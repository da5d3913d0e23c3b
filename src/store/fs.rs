//! On-disk snapshot store.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use super::{SnapshotStore, StoreError, StoreRef};
use crate::model::types::{ContentHash, FileSnapshot, OperationId};

const OBJECTS_DIR: &str = "objects";
const INDEX_FILE: &str = "snapshots.jsonl";
const TIMELINE_FILE: &str = "timeline.json";
const HEAD_FILE: &str = "HEAD";

type Key = (OperationId, PathBuf);

/// Filesystem-backed [`SnapshotStore`].
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    snapshots: RwLock<HashMap<Key, FileSnapshot>>,
    index: Mutex<File>,
}

impl FsStore {
    /// Open (creating if needed) the store rooted at `root`.
    ///
    /// Loads `snapshots.jsonl` into memory. Unparseable index lines (a torn
    /// final append, typically) are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the directory or index cannot be created or read.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let objects = root.join(OBJECTS_DIR);
        fs::create_dir_all(&objects).map_err(|e| StoreError::io(&objects, e))?;

        let index_path = root.join(INDEX_FILE);
        let mut existing = Vec::new();
        match File::open(&index_path) {
            Ok(mut f) => {
                f.read_to_end(&mut existing)
                    .map_err(|e| StoreError::io(&index_path, e))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&index_path, e)),
        }

        let mut snapshots = HashMap::new();
        for (number, line) in existing.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<FileSnapshot>(line) {
                Ok(snapshot) => {
                    snapshots
                        .entry((snapshot.op.clone(), snapshot.path.clone()))
                        .or_insert(snapshot);
                }
                Err(e) => warn!(
                    line = number + 1,
                    error = %e,
                    "skipping unreadable snapshot index line"
                ),
            }
        }

        let mut index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .map_err(|e| StoreError::io(&index_path, e))?;
        if existing.last().is_some_and(|b| *b != b'\n') {
            // Terminate a torn line so the next append starts clean.
            index
                .write_all(b"\n")
                .map_err(|e| StoreError::io(&index_path, e))?;
        }

        debug!(snapshots = snapshots.len(), "snapshot index loaded");
        Ok(Self {
            root: root.to_path_buf(),
            snapshots: RwLock::new(snapshots),
            index: Mutex::new(index),
        })
    }

    /// The store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the persisted timeline.
    #[must_use]
    pub fn timeline_path(&self) -> PathBuf {
        self.root.join(TIMELINE_FILE)
    }

    /// Number of indexed snapshots.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().len()
    }

    /// Number of distinct blobs on disk.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects().count()
    }

    /// Total bytes held by blobs and the index.
    #[must_use]
    pub fn disk_usage(&self) -> u64 {
        let blobs: u64 = self
            .objects()
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum();
        let index = fs::metadata(self.root.join(INDEX_FILE)).map_or(0, |m| m.len());
        blobs + index
    }

    fn objects(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        walkdir::WalkDir::new(self.root.join(OBJECTS_DIR))
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
    }

    // -----------------------------------------------------------------------
    // View head
    // -----------------------------------------------------------------------

    /// The operation id stored in `HEAD`, if a view pointer is set.
    ///
    /// # Errors
    /// Returns an error if `HEAD` exists but cannot be read.
    pub fn read_head(&self) -> Result<Option<OperationId>, StoreError> {
        let path = self.root.join(HEAD_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(OperationId::new(text.trim()).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Point the view at `op`.
    ///
    /// # Errors
    /// Returns an error if `HEAD` cannot be written.
    pub fn write_head(&self, op: &OperationId) -> Result<(), StoreError> {
        write_atomic(&self.root.join(HEAD_FILE), format!("{op}\n").as_bytes())
    }

    /// Remove the view pointer; the view follows the latest entry again.
    ///
    /// # Errors
    /// Returns an error if `HEAD` exists and cannot be removed.
    pub fn clear_head(&self) -> Result<(), StoreError> {
        let path = self.root.join(HEAD_FILE);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        let (dir, file) = hash.as_str().split_at(2);
        self.root.join(OBJECTS_DIR).join(dir).join(file)
    }

    fn existing(
        &self,
        op: &OperationId,
        path: &Path,
        hash: &ContentHash,
        deleted: bool,
    ) -> Result<Option<StoreRef>, StoreError> {
        let snapshots = self.snapshots.read();
        let Some(found) = snapshots.get(&(op.clone(), path.to_path_buf())) else {
            return Ok(None);
        };
        if found.hash == *hash && found.deleted == deleted {
            return Ok(Some(found.clone()));
        }
        Err(StoreError::SnapshotConflict {
            op: op.clone(),
            path: path.to_path_buf(),
            existing: found.hash.clone(),
            offered: hash.clone(),
        })
    }

    fn write_blob(&self, hash: &ContentHash, content: &[u8]) -> Result<(), StoreError> {
        let target = self.blob_path(hash);
        if target.is_file() {
            return Ok(());
        }
        let dir = target
            .parent()
            .map_or_else(|| self.root.join(OBJECTS_DIR), Path::to_path_buf);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        write_atomic(&target, content)
    }

    fn record(
        &self,
        op: &OperationId,
        path: &Path,
        content: &[u8],
        deleted: bool,
    ) -> Result<StoreRef, StoreError> {
        let hash = ContentHash::of(content);
        if let Some(found) = self.existing(op, path, &hash, deleted)? {
            debug!(op = %op, path = %path.display(), "snapshot already stored");
            return Ok(found);
        }

        if !deleted {
            self.write_blob(&hash, content)?;
        }

        let snapshot = FileSnapshot {
            op: op.clone(),
            path: path.to_path_buf(),
            hash: hash.clone(),
            deleted,
            size: content.len() as u64,
        };
        let index_path = self.root.join(INDEX_FILE);
        let mut line = serde_json::to_vec(&snapshot).map_err(|source| StoreError::Serialize {
            path: index_path.clone(),
            source,
        })?;
        line.push(b'\n');

        let mut index = self.index.lock();
        // A concurrent writer may have landed the same key meanwhile.
        if let Some(found) = self.existing(op, path, &hash, deleted)? {
            return Ok(found);
        }
        index
            .write_all(&line)
            .and_then(|()| index.sync_data())
            .map_err(|e| StoreError::io(&index_path, e))?;
        self.snapshots
            .write()
            .insert((op.clone(), path.to_path_buf()), snapshot.clone());
        drop(index);

        debug!(op = %op, path = %path.display(), hash = %hash, deleted, "snapshot stored");
        Ok(snapshot)
    }
}

impl SnapshotStore for FsStore {
    #[instrument(name = "store.put", skip(self, content), fields(op = %op, path = %path.display()))]
    fn put(&self, op: &OperationId, path: &Path, content: &[u8]) -> Result<StoreRef, StoreError> {
        self.record(op, path, content, false)
    }

    #[instrument(name = "store.put", skip(self), fields(op = %op, path = %path.display()))]
    fn put_tombstone(&self, op: &OperationId, path: &Path) -> Result<StoreRef, StoreError> {
        self.record(op, path, &[], true)
    }

    fn lookup(&self, op: &OperationId, path: &Path) -> Option<StoreRef> {
        self.snapshots
            .read()
            .get(&(op.clone(), path.to_path_buf()))
            .cloned()
    }

    fn get(&self, op: &OperationId, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(snapshot) = self.lookup(op, path) else {
            return Ok(None);
        };
        if snapshot.deleted {
            return Ok(Some(Vec::new()));
        }
        let blob = self.blob_path(&snapshot.hash);
        let bytes = fs::read(&blob).map_err(|e| StoreError::CorruptBlob {
            hash: snapshot.hash.clone(),
            detail: e.to_string(),
        })?;
        if ContentHash::of(&bytes) != snapshot.hash {
            return Err(StoreError::CorruptBlob {
                hash: snapshot.hash,
                detail: "content does not match its address".to_owned(),
            });
        }
        Ok(Some(bytes))
    }
}

// ---------------------------------------------------------------------------
// Atomic file writes
// ---------------------------------------------------------------------------

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// fsync, rename over the target, fsync the directory.
///
/// # Errors
/// Returns an error if any step fails; the target is then left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;

    // Make the rename durable.
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
