//! Lexical path normalisation.
//!
//! Recorded paths may be absolute or relative to the project root, and may
//! contain `.` or `..` components. Everything the index keys on goes through
//! [`normalize`] so that `src/./a.rs`, `/proj/src/a.rs` and `src/a.rs` name the
//! same file. No filesystem access: the file may no longer exist.

use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `root` and collapse `.`/`..` components.
#[must_use]
pub fn normalize(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render `path` relative to `root` when it lies inside it.
#[must_use]
pub fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map_or_else(|_| path.display().to_string(), |rel| rel.display().to_string())
}
