//! Path validation
//!
//! Maps client-supplied paths onto the server root and rejects traversal.

use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;

/// Resolves `path` below `root`. Absolute paths are re-rooted, `.` is ignored
/// and any `..` component is rejected.
pub fn resolve_under_root(root: &Path, path: &str) -> Result<PathBuf, StorageError> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return Err(StorageError::PathTraversal(path.to_string())),
        }
    }
    if depth == 0 {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(resolved)
}
