//! File system operations
//!
//! Scoped open-for-read and create-for-write below the server root. Files are
//! closed when the returned handle is dropped, on every exit path.

use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs::File;

use crate::error::StorageError;
use crate::storage::validation::resolve_under_root;

/// Local directory backing the server's files.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens an existing file for a `RETR`.
    pub async fn open_read(&self, path: &str) -> Result<File, StorageError> {
        let real = resolve_under_root(&self.root, path)?;
        debug!("Opening {} for reading", real.display());
        File::open(&real).await.map_err(|source| StorageError::Open {
            path: path.to_string(),
            source,
        })
    }

    /// Creates (or truncates) a file for a `STOR`.
    pub async fn create_write(&self, path: &str) -> Result<File, StorageError> {
        let real = resolve_under_root(&self.root, path)?;
        debug!("Creating {} for writing", real.display());
        File::create(&real).await.map_err(|source| StorageError::Open {
            path: path.to_string(),
            source,
        })
    }
}
