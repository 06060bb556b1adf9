//! Storage backends for wordforest persistence.
//!
//! Persistence modules never touch paths directly; they go through the
//! [`Directory`] abstraction. Both backends delegate to the canonical
//! implementations in `durability::storage` and adapt error types, so atomic
//! replace (temp file, fsync, rename, parent fsync) lives in one place.

use crate::persistence::error::{PersistenceError, PersistenceResult};
use durability::storage::Directory as DurabilityDirectory;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Filesystem-like directory abstraction for index artifacts.
///
/// Paths are relative to the directory root.
pub trait Directory: Send + Sync {
    /// Read a whole file.
    fn read(&self, path: &str) -> PersistenceResult<Vec<u8>>;
    /// Write `data` to `path` so readers observe either the old or the new
    /// content, never a torn write.
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()>;
    fn exists(&self, path: &str) -> bool;
    /// Remove `path`; a missing file is not an error.
    fn delete(&self, path: &str) -> PersistenceResult<()>;
    /// Absolute location of `path`, if the backend has one.
    fn file_path(&self, path: &str) -> Option<PathBuf>;
}

fn read_all(inner: &dyn DurabilityDirectory, path: &str) -> PersistenceResult<Vec<u8>> {
    if !inner.exists(path) {
        return Err(PersistenceError::NotFound(path.to_string()));
    }
    let mut reader = inner.open_file(path).map_err(PersistenceError::from)?;
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn delete_if_present(inner: &dyn DurabilityDirectory, path: &str) -> PersistenceResult<()> {
    if !inner.exists(path) {
        return Ok(());
    }
    inner.delete(path).map_err(PersistenceError::from)
}

// -----------------------------------------------------------------------------
// Memory
// -----------------------------------------------------------------------------

/// In-memory directory. Clones share the same files.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: durability::storage::MemoryDirectory,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            inner: durability::storage::MemoryDirectory::new(),
        }
    }
}

impl Directory for MemoryDirectory {
    fn read(&self, path: &str) -> PersistenceResult<Vec<u8>> {
        read_all(&self.inner, path)
    }
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        self.inner
            .atomic_write(path, data)
            .map_err(PersistenceError::from)
    }
    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }
    fn delete(&self, path: &str) -> PersistenceResult<()> {
        delete_if_present(&self.inner, path)
    }
    fn file_path(&self, path: &str) -> Option<PathBuf> {
        self.inner.file_path(path)
    }
}

// -----------------------------------------------------------------------------
// Filesystem
// -----------------------------------------------------------------------------

/// Directory backed by a filesystem path.
pub struct FsDirectory {
    root: PathBuf,
    inner: durability::storage::FsDirectory,
}

impl FsDirectory {
    /// Open (and create if needed) a directory rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let inner = durability::storage::FsDirectory::new(root.clone())
            .map_err(PersistenceError::from)?;
        Ok(Self { root, inner })
    }

    /// Open an existing directory without creating it.
    pub fn open(root: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(PersistenceError::NotFound(root.display().to_string()));
        }
        let inner = durability::storage::FsDirectory::new(root.clone())
            .map_err(PersistenceError::from)?;
        Ok(Self { root, inner })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Directory for FsDirectory {
    fn read(&self, path: &str) -> PersistenceResult<Vec<u8>> {
        read_all(&self.inner, path)
    }
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        self.inner
            .atomic_write(path, data)
            .map_err(PersistenceError::from)
    }
    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }
    fn delete(&self, path: &str) -> PersistenceResult<()> {
        delete_if_present(&self.inner, path)
    }
    fn file_path(&self, path: &str) -> Option<PathBuf> {
        self.inner.file_path(path)
    }
}
