//! Single-writer lock on a state store
//!
//! Every store commit replaces the whole snapshot, so two processes writing
//! the same store would overwrite each other's seen ids. A process that runs
//! triggers holds an exclusive lock on `<state path>.lock` for as long as it
//! lives; the lock is released when the file handle is dropped, including on
//! a crash.

use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::StorageError;

/// Exclusive writer lock, held until dropped
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
    _file: File,
}

impl WriterLock {
    /// Lock file used for the store at `state_path`
    pub fn lock_path(state_path: &Path) -> PathBuf {
        let mut name = state_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        name.push(".lock");
        state_path.with_file_name(name)
    }

    /// Take the lock without waiting
    ///
    /// Fails with [`StorageError::Locked`] when another process holds it.
    pub fn acquire(state_path: &Path) -> Result<Self, StorageError> {
        let path = Self::lock_path(state_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Writer lock acquired");
                Ok(Self { path, _file: file })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(StorageError::Locked { path }),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
