//! Cross-process advisory file locks
//!
//! Several independent processes may share one cache directory, so mutual
//! exclusion uses OS-level `flock`-style locks (via `fs2`) on lock files
//! that sit next to the protected entry. Each acquisition opens its own file
//! handle, which makes two threads of one process serialize the same way two
//! processes do.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::cache::error::CacheError;

/// An exclusive lock keyed by a lock-file path
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held
    ///
    /// The lock file is created on first use and kept afterwards; it is only
    /// removed together with the entry it protects. If that happens while we
    /// wait, the lock we obtain is on an unlinked inode, so we retry on the
    /// fresh file.
    pub fn acquire(&self) -> Result<FileLockGuard, CacheError> {
        loop {
            let file = self.open()?;
            file.lock_exclusive().map_err(|source| CacheError::Lock {
                path: self.path.clone(),
                source,
            })?;

            if is_current(&self.path, &file) {
                tracing::trace!(path = %self.path.display(), "Acquired file lock");
                return Ok(FileLockGuard {
                    file,
                    path: self.path.clone(),
                });
            }

            tracing::debug!(path = %self.path.display(), "Lock file replaced while waiting, retrying");
            let _ = FileExt::unlock(&file);
        }
    }

    /// Take the lock if nobody holds it, without blocking
    pub fn try_acquire(&self) -> Result<Option<FileLockGuard>, CacheError> {
        let file = self.open()?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                if !is_current(&self.path, &file) {
                    let _ = FileExt::unlock(&file);
                    return Ok(None);
                }
                Ok(Some(FileLockGuard {
                    file,
                    path: self.path.clone(),
                }))
            }
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(source) => Err(CacheError::Lock {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn open(&self) -> Result<File, CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| CacheError::Lock {
                path: self.path.clone(),
                source,
            })
    }
}

/// Holds an acquired [`FileLock`]; the lock is released on drop
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    path: PathBuf,
}

impl FileLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            // Closing the handle releases the lock anyway
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release file lock");
        }
    }
}

#[cfg(unix)]
fn is_current(path: &Path, file: &File) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (std::fs::metadata(path), file.metadata()) {
        (Ok(on_disk), Ok(held)) => on_disk.ino() == held.ino() && on_disk.dev() == held.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_current(path: &Path, _file: &File) -> bool {
    path.exists()
}
