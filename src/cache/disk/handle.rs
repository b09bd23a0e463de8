//! File handles returned by `CacheManager::open`

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::attributes::EntryAttributes;
use super::staging::StagedFile;
use crate::cache::error::CacheError;

/// How a cache entry is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Stream an existing entry
    Read,
    /// Write a new version of an entry; visible only after `commit`
    Write,
}

/// A cached entry opened for streaming
///
/// Writers are staged in the temp directory. Dropping a writer without
/// [`CachedFile::commit`] discards what was written.
#[derive(Debug)]
pub struct CachedFile {
    inner: Handle,
}

#[derive(Debug)]
enum Handle {
    Reader { file: File, path: PathBuf },
    Writer { staged: StagedFile, target: PathBuf },
}

impl CachedFile {
    pub(crate) fn reader(file: File, path: PathBuf) -> Self {
        Self {
            inner: Handle::Reader { file, path },
        }
    }

    pub(crate) fn writer(staged: StagedFile, target: PathBuf) -> Self {
        Self {
            inner: Handle::Writer { staged, target },
        }
    }

    pub fn mode(&self) -> OpenMode {
        match self.inner {
            Handle::Reader { .. } => OpenMode::Read,
            Handle::Writer { .. } => OpenMode::Write,
        }
    }

    /// Path of the underlying file (the staging path for writers)
    pub fn path(&self) -> &Path {
        match &self.inner {
            Handle::Reader { path, .. } => path,
            Handle::Writer { staged, .. } => staged.path(),
        }
    }

    /// Where a writer's data ends up after commit
    pub fn target_path(&self) -> &Path {
        match &self.inner {
            Handle::Reader { path, .. } => path,
            Handle::Writer { target, .. } => target,
        }
    }

    /// Publish a writer's data as the cached entry, stamped with `source_version`
    pub fn commit(self, source_version: Option<&str>) -> Result<(), CacheError> {
        match self.inner {
            Handle::Reader { .. } => Err(CacheError::InvalidMode("commit requires a writer")),
            Handle::Writer { staged, target } => {
                staged.commit(&target, &EntryAttributes::new(source_version, None))
            }
        }
    }

    fn file_mut(&mut self) -> &mut File {
        match &mut self.inner {
            Handle::Reader { file, .. } => file,
            Handle::Writer { staged, .. } => staged.file_mut(),
        }
    }
}

impl Read for CachedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut().read(buf)
    }
}

impl Write for CachedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            Handle::Reader { .. } => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cache entry opened for reading",
            )),
            Handle::Writer { staged, .. } => staged.file_mut().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut().flush()
    }
}

impl Seek for CachedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut().seek(pos)
    }
}
