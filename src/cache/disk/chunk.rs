//! Chunked storage of object byte ranges
//!
//! A byte offset `o` of an object belongs to chunk `o / cache_line_size`.
//! Every chunk is an independent file stamped with the source version it
//! was fetched against and the cache line size in effect when written, so a
//! configuration change invalidates old chunks instead of misaligning them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fs::{File, FileTimes};
use std::io::{self, Read};
use std::ops::{Range, RangeInclusive};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::attributes::{read_attributes, remove_sidecar, EntryAttributes};
use super::paths::{parse_chunk_file_name, EntryPath};
use super::staging::StagedFile;
use crate::cache::error::CacheError;

/// Half-open byte range `[offset, offset + size)` of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub size: u64,
}

impl ByteRange {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Exclusive end offset
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Clamp the range to an object of `object_size` bytes
    pub fn clamp_to(&self, object_size: u64) -> ByteRange {
        let offset = self.offset.min(object_size);
        ByteRange::new(offset, self.end().min(object_size) - offset)
    }
}

/// Indices of the chunks touched by `range`: `offset / L ..= (end - 1) / L`
///
/// `None` for an empty range.
pub fn chunk_span(range: ByteRange, cache_line_size: u64) -> Option<RangeInclusive<u64>> {
    if range.is_empty() || cache_line_size == 0 {
        return None;
    }
    Some(range.offset / cache_line_size..=(range.end() - 1) / cache_line_size)
}

/// Part of chunk `index` that lies inside `range`, relative to the chunk start
pub fn chunk_slice(range: ByteRange, index: u64, cache_line_size: u64) -> Range<usize> {
    let chunk_start = index * cache_line_size;
    let chunk_end = chunk_start.saturating_add(cache_line_size);
    let start = range.offset.clamp(chunk_start, chunk_end) - chunk_start;
    let end = range.end().clamp(chunk_start, chunk_end) - chunk_start;
    start as usize..end as usize
}

/// Whether stored attributes satisfy the caller's version requirement
///
/// With checking enabled an entry is only valid when both sides carry the
/// same version tag.
pub(crate) fn version_matches(stored: Option<&str>, expected: Option<&str>, check: bool) -> bool {
    if !check {
        return true;
    }
    matches!((stored, expected), (Some(stored), Some(expected)) if stored == expected)
}

/// Open a cache file and read its attributes from the same descriptor
///
/// `Ok(None)` when the file is absent or does not satisfy the version check.
pub(crate) fn open_validated(
    path: &Path,
    expected: Option<&str>,
    check: bool,
) -> Result<Option<(File, EntryAttributes)>, CacheError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !file.metadata()?.is_file() {
        return Ok(None);
    }
    let attrs = read_attributes(&file, path)?;
    if !version_matches(attrs.etag.as_deref(), expected, check) {
        tracing::debug!(
            path = %path.display(),
            stored = ?attrs.etag,
            expected = ?expected,
            "Cached version does not match source version"
        );
        return Ok(None);
    }
    Ok(Some((file, attrs)))
}

/// Record an access for LRU/MRU ordering; modification time is untouched
pub(crate) fn touch_accessed(file: &File, path: &Path) {
    if let Err(e) = file.set_times(FileTimes::new().set_accessed(SystemTime::now())) {
        tracing::debug!(path = %path.display(), error = %e, "Failed to update access time");
    }
}

/// Reads and writes the chunk files of cached objects
#[derive(Debug, Clone)]
pub struct ChunkStore {
    cache_line_size: u64,
    temp_dir: PathBuf,
}

impl ChunkStore {
    pub fn new(cache_line_size: u64, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_line_size,
            temp_dir: temp_dir.into(),
        }
    }

    pub fn cache_line_size(&self) -> u64 {
        self.cache_line_size
    }

    /// Atomically write chunk `index` of `entry`, replacing any previous one
    pub fn write_chunk(
        &self,
        entry: &EntryPath,
        index: u64,
        data: &[u8],
        source_version: Option<&str>,
    ) -> Result<(), CacheError> {
        if data.len() as u64 > self.cache_line_size {
            return Err(CacheError::ChunkTooLarge {
                len: data.len() as u64,
                limit: self.cache_line_size,
            });
        }
        let attrs = EntryAttributes::new(source_version, Some(self.cache_line_size));
        StagedFile::with_contents(&self.temp_dir, data)?.commit(&entry.chunk_path(index), &attrs)?;
        tracing::trace!(key = entry.key(), chunk = index, bytes = data.len(), "Stored chunk");
        Ok(())
    }

    /// Payload of chunk `index`, or `None` on a miss
    pub fn read_chunk(
        &self,
        entry: &EntryPath,
        index: u64,
        expected_version: Option<&str>,
        check_version: bool,
    ) -> Result<Option<Bytes>, CacheError> {
        let path = entry.chunk_path(index);
        let Some((mut file, attrs)) = open_validated(&path, expected_version, check_version)? else {
            return Ok(None);
        };
        if !self.layout_matches(&attrs, file.metadata()?.len(), &path) {
            return Ok(None);
        }

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        // Length may have changed if the file was replaced between metadata and read
        if data.len() as u64 > self.cache_line_size {
            return Ok(None);
        }
        touch_accessed(&file, &path);
        Ok(Some(Bytes::from(data)))
    }

    /// Validity check without reading the payload
    pub fn chunk_exists(
        &self,
        entry: &EntryPath,
        index: u64,
        expected_version: Option<&str>,
        check_version: bool,
    ) -> Result<bool, CacheError> {
        let path = entry.chunk_path(index);
        match open_validated(&path, expected_version, check_version)? {
            Some((file, attrs)) => Ok(self.layout_matches(&attrs, file.metadata()?.len(), &path)),
            None => Ok(false),
        }
    }

    /// Indices of all chunk files present for `entry`, sorted
    pub fn chunk_indices(&self, entry: &EntryPath) -> Result<Vec<u64>, CacheError> {
        let dir = match std::fs::read_dir(entry.dir()) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut indices = Vec::new();
        for dirent in dir {
            let dirent = match dirent {
                Ok(d) => d,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let name = dirent.file_name();
            if let Some((basename, index)) = name.to_str().and_then(parse_chunk_file_name) {
                if basename == entry.basename() {
                    indices.push(index);
                }
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Remove every chunk of `entry` with its sidecar and lock file
    ///
    /// Returns the number of chunk files removed.
    pub fn delete_chunks(&self, entry: &EntryPath) -> Result<usize, CacheError> {
        let mut removed = 0;
        for index in self.chunk_indices(entry)? {
            let chunk = entry.chunk_path(index);
            if remove_if_present(&chunk)? {
                removed += 1;
            }
            remove_sidecar(&chunk)?;
            remove_if_present(&entry.chunk_lock_path(index))?;
        }
        Ok(removed)
    }

    fn layout_matches(&self, attrs: &EntryAttributes, len: u64, path: &Path) -> bool {
        if let Some(recorded) = attrs.cache_line_size {
            if recorded != self.cache_line_size {
                tracing::debug!(
                    path = %path.display(),
                    recorded,
                    configured = self.cache_line_size,
                    "Chunk written with a different cache line size"
                );
                return false;
            }
        }
        if len > self.cache_line_size {
            tracing::warn!(path = %path.display(), len, "Chunk larger than cache line size");
            return false;
        }
        true
    }
}

/// `Ok(true)` if the file existed and was removed
pub(crate) fn remove_if_present(path: &Path) -> Result<bool, CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
