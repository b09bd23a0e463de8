//! Cache-aware storage client
//!
//! Reads go to the disk cache first. With source version checking the
//! backend is asked for the current version (one metadata request) and only
//! an entry stamped with that version is served; without it a warm entry is
//! served with no remote request at all. Misses are fetched under the
//! entry's file lock, re-checking the cache once the lock is held so
//! concurrent readers of the same object fetch it only once.

use bytes::Bytes;

use super::backend::{ByteRange, ObjectMetadata, StorageBackend};
use super::error::StorageError;
use crate::cache::disk::{chunk_slice, chunk_span};
use crate::cache::{CacheConfig, CacheError, CacheManager, FileLockGuard, SourceVersionCheckMode};

/// Storage operations for one profile, optionally backed by a disk cache
#[derive(Debug)]
pub struct CachedStorage<B> {
    backend: B,
    cache: Option<CacheManager>,
}

impl<B: StorageBackend> CachedStorage<B> {
    pub fn new(backend: B, cache: Option<CacheManager>) -> Self {
        Self { backend, cache }
    }

    /// Build the client for `profile`, setting up its cache if configured
    ///
    /// Invalid cache configuration is an error. A cache that cannot be set
    /// up for other reasons (e.g. an unwritable location) is logged and the
    /// client runs uncached.
    pub fn with_cache_config(
        backend: B,
        profile: &str,
        cache_config: Option<&CacheConfig>,
    ) -> Result<Self, StorageError> {
        let cache = match cache_config {
            None => None,
            Some(config) => match CacheManager::new(profile, config.clone()) {
                Ok(manager) => Some(manager),
                Err(e @ CacheError::Config(_)) => return Err(e.into()),
                Err(e) => {
                    tracing::error!(profile, error = %e, "Disk cache unavailable, continuing without cache");
                    None
                }
            },
        };
        Ok(Self::new(backend, cache))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_ref()
    }

    /// Object metadata straight from the backend
    pub fn info(&self, path: &str) -> Result<ObjectMetadata, StorageError> {
        self.backend.get_object_metadata(path)
    }

    /// Whole object contents
    pub fn read(&self, path: &str, mode: SourceVersionCheckMode) -> Result<Bytes, StorageError> {
        let Some(cache) = &self.cache else {
            return self.backend.get_object(path, None);
        };

        if !mode.resolve(cache.check_source_version()) {
            if let Some(data) = cache.read_with_mode(path, None, SourceVersionCheckMode::Disable) {
                return Ok(data);
            }
            return self.fetch_object(cache, path, None, SourceVersionCheckMode::Disable);
        }

        let version = self.backend.get_object_metadata(path)?.source_version();
        if let Some(data) = cache.read_with_mode(path, Some(&version), SourceVersionCheckMode::Enable) {
            return Ok(data);
        }
        self.fetch_object(cache, path, Some(&version), SourceVersionCheckMode::Enable)
    }

    /// Bytes `range` of an object, cached chunk by chunk
    ///
    /// The range is cut at the end of the object.
    pub fn read_range(
        &self,
        path: &str,
        range: ByteRange,
        mode: SourceVersionCheckMode,
    ) -> Result<Bytes, StorageError> {
        let Some(cache) = &self.cache else {
            return self.backend.get_object(path, Some(range));
        };
        if range.is_empty() {
            return Ok(Bytes::new());
        }

        let check = mode.resolve(cache.check_source_version());
        if !check {
            if let Some(data) = cache.read_range(path, range, None, SourceVersionCheckMode::Disable) {
                return Ok(data);
            }
        }
        let mode = if check {
            SourceVersionCheckMode::Enable
        } else {
            SourceVersionCheckMode::Disable
        };

        let metadata = self.backend.get_object_metadata(path)?;
        let version = metadata.source_version();
        let range = range.clamp_to(metadata.size);
        let line = cache.cache_line_size();
        let Some(span) = chunk_span(range, line) else {
            return Ok(Bytes::new());
        };
        if check {
            if let Some(data) = cache.read_range(path, range, Some(&version), mode) {
                return Ok(data);
            }
        }

        let mut assembled = Vec::with_capacity(range.size as usize);
        for index in span {
            let chunk = self.fetch_chunk(cache, path, index, &metadata, &version, mode)?;
            let wanted = chunk_slice(range, index, line);
            let end = wanted.end.min(chunk.len());
            let start = wanted.start.min(end);
            assembled.extend_from_slice(&chunk[start..end]);
        }
        Ok(Bytes::from(assembled))
    }

    /// Upload and drop any cached copy
    pub fn write(&self, path: &str, data: &[u8]) -> Result<ObjectMetadata, StorageError> {
        let metadata = self.backend.put_object(path, data)?;
        self.invalidate(path);
        Ok(metadata)
    }

    /// Remove the remote object and its cache entry
    pub fn delete(&self, path: &str) -> Result<(), StorageError> {
        let result = self.backend.delete_object(path);
        self.invalidate(path);
        result
    }

    fn invalidate(&self, path: &str) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.delete(path) {
                tracing::warn!(path, error = %e, "Failed to invalidate cache entry");
            }
        }
    }

    fn fetch_object(
        &self,
        cache: &CacheManager,
        path: &str,
        version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> Result<Bytes, StorageError> {
        let guard = lock_or_bypass(cache.acquire_lock(path), path);
        if guard.is_some() {
            if let Some(data) = cache.read_with_mode(path, version, mode) {
                return Ok(data);
            }
        }

        // Unversioned reads still stamp what they store
        let version = match version {
            Some(v) => v.to_string(),
            None => self.backend.get_object_metadata(path)?.source_version(),
        };
        let data = self.backend.get_object(path, None)?;
        if guard.is_some() {
            if let Err(e) = cache.set(path, &data, Some(&version)) {
                tracing::warn!(path, error = %e, "Failed to populate cache");
            }
        }
        Ok(data)
    }

    fn fetch_chunk(
        &self,
        cache: &CacheManager,
        path: &str,
        index: u64,
        metadata: &ObjectMetadata,
        version: &str,
        mode: SourceVersionCheckMode,
    ) -> Result<Bytes, StorageError> {
        if let Some(data) = cache.read_chunk(path, index, Some(version), mode) {
            return Ok(data);
        }
        let guard = lock_or_bypass(cache.acquire_chunk_lock(path, index), path);
        if guard.is_some() {
            if let Some(data) = cache.read_chunk(path, index, Some(version), mode) {
                return Ok(data);
            }
        }

        let line = cache.cache_line_size();
        let offset = index * line;
        let len = line.min(metadata.size.saturating_sub(offset));
        let data = self.backend.get_object(path, Some(ByteRange::new(offset, len)))?;
        if guard.is_some() {
            if let Err(e) = cache.set_chunk(path, index, &data, Some(version)) {
                tracing::warn!(path, chunk = index, error = %e, "Failed to populate cache chunk");
            }
        }
        Ok(data)
    }
}

/// A lock failure means fetching without populating the cache
fn lock_or_bypass(
    result: Result<FileLockGuard, CacheError>,
    path: &str,
) -> Option<FileLockGuard> {
    match result {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!(path, error = %e, "Cache lock unavailable, reading without cache");
            None
        }
    }
}
