//! Cache trait definition
//!
//! This module defines the `ObjectCache` trait used by async callers. The
//! disk cache itself is synchronous; `AsyncCacheManager` adapts it.

use async_trait::async_trait;
use bytes::Bytes;

use super::disk::{ByteRange, SourceVersionCheckMode};
use super::error::CacheError;
use super::stats::CacheStats;

/// Async view of a version-aware object cache
#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// Cached bytes of `key` at `source_version`, `None` on a miss
    async fn get(&self, key: &str, source_version: Option<&str>) -> Option<Bytes>;

    /// Store a whole object, replacing any cached version
    async fn put(&self, key: &str, data: Bytes, source_version: Option<&str>)
        -> Result<(), CacheError>;

    /// Existence check without reading the payload
    async fn contains(
        &self,
        key: &str,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> bool;

    /// Bytes `range` of `key`, served from the whole object or its chunks
    async fn get_range(
        &self,
        key: &str,
        range: ByteRange,
        source_version: Option<&str>,
    ) -> Option<Bytes>;

    /// Remove the object and all its chunks
    /// Deleting an absent key succeeds
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Run an eviction pass if one is due
    /// Returns whether a pass ran
    async fn refresh(&self) -> Result<bool, CacheError> {
        Ok(false)
    }

    /// Get cache statistics
    async fn stats(&self) -> CacheStats;
}
