//! Async adapter over the blocking disk cache
//!
//! Disk cache operations block on file I/O and flock, so each call runs on
//! tokio's blocking pool.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::chunk::ByteRange;
use super::manager::{CacheManager, SourceVersionCheckMode};
use crate::cache::error::CacheError;
use crate::cache::stats::CacheStats;
use crate::cache::traits::ObjectCache;

/// [`ObjectCache`] backed by a shared [`CacheManager`]
#[derive(Debug, Clone)]
pub struct AsyncCacheManager {
    manager: Arc<CacheManager>,
}

impl AsyncCacheManager {
    pub fn new(manager: CacheManager) -> Self {
        Self::from_shared(Arc::new(manager))
    }

    pub fn from_shared(manager: Arc<CacheManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    async fn run<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(&CacheManager) -> T + Send + 'static,
        T: Send + 'static,
    {
        let manager = self.manager.clone();
        tokio::task::spawn_blocking(move || op(&manager))
            .await
            .map_err(|e| CacheError::Io(std::io::Error::other(e)))
    }

    /// Like `run` for lookups, which degrade to a miss
    async fn lookup<T, F>(&self, op: F) -> Option<T>
    where
        F: FnOnce(&CacheManager) -> Option<T> + Send + 'static,
        T: Send + 'static,
    {
        match self.run(op).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Blocking cache task failed");
                None
            }
        }
    }
}

#[async_trait]
impl ObjectCache for AsyncCacheManager {
    async fn get(&self, key: &str, source_version: Option<&str>) -> Option<Bytes> {
        let key = key.to_string();
        let version = source_version.map(str::to_string);
        self.lookup(move |m| m.read(&key, version.as_deref())).await
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        source_version: Option<&str>,
    ) -> Result<(), CacheError> {
        let key = key.to_string();
        let version = source_version.map(str::to_string);
        self.run(move |m| m.set(&key, &data, version.as_deref()))
            .await?
    }

    async fn contains(
        &self,
        key: &str,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> bool {
        let key = key.to_string();
        let version = source_version.map(str::to_string);
        self.lookup(move |m| m.contains(&key, version.as_deref(), mode).then_some(()))
            .await
            .is_some()
    }

    async fn get_range(
        &self,
        key: &str,
        range: ByteRange,
        source_version: Option<&str>,
    ) -> Option<Bytes> {
        let key = key.to_string();
        let version = source_version.map(str::to_string);
        self.lookup(move |m| {
            m.read_range(&key, range, version.as_deref(), SourceVersionCheckMode::Inherit)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        self.run(move |m| m.delete(&key)).await?
    }

    async fn refresh(&self) -> Result<bool, CacheError> {
        self.run(|m| m.refresh_cache()).await?
    }

    async fn stats(&self) -> CacheStats {
        match self.run(|m| m.stats()).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect cache stats");
                CacheStats {
                    max_size_bytes: self.manager.max_size(),
                    ..Default::default()
                }
            }
        }
    }
}
