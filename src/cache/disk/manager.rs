//! Per-profile disk cache façade
//!
//! `CacheManager` combines key mapping, file locks, chunk storage and
//! eviction. Runtime failures on the read side are logged and reported as
//! misses so the remote backend stays the source of truth; only
//! construction surfaces configuration errors.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use super::attributes::{remove_sidecar, EntryAttributes};
use super::chunk::{
    chunk_slice, chunk_span, open_validated, remove_if_present, touch_accessed, ByteRange,
    ChunkStore,
};
use super::eviction::EvictionEngine;
use super::handle::{CachedFile, OpenMode};
use super::index::CacheIndex;
use super::lock::{FileLock, FileLockGuard};
use super::paths::{validate_profile, EntryPath, PathTranslator};
use super::staging::{staging_path, StagedFile};
use crate::cache::config::CacheConfig;
use crate::cache::error::CacheError;
use crate::cache::stats::{CacheStats, CacheStatsTracker};
use crate::constants::{CACHE_REFRESH_LOCK_FILE, EVICTION_THREAD_NAME, TEMP_DIR_PREFIX};

/// Per-call override of the configured `check_source_version`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceVersionCheckMode {
    /// Use the cache configuration
    #[default]
    Inherit,
    Enable,
    Disable,
}

impl SourceVersionCheckMode {
    /// Effective setting given the configured default
    pub fn resolve(self, configured: bool) -> bool {
        match self {
            SourceVersionCheckMode::Inherit => configured,
            SourceVersionCheckMode::Enable => true,
            SourceVersionCheckMode::Disable => false,
        }
    }
}

/// Data handed to [`CacheManager::set`]
#[derive(Debug, Clone, Copy)]
pub enum CacheSource<'a> {
    /// In-memory payload
    Bytes(&'a [u8]),
    /// Local file whose contents are copied into the cache
    File(&'a Path),
}

impl<'a> From<&'a [u8]> for CacheSource<'a> {
    fn from(data: &'a [u8]) -> Self {
        CacheSource::Bytes(data)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for CacheSource<'a> {
    fn from(data: &'a [u8; N]) -> Self {
        CacheSource::Bytes(data)
    }
}

impl<'a> From<&'a Vec<u8>> for CacheSource<'a> {
    fn from(data: &'a Vec<u8>) -> Self {
        CacheSource::Bytes(data)
    }
}

impl<'a> From<&'a Bytes> for CacheSource<'a> {
    fn from(data: &'a Bytes) -> Self {
        CacheSource::Bytes(data)
    }
}

impl<'a> From<&'a Path> for CacheSource<'a> {
    fn from(path: &'a Path) -> Self {
        CacheSource::File(path)
    }
}

impl<'a> From<&'a PathBuf> for CacheSource<'a> {
    fn from(path: &'a PathBuf) -> Self {
        CacheSource::File(path)
    }
}

/// State shared with the eviction worker
#[derive(Debug)]
struct CacheCore {
    config: CacheConfig,
    max_size: u64,
    cache_root: PathBuf,
    temp_dir: PathBuf,
    index: CacheIndex,
    engine: EvictionEngine,
    refresh_interval: Duration,
    last_refresh: Mutex<Instant>,
    stats: CacheStatsTracker,
}

impl CacheCore {
    fn refresh_cache(&self) -> Result<bool, CacheError> {
        if !self.config.eviction_policy.policy.evicts() {
            return Ok(false);
        }
        if self.last_refresh.lock().elapsed() < self.refresh_interval {
            return Ok(false);
        }
        self.run_refresh()
    }

    /// One housekeeping + eviction pass under the whole-cache lock
    ///
    /// Skipped when another thread or process is already refreshing.
    fn run_refresh(&self) -> Result<bool, CacheError> {
        let lock = FileLock::new(self.cache_root.join(CACHE_REFRESH_LOCK_FILE));
        let Some(_guard) = lock.try_acquire()? else {
            tracing::debug!(root = %self.cache_root.display(), "Cache refresh already in progress");
            return Ok(false);
        };
        *self.last_refresh.lock() = Instant::now();

        self.index.housekeep(SystemTime::now());
        let entries = self.index.scan();
        let total: u64 = entries.iter().map(|e| e.size).sum();
        tracing::debug!(
            entries = entries.len(),
            total_bytes = total,
            max_bytes = self.max_size,
            "Scanned cache"
        );

        let outcome = self.engine.evict(entries);
        self.stats.add_evictions(outcome.deleted.len() as u64);
        Ok(true)
    }
}

/// Background thread running refresh passes every `refresh_interval`
#[derive(Debug)]
struct EvictionWorker {
    shutdown: Arc<WorkerShutdown>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct WorkerShutdown {
    stopped: Mutex<bool>,
    signal: Condvar,
}

impl EvictionWorker {
    fn spawn(core: Arc<CacheCore>) -> Result<Self, CacheError> {
        let shutdown = Arc::new(WorkerShutdown::default());
        let period = core.refresh_interval.max(Duration::from_secs(1));
        let thread_shutdown = shutdown.clone();

        let handle = std::thread::Builder::new()
            .name(EVICTION_THREAD_NAME.to_string())
            .spawn(move || loop {
                {
                    let mut stopped = thread_shutdown.stopped.lock();
                    if !*stopped {
                        thread_shutdown.signal.wait_for(&mut stopped, period);
                    }
                    if *stopped {
                        break;
                    }
                }
                if let Err(e) = core.refresh_cache() {
                    tracing::warn!(error = %e, "Background cache refresh failed");
                }
            })?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }
}

impl Drop for EvictionWorker {
    fn drop(&mut self) {
        *self.shutdown.stopped.lock() = true;
        self.shutdown.signal.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Cache eviction worker panicked");
            }
        }
    }
}

/// Disk cache of one storage profile
///
/// Created once per profile; all operations take `&self` and may be called
/// from many threads. Processes sharing `location` coordinate through lock
/// files only.
#[derive(Debug)]
pub struct CacheManager {
    profile: String,
    translator: PathTranslator,
    chunks: ChunkStore,
    core: Arc<CacheCore>,
    worker: Option<EvictionWorker>,
}

impl CacheManager {
    /// Validate `config` and prepare `<location>/<profile>/`
    ///
    /// Every policy except `NoEviction` starts a background eviction thread.
    pub fn new(profile: &str, config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        validate_profile(profile)?;
        let max_size = config.size_bytes()?;
        let cache_line_size = config.cache_line_size_bytes()?;

        let cache_root = config.location.clone();
        let cache_dir = cache_root.join(profile);
        let temp_dir = cache_dir.join(format!("{}{}", TEMP_DIR_PREFIX, profile));
        std::fs::create_dir_all(&temp_dir)?;

        let policy = config.eviction_policy.policy;
        let core = Arc::new(CacheCore {
            max_size,
            index: CacheIndex::new(&cache_root),
            engine: EvictionEngine::new(policy, max_size, config.eviction_policy.purge_factor),
            refresh_interval: Duration::from_secs(config.eviction_policy.refresh_interval),
            last_refresh: Mutex::new(Instant::now()),
            stats: CacheStatsTracker::new(),
            cache_root,
            temp_dir: temp_dir.clone(),
            config,
        });

        let worker = if policy.evicts() {
            Some(EvictionWorker::spawn(core.clone())?)
        } else {
            None
        };

        tracing::info!(
            profile,
            location = %core.cache_root.display(),
            max_bytes = max_size,
            cache_line_size,
            policy = %policy,
            check_source_version = core.config.check_source_version,
            "Disk cache initialized"
        );

        Ok(Self {
            profile: profile.to_string(),
            translator: PathTranslator::new(cache_dir),
            chunks: ChunkStore::new(cache_line_size, temp_dir),
            core,
            worker,
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn config(&self) -> &CacheConfig {
        &self.core.config
    }

    /// `<location>/<profile>`
    pub fn cache_dir(&self) -> &Path {
        self.translator.cache_dir()
    }

    /// `<location>/<profile>/.tmp-<profile>`
    pub fn temp_dir(&self) -> &Path {
        &self.core.temp_dir
    }

    pub fn cache_line_size(&self) -> u64 {
        self.chunks.cache_line_size()
    }

    pub fn max_size(&self) -> u64 {
        self.core.max_size
    }

    /// Configured `check_source_version`
    pub fn check_source_version(&self) -> bool {
        self.core.config.check_source_version
    }

    /// Whether a background eviction thread is running
    pub fn has_eviction_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Cache file path of `key`
    pub fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        Ok(self.translator.resolve(key)?.data_path())
    }

    /// Store a whole object, replacing any cached version
    ///
    /// Objects larger than the cache are not stored unless eviction is
    /// disabled. Does not take the entry lock, so callers may hold it.
    pub fn set<'a>(
        &self,
        key: &str,
        source: impl Into<CacheSource<'a>>,
        source_version: Option<&str>,
    ) -> Result<(), CacheError> {
        let entry = self.translator.resolve(key)?;
        let source = source.into();

        let size = match source {
            CacheSource::Bytes(data) => data.len() as u64,
            CacheSource::File(path) => std::fs::metadata(path)?.len(),
        };
        if size > self.core.max_size && self.core.config.eviction_policy.policy.evicts() {
            tracing::debug!(
                key = entry.key(),
                size,
                max_bytes = self.core.max_size,
                "Object larger than cache, not caching"
            );
            return Ok(());
        }

        let staged = match source {
            CacheSource::Bytes(data) => StagedFile::with_contents(&self.core.temp_dir, data)?,
            CacheSource::File(path) => StagedFile::copy_of(&self.core.temp_dir, path)?,
        };
        staged.commit(&entry.data_path(), &EntryAttributes::new(source_version, None))?;
        tracing::debug!(key = entry.key(), size, version = ?source_version, "Cached object");
        Ok(())
    }

    /// Cached bytes of `key`, or `None` on a miss
    ///
    /// With version checking enabled a missing `source_version` is a miss.
    pub fn read(&self, key: &str, source_version: Option<&str>) -> Option<Bytes> {
        self.read_with_mode(key, source_version, SourceVersionCheckMode::Inherit)
    }

    /// [`CacheManager::read`] with an explicit version check mode
    pub fn read_with_mode(
        &self,
        key: &str,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> Option<Bytes> {
        let result = self.read_whole(key, source_version, mode);
        self.record(key, result)
    }

    /// Whether a valid entry for `key` exists, without reading it
    pub fn contains(
        &self,
        key: &str,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> bool {
        let check = self.effective_check(mode);
        let result = self
            .translator
            .resolve(key)
            .and_then(|entry| open_validated(&entry.data_path(), source_version, check));
        match result {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache lookup failed, treating as miss");
                false
            }
        }
    }

    /// Remove the object, all its chunks and their lock files
    ///
    /// Deleting an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        let entry = self.translator.resolve(key)?;
        let data_path = entry.data_path();
        remove_if_present(&data_path)?;
        remove_sidecar(&data_path)?;
        remove_if_present(&entry.lock_path())?;
        let chunks = self.chunks.delete_chunks(&entry)?;
        tracing::debug!(key = entry.key(), chunks, "Deleted cache entry");
        Ok(())
    }

    /// Open the cache file of `key`
    ///
    /// `Read` returns `None` when nothing is cached and does not check
    /// versions. `Write` returns a staged handle that replaces the entry on
    /// [`CachedFile::commit`].
    pub fn open(&self, key: &str, mode: OpenMode) -> Result<Option<CachedFile>, CacheError> {
        let entry = self.translator.resolve(key)?;
        match mode {
            OpenMode::Read => {
                let path = entry.data_path();
                match open_validated(&path, None, false)? {
                    Some((file, _)) => {
                        touch_accessed(&file, &path);
                        self.core.stats.increment_hits();
                        Ok(Some(CachedFile::reader(file, path)))
                    }
                    None => {
                        self.core.stats.increment_misses();
                        Ok(None)
                    }
                }
            }
            OpenMode::Write => {
                let staged = StagedFile::create(&self.core.temp_dir)?;
                Ok(Some(CachedFile::writer(staged, entry.data_path())))
            }
        }
    }

    /// Block until the cross-process lock of `key` is held
    pub fn acquire_lock(&self, key: &str) -> Result<FileLockGuard, CacheError> {
        let entry = self.translator.resolve(key)?;
        FileLock::new(entry.lock_path()).acquire()
    }

    /// Run a refresh pass if `refresh_interval` has elapsed since the last one
    ///
    /// Returns whether a pass ran. Always `false` under `NoEviction`.
    pub fn refresh_cache(&self) -> Result<bool, CacheError> {
        self.core.refresh_cache()
    }

    /// Run a refresh pass now, ignoring the interval
    pub fn force_refresh_cache(&self) -> Result<bool, CacheError> {
        if !self.core.config.eviction_policy.policy.evicts() {
            return Ok(false);
        }
        self.core.run_refresh()
    }

    /// When the last refresh pass started (construction time before the first)
    pub fn last_refresh_time(&self) -> Instant {
        *self.core.last_refresh.lock()
    }

    /// A path in the staging directory that does not exist yet
    pub fn generate_temp_file_path(&self) -> PathBuf {
        loop {
            let path = staging_path(&self.core.temp_dir);
            if !path.exists() {
                return path;
            }
        }
    }

    /// Bytes of cached data below the cache root, all profiles included
    pub fn cache_size(&self) -> u64 {
        self.core.index.cache_size()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.core.index.scan();
        let size = entries.iter().map(|e| e.size).sum();
        self.core
            .stats
            .snapshot(size, entries.len() as u64, self.core.max_size)
    }

    /// Store chunk `index` of `key`
    pub fn set_chunk(
        &self,
        key: &str,
        index: u64,
        data: &[u8],
        source_version: Option<&str>,
    ) -> Result<(), CacheError> {
        let entry = self.translator.resolve(key)?;
        self.chunks.write_chunk(&entry, index, data, source_version)
    }

    pub fn read_chunk(
        &self,
        key: &str,
        index: u64,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> Option<Bytes> {
        let check = self.effective_check(mode);
        let result = self
            .translator
            .resolve(key)
            .and_then(|entry| self.chunks.read_chunk(&entry, index, source_version, check));
        self.record(key, result)
    }

    pub fn contains_chunk(
        &self,
        key: &str,
        index: u64,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> bool {
        let check = self.effective_check(mode);
        let result = self
            .translator
            .resolve(key)
            .and_then(|entry| self.chunks.chunk_exists(&entry, index, source_version, check));
        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key, chunk = index, error = %e, "Chunk lookup failed, treating as miss");
                false
            }
        }
    }

    /// Block until the cross-process lock of chunk `index` of `key` is held
    pub fn acquire_chunk_lock(&self, key: &str, index: u64) -> Result<FileLockGuard, CacheError> {
        let entry = self.translator.resolve(key)?;
        FileLock::new(entry.chunk_lock_path(index)).acquire()
    }

    /// Bytes `range` of `key` from the whole object or its chunks
    ///
    /// Each chunk is validated on its own; any missing or stale chunk makes
    /// the whole range a miss. A short chunk marks the end of the object, so
    /// a range past the end is cut there. When the object size is a multiple
    /// of the cache line the end cannot be seen and such a range misses.
    pub fn read_range(
        &self,
        key: &str,
        range: ByteRange,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> Option<Bytes> {
        let result = self
            .translator
            .resolve(key)
            .and_then(|entry| self.read_range_inner(&entry, range, source_version, mode));
        self.record(key, result)
    }

    fn read_range_inner(
        &self,
        entry: &EntryPath,
        range: ByteRange,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> Result<Option<Bytes>, CacheError> {
        if range.is_empty() {
            return Ok(Some(Bytes::new()));
        }
        let check = self.effective_check(mode);

        let path = entry.data_path();
        if let Some((mut file, _)) = open_validated(&path, source_version, check)? {
            let len = file.metadata()?.len();
            let range = range.clamp_to(len);
            let mut data = Vec::with_capacity(range.size as usize);
            file.seek(SeekFrom::Start(range.offset))?;
            file.by_ref().take(range.size).read_to_end(&mut data)?;
            touch_accessed(&file, &path);
            return Ok(Some(Bytes::from(data)));
        }

        let line = self.chunks.cache_line_size();
        let Some(span) = chunk_span(range, line) else {
            return Ok(Some(Bytes::new()));
        };
        let mut assembled = Vec::new();
        for index in span {
            let Some(chunk) = self.chunks.read_chunk(entry, index, source_version, check)? else {
                return Ok(None);
            };
            let wanted = chunk_slice(range, index, line);
            if chunk.len() < wanted.end {
                // Only the object's final chunk is short
                let start = wanted.start.min(chunk.len());
                assembled.extend_from_slice(&chunk[start..]);
                break;
            }
            assembled.extend_from_slice(&chunk[wanted]);
        }
        Ok(Some(Bytes::from(assembled)))
    }

    fn read_whole(
        &self,
        key: &str,
        source_version: Option<&str>,
        mode: SourceVersionCheckMode,
    ) -> Result<Option<Bytes>, CacheError> {
        let entry = self.translator.resolve(key)?;
        let path = entry.data_path();
        let Some((mut file, _)) = open_validated(&path, source_version, self.effective_check(mode))?
        else {
            return Ok(None);
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        touch_accessed(&file, &path);
        Ok(Some(Bytes::from(data)))
    }

    fn effective_check(&self, mode: SourceVersionCheckMode) -> bool {
        mode.resolve(self.core.config.check_source_version)
    }

    /// Count a lookup and degrade errors to a miss
    fn record(&self, key: &str, result: Result<Option<Bytes>, CacheError>) -> Option<Bytes> {
        match result {
            Ok(Some(data)) => {
                self.core.stats.increment_hits();
                tracing::trace!(key, bytes = data.len(), "Cache hit");
                Some(data)
            }
            Ok(None) => {
                self.core.stats.increment_misses();
                tracing::trace!(key, "Cache miss");
                None
            }
            Err(e) => {
                self.core.stats.increment_misses();
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }
}
