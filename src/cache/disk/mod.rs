//! Chunked, version-aware disk cache shared across processes
//!
//! On-disk layout below the configured `location`:
//!
//! ```text
//! <location>/<profile>/<key...>                     whole object
//! <location>/<profile>/<dir...>/.<basename>#chunk<N> chunk N of an object
//! <location>/<profile>/<dir...>/.<basename>.lock     per-entry lock
//! <location>/.cache_refresh.lock                     whole-cache eviction lock
//! <location>/<profile>/.tmp-<profile>/               staging directory
//! ```
//!
//! All coordination between threads and processes goes through `flock`
//! locks on these files; writes are staged and renamed into place.

pub use self::async_cache::AsyncCacheManager;
pub use self::attributes::{AttributeStorage, EntryAttributes};
pub use self::chunk::{chunk_slice, chunk_span, ByteRange, ChunkStore};
pub use self::eviction::{select_victims, target_size, EvictionEngine, EvictionOutcome};
pub use self::handle::{CachedFile, OpenMode};
pub use self::index::{scan, CacheIndex, HousekeepingReport, ScannedEntry};
pub use self::lock::{FileLock, FileLockGuard};
pub use self::manager::{CacheManager, CacheSource, SourceVersionCheckMode};
pub use self::paths::{key_to_path, validate_profile, EntryPath, PathTranslator};

mod async_cache;
pub mod attributes;
mod chunk;
pub mod eviction;
mod handle;
mod index;
mod lock;
mod manager;
mod paths;
mod staging;
