// Cache module
//
// Local disk cache sitting between storage clients and remote backends.

pub mod config;
pub mod disk;
pub mod error;
pub mod stats;
pub mod traits;

pub use config::{parse_size, CacheConfig, EvictionPolicy, EvictionPolicyConfig};
pub use disk::{
    AsyncCacheManager, ByteRange, CacheManager, CacheSource, CachedFile, FileLock, FileLockGuard,
    OpenMode, SourceVersionCheckMode,
};
pub use error::CacheError;
pub use stats::CacheStats;
pub use traits::ObjectCache;
