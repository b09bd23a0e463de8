// Constants module - centralized default values for configuration
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers improves maintainability
// and makes it easier to understand and modify defaults.

use std::time::Duration;

// =============================================================================
// Cache sizing defaults
// =============================================================================

/// Default chunk ("cache line") size used for range caching
pub const DEFAULT_CACHE_LINE_SIZE: &str = "64M";

/// Default directory name under the system temp dir when no location is set
pub const DEFAULT_CACHE_DIR_NAME: &str = "multistore-cache";

/// Whether cached entries must match the remote source version by default
pub const DEFAULT_CHECK_SOURCE_VERSION: bool = true;

// =============================================================================
// Eviction defaults
// =============================================================================

/// Default interval between eviction passes in seconds (5 minutes)
pub const DEFAULT_CACHE_REFRESH_INTERVAL_SECS: u64 = 300;

/// Default purge factor (percentage of the budget evicted below capacity)
pub const DEFAULT_PURGE_FACTOR: u8 = 0;

/// Upper bound for purge_factor
pub const MAX_PURGE_FACTOR: u8 = 100;

// =============================================================================
// On-disk layout
// =============================================================================

/// Whole-cache lock held for the duration of an eviction pass
pub const CACHE_REFRESH_LOCK_FILE: &str = ".cache_refresh.lock";

/// Prefix of the per-profile staging directory
pub const TEMP_DIR_PREFIX: &str = ".tmp-";

/// Suffix of lock files
pub const LOCK_SUFFIX: &str = ".lock";

/// Suffix of attribute sidecar files
pub const SIDECAR_SUFFIX: &str = ".meta";

/// Marker separating an object basename from its chunk index
pub const CHUNK_MARKER: &str = "#chunk";

/// Extended attribute holding the source version (ETag)
pub const XATTR_ETAG: &str = "user.etag";

/// Extended attribute holding the cache line size used at write time
pub const XATTR_CACHE_LINE_SIZE: &str = "user.cache_line_size";

/// Staged files older than this are considered abandoned by a crashed writer
pub const STALE_TEMP_FILE_AGE: Duration = Duration::from_secs(3600);

/// Name of the background eviction thread
pub const EVICTION_THREAD_NAME: &str = "multistore-cache-eviction";
