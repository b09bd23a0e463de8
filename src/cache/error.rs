//! Cache error types
//!
//! This module defines error types for cache operations. Only
//! configuration errors are fatal; everything else is recovered by the
//! callers and degrades to a cache miss.

use std::path::PathBuf;
use thiserror::Error;

/// Cache error types
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid cache configuration (bad size string, relative location, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object key that cannot be mapped inside the cache root
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// OS-level advisory lock could not be taken
    #[error("Failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Extended attributes or sidecar metadata unreadable
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Chunk payload longer than the configured cache line
    #[error("Chunk of {len} bytes exceeds cache line size {limit}")]
    ChunkTooLarge { len: u64, limit: u64 },

    /// Operation not allowed for the handle's open mode
    #[error("Invalid mode: {0}")]
    InvalidMode(&'static str),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Metadata(err.to_string())
    }
}

impl CacheError {
    /// True if the error only means "the file was not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
