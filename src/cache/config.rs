//! Cache configuration types
//!
//! This module defines the configuration of the local disk cache:
//! - `CacheConfig`: size budget, chunk size, location, version checking
//! - `EvictionPolicyConfig`: policy, refresh cadence, purge factor
//! - `parse_size`: "10M" style size strings
//!
//! Deserialization goes through `RawCacheConfig` so that the legacy
//! `size_mb` / scalar `eviction_policy` formats are rejected with a clear
//! message instead of being silently ignored.

use regex::Regex;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::constants::{
    DEFAULT_CACHE_DIR_NAME, DEFAULT_CACHE_LINE_SIZE, DEFAULT_CACHE_REFRESH_INTERVAL_SECS,
    DEFAULT_CHECK_SOURCE_VERSION, DEFAULT_PURGE_FACTOR, MAX_PURGE_FACTOR,
};

use super::error::CacheError;

/// Eviction policies supported by the disk cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EvictionPolicy {
    /// Least recently read entries go first
    Lru,
    /// Most recently read entries go first (experimental)
    Mru,
    /// Oldest inserted entries go first, regardless of reads
    #[default]
    Fifo,
    /// Random order
    Random,
    /// Never evict; no background worker is started
    NoEviction,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Mru => "mru",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Random => "random",
            EvictionPolicy::NoEviction => "no_eviction",
        }
    }

    /// Whether this policy ever deletes entries
    pub fn evicts(&self) -> bool {
        !matches!(self, EvictionPolicy::NoEviction)
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "mru" => Ok(EvictionPolicy::Mru),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "random" => Ok(EvictionPolicy::Random),
            "no_eviction" => Ok(EvictionPolicy::NoEviction),
            other => Err(format!(
                "Unknown eviction policy '{}' (expected lru, mru, fifo, random or no_eviction)",
                other
            )),
        }
    }
}

impl TryFrom<String> for EvictionPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvictionPolicy> for String {
    fn from(policy: EvictionPolicy) -> Self {
        policy.as_str().to_string()
    }
}

/// Eviction policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPolicyConfig {
    #[serde(default)]
    pub policy: EvictionPolicy,
    /// Seconds between eviction passes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Percentage of the budget to evict below capacity (0-100)
    #[serde(default = "default_purge_factor")]
    pub purge_factor: u8,
}

impl Default for EvictionPolicyConfig {
    fn default() -> Self {
        Self {
            policy: EvictionPolicy::default(),
            refresh_interval: default_refresh_interval(),
            purge_factor: default_purge_factor(),
        }
    }
}

impl EvictionPolicyConfig {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }
}

fn default_refresh_interval() -> u64 {
    DEFAULT_CACHE_REFRESH_INTERVAL_SECS
}

fn default_purge_factor() -> u8 {
    DEFAULT_PURGE_FACTOR
}

fn default_cache_line_size() -> String {
    DEFAULT_CACHE_LINE_SIZE.to_string()
}

fn default_location() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME)
}

/// Disk cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCacheConfig")]
pub struct CacheConfig {
    /// Maximum cache size, e.g. "10G"
    pub size: String,
    /// Chunk size for range caching, e.g. "64M"
    pub cache_line_size: String,
    /// Absolute cache root
    pub location: PathBuf,
    /// Require cached entries to match the remote source version
    pub check_source_version: bool,
    pub eviction_policy: EvictionPolicyConfig,
}

impl CacheConfig {
    /// Create a config with default chunk size, version checking and policy
    pub fn new(size: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            size: size.into(),
            cache_line_size: default_cache_line_size(),
            location: location.into(),
            check_source_version: DEFAULT_CHECK_SOURCE_VERSION,
            eviction_policy: EvictionPolicyConfig::default(),
        }
    }

    /// Maximum cache size in bytes
    pub fn size_bytes(&self) -> Result<u64, CacheError> {
        parse_size(&self.size)
    }

    /// Chunk size in bytes
    pub fn cache_line_size_bytes(&self) -> Result<u64, CacheError> {
        parse_size(&self.cache_line_size)
    }

    /// Validate the cache configuration
    pub fn validate(&self) -> Result<(), CacheError> {
        let size = self.size_bytes()?;
        let cache_line_size = self.cache_line_size_bytes()?;

        if size == 0 {
            return Err(CacheError::Config("size must be greater than zero".to_string()));
        }
        if cache_line_size == 0 {
            return Err(CacheError::Config(
                "cache_line_size must be greater than zero".to_string(),
            ));
        }
        if cache_line_size > size {
            return Err(CacheError::Config(format!(
                "cache_line_size ({}) cannot be greater than size ({})",
                self.cache_line_size, self.size
            )));
        }
        if !self.location.is_absolute() {
            return Err(CacheError::Config(format!(
                "location must be an absolute path, got '{}'",
                self.location.display()
            )));
        }
        if self.eviction_policy.purge_factor > MAX_PURGE_FACTOR {
            return Err(CacheError::Config(format!(
                "purge_factor must be between 0 and {}, got {}",
                MAX_PURGE_FACTOR, self.eviction_policy.purge_factor
            )));
        }
        Ok(())
    }
}

/// Wire format accepted for the `cache` section
#[derive(Deserialize)]
struct RawCacheConfig {
    size: Option<String>,
    size_mb: Option<IgnoredAny>,
    cache_line_size: Option<String>,
    location: Option<PathBuf>,
    check_source_version: Option<bool>,
    use_etag: Option<bool>,
    eviction_policy: Option<RawEvictionPolicy>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEvictionPolicy {
    Legacy(String),
    Structured(EvictionPolicyConfig),
}

impl TryFrom<RawCacheConfig> for CacheConfig {
    type Error = String;

    fn try_from(raw: RawCacheConfig) -> Result<Self, Self::Error> {
        if raw.size_mb.is_some() {
            return Err(
                "The 'size_mb' property is no longer supported, use 'size' with a unit (e.g. \"10G\")"
                    .to_string(),
            );
        }

        let eviction_policy = match raw.eviction_policy {
            None => EvictionPolicyConfig::default(),
            Some(RawEvictionPolicy::Structured(config)) => config,
            Some(RawEvictionPolicy::Legacy(policy)) => {
                return Err(format!(
                    "The eviction_policy string format ('{}') is no longer supported, use 'eviction_policy: {{ policy: {} }}'",
                    policy, policy
                ));
            }
        };

        let size = raw
            .size
            .ok_or_else(|| "'size' is required in the cache configuration".to_string())?;

        let config = CacheConfig {
            size,
            cache_line_size: raw.cache_line_size.unwrap_or_else(default_cache_line_size),
            location: raw.location.unwrap_or_else(default_location),
            // check_source_version wins over the legacy use_etag
            check_source_version: raw
                .check_source_version
                .or(raw.use_etag)
                .unwrap_or(DEFAULT_CHECK_SOURCE_VERSION),
            eviction_policy,
        };

        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

static SIZE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Compiled once; the pattern is a constant covered by `test_size_pattern_is_valid`
fn size_pattern() -> &'static Regex {
    SIZE_PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*([KkMmGg])\s*$").expect("Invalid size regex - this is a compile-time bug")
    })
}

/// Parse a size string such as "512K", "10M" or "2G" into bytes
pub fn parse_size(value: &str) -> Result<u64, CacheError> {
    let caps = size_pattern().captures(value).ok_or_else(|| {
        CacheError::Config(format!(
            "Invalid size '{}': expected a number followed by K, M or G",
            value
        ))
    })?;

    let amount: u64 = caps[1]
        .parse()
        .map_err(|_| CacheError::Config(format!("Invalid size '{}': number too large", value)))?;

    let multiplier: u64 = match caps[2].to_ascii_uppercase().as_str() {
        "K" => 1024,
        "M" => 1024 * 1024,
        _ => 1024 * 1024 * 1024,
    };

    amount
        .checked_mul(multiplier)
        .ok_or_else(|| CacheError::Config(format!("Invalid size '{}': overflows u64", value)))
}
