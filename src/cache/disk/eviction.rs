//! Size-bounded eviction
//!
//! Eviction runs only when the cache exceeds its budget and removes entries
//! in policy order until the total is at or below
//! `max_size * (100 - purge_factor) / 100`. The ordering is a pure function
//! of the scanned entries so policies can be tested without touching disk.

use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};

use super::attributes::remove_sidecar;
use super::index::ScannedEntry;
use super::paths::companion_path;
use crate::cache::config::EvictionPolicy;
use crate::constants::{LOCK_SUFFIX, MAX_PURGE_FACTOR};

/// Size the cache is shrunk to once eviction triggers
pub fn target_size(max_size: u64, purge_factor: u8) -> u64 {
    let keep = u128::from(MAX_PURGE_FACTOR.saturating_sub(purge_factor));
    (u128::from(max_size) * keep / u128::from(MAX_PURGE_FACTOR)) as u64
}

/// Entries in the order the policy evicts them
pub fn eviction_order(mut entries: Vec<ScannedEntry>, policy: EvictionPolicy) -> Vec<ScannedEntry> {
    match policy {
        EvictionPolicy::Lru => entries.sort_by(|a, b| a.accessed.cmp(&b.accessed)),
        EvictionPolicy::Mru => entries.sort_by(|a, b| b.accessed.cmp(&a.accessed)),
        EvictionPolicy::Fifo => entries.sort_by(|a, b| a.modified.cmp(&b.modified)),
        EvictionPolicy::Random => entries.shuffle(&mut rand::thread_rng()),
        EvictionPolicy::NoEviction => entries.clear(),
    }
    entries
}

/// Entries to delete so the total drops to the purge target
///
/// Empty unless the total exceeds `max_size`. Stops at the first prefix of
/// the policy order that brings the total to or below the target.
pub fn select_victims(
    entries: Vec<ScannedEntry>,
    policy: EvictionPolicy,
    max_size: u64,
    purge_factor: u8,
) -> Vec<ScannedEntry> {
    let mut total: u64 = entries.iter().map(|e| e.size).sum();
    if total <= max_size || !policy.evicts() {
        return Vec::new();
    }
    let target = target_size(max_size, purge_factor);

    let mut victims = Vec::new();
    for entry in eviction_order(entries, policy) {
        if total <= target {
            break;
        }
        total = total.saturating_sub(entry.size);
        victims.push(entry);
    }
    victims
}

/// Result of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    pub deleted: Vec<PathBuf>,
    pub freed_bytes: u64,
    pub failed: usize,
    pub remaining_bytes: u64,
}

/// Applies an eviction policy to scanned entries
#[derive(Debug, Clone, Copy)]
pub struct EvictionEngine {
    policy: EvictionPolicy,
    max_size: u64,
    purge_factor: u8,
}

impl EvictionEngine {
    pub fn new(policy: EvictionPolicy, max_size: u64, purge_factor: u8) -> Self {
        Self {
            policy,
            max_size,
            purge_factor: purge_factor.min(MAX_PURGE_FACTOR),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Delete entries until the cache fits the target
    ///
    /// A failed deletion is logged and skipped; the pass moves on to the next
    /// candidate since the failed entry still counts towards the total.
    pub fn evict(&self, entries: Vec<ScannedEntry>) -> EvictionOutcome {
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        let mut outcome = EvictionOutcome {
            remaining_bytes: total,
            ..Default::default()
        };
        if total <= self.max_size || !self.policy.evicts() {
            return outcome;
        }
        let target = target_size(self.max_size, self.purge_factor);

        for entry in eviction_order(entries, self.policy) {
            if total <= target {
                break;
            }
            match delete_entry(&entry.path) {
                Ok(()) => {
                    total = total.saturating_sub(entry.size);
                    outcome.freed_bytes += entry.size;
                    outcome.deleted.push(entry.path);
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), error = %e, "Failed to evict cache entry");
                    outcome.failed += 1;
                }
            }
        }
        outcome.remaining_bytes = total;

        tracing::info!(
            policy = %self.policy,
            evicted = outcome.deleted.len(),
            freed_bytes = outcome.freed_bytes,
            remaining_bytes = total,
            target_bytes = target,
            failed = outcome.failed,
            "Cache eviction pass finished"
        );
        outcome
    }
}

/// Remove a data file together with its sidecar and lock file
///
/// A data file that is already gone counts as deleted. Only a failure to
/// remove the data file is an error; leftover companions are logged.
pub fn delete_entry(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    if let Err(e) = remove_sidecar(path) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove sidecar of evicted entry");
    }
    match std::fs::remove_file(companion_path(path, LOCK_SUFFIX)) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove lock file of evicted entry");
        }
        _ => {}
    }
    Ok(())
}
