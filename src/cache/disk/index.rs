//! Cache directory scanning
//!
//! The cache keeps no persistent index: the directory tree is the index.
//! A scan walks every profile below the cache root and reports each data
//! file (whole objects and chunks) with the timestamps eviction needs. Lock
//! files, attribute sidecars and staging directories are skipped. Files that
//! vanish mid-walk, typically removed by another process, are omitted.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use super::paths::{data_path_for_companion, is_lock_file, is_sidecar_file};
use crate::constants::{SIDECAR_SUFFIX, STALE_TEMP_FILE_AGE, TEMP_DIR_PREFIX};

/// One data file found by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    pub path: PathBuf,
    pub size: u64,
    /// Last access time (LRU/MRU)
    pub accessed: SystemTime,
    /// Insertion time: the rename into place (FIFO)
    pub modified: SystemTime,
}

/// What a housekeeping pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub stale_temp_files: usize,
    pub orphan_sidecars: usize,
}

/// Directory-tree view of one cache root
#[derive(Debug, Clone)]
pub struct CacheIndex {
    root: PathBuf,
}

impl CacheIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every data file below the root
    pub fn scan(&self) -> Vec<ScannedEntry> {
        scan(&self.root)
    }

    /// Total bytes of all data files
    pub fn cache_size(&self) -> u64 {
        self.scan().iter().map(|e| e.size).sum()
    }

    /// Remove abandoned staged files and sidecars whose data file is gone
    ///
    /// Both only count once older than [`STALE_TEMP_FILE_AGE`]: a fresh
    /// sidecar may legitimately precede the rename of its data file.
    pub fn housekeep(&self, now: SystemTime) -> HousekeepingReport {
        let mut report = HousekeepingReport::default();

        for dirent in WalkDir::new(&self.root).min_depth(1) {
            let dirent = match dirent {
                Ok(d) => d,
                Err(e) => {
                    log_walk_error(&e);
                    continue;
                }
            };
            if !dirent.file_type().is_file() {
                continue;
            }
            let path = dirent.path();
            let Ok(metadata) = dirent.metadata() else {
                continue;
            };
            let stale = metadata
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .is_some_and(|age| age >= STALE_TEMP_FILE_AGE);
            if !stale {
                continue;
            }

            let in_temp_dir = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(TEMP_DIR_PREFIX));
            let name = dirent.file_name().to_string_lossy();

            if in_temp_dir {
                if remove_quietly(path) {
                    report.stale_temp_files += 1;
                }
            } else if is_sidecar_file(&name) {
                let orphaned = data_path_for_companion(path, SIDECAR_SUFFIX)
                    .is_some_and(|data| !data.exists());
                if orphaned && remove_quietly(path) {
                    report.orphan_sidecars += 1;
                }
            }
        }

        if report != HousekeepingReport::default() {
            tracing::info!(
                stale_temp_files = report.stale_temp_files,
                orphan_sidecars = report.orphan_sidecars,
                "Removed leftover cache files"
            );
        }
        report
    }
}

/// Walk `root` and collect every cache data file
pub fn scan(root: &Path) -> Vec<ScannedEntry> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_temp_dir(e));

    let mut entries = Vec::new();
    for dirent in walker {
        let dirent = match dirent {
            Ok(d) => d,
            Err(e) => {
                log_walk_error(&e);
                continue;
            }
        };
        if !dirent.file_type().is_file() {
            continue;
        }
        let name = dirent.file_name().to_string_lossy();
        if is_lock_file(&name) || is_sidecar_file(&name) {
            continue;
        }

        let metadata = match dirent.metadata() {
            Ok(m) => m,
            Err(e) => {
                log_walk_error(&e);
                continue;
            }
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push(ScannedEntry {
            path: dirent.into_path(),
            size: metadata.len(),
            accessed: metadata.accessed().unwrap_or(modified),
            modified,
        });
    }
    entries
}

fn is_temp_dir(dirent: &walkdir::DirEntry) -> bool {
    dirent.file_type().is_dir()
        && dirent
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(TEMP_DIR_PREFIX))
}

fn log_walk_error(err: &walkdir::Error) {
    let vanished = err
        .io_error()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound);
    if !vanished {
        tracing::warn!(error = %err, "Skipping unreadable cache path");
    }
}

fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove leftover file");
            }
            false
        }
    }
}
