//! Mapping of object keys to cache file paths
//!
//! Keys keep their directory structure under `<cache_root>/<profile>/`.
//! Companion files (locks, attribute sidecars) and chunk files live next to
//! the entry they belong to:
//!
//! ```text
//! <cache_dir>/<dir...>/<basename>               whole object
//! <cache_dir>/<dir...>/.<basename>#chunk<N>     chunk N
//! <cache_dir>/<dir...>/.<basename>.lock         entry lock
//! <cache_dir>/<dir...>/.<basename>#chunk<N>.lock
//! ```

use std::path::{Component, Path, PathBuf};

use crate::cache::error::CacheError;
use crate::constants::{CHUNK_MARKER, LOCK_SUFFIX, SIDECAR_SUFFIX, TEMP_DIR_PREFIX};

/// Translates object keys into paths below one profile's cache directory
#[derive(Debug, Clone)]
pub struct PathTranslator {
    cache_dir: PathBuf,
}

impl PathTranslator {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Resolve a key to its on-disk location
    ///
    /// Leading slashes, empty and `.` segments are dropped. Keys with `..`
    /// segments, NUL bytes, staging-directory segments or reserved companion
    /// basenames are rejected so nothing can land outside the cache dir or
    /// shadow a lock/chunk file.
    pub fn resolve(&self, key: &str) -> Result<EntryPath, CacheError> {
        if key.contains('\0') {
            return Err(CacheError::InvalidKey(format!("{:?} contains a NUL byte", key)));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in key.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(CacheError::InvalidKey(format!(
                        "'{}' escapes the cache directory",
                        key
                    )))
                }
                s if s.starts_with(TEMP_DIR_PREFIX) => {
                    return Err(CacheError::InvalidKey(format!(
                        "'{}' uses the reserved prefix '{}'",
                        key, TEMP_DIR_PREFIX
                    )))
                }
                s => segments.push(s),
            }
        }

        let basename = match segments.pop() {
            Some(name) => name,
            None => return Err(CacheError::InvalidKey(format!("'{}' is empty", key))),
        };
        if is_reserved_name(basename) {
            return Err(CacheError::InvalidKey(format!(
                "'{}' collides with cache bookkeeping files",
                key
            )));
        }

        let mut dir = self.cache_dir.clone();
        for segment in &segments {
            dir.push(segment);
        }

        // A segment such as "C:" or "\\server" on Windows would still turn
        // into a prefix/root component when pushed.
        if dir
            .strip_prefix(&self.cache_dir)
            .map(|rel| rel.components().any(|c| !matches!(c, Component::Normal(_))))
            .unwrap_or(true)
        {
            return Err(CacheError::InvalidKey(format!(
                "'{}' escapes the cache directory",
                key
            )));
        }

        let mut normalized = segments.join("/");
        if !normalized.is_empty() {
            normalized.push('/');
        }
        normalized.push_str(basename);

        Ok(EntryPath {
            key: normalized,
            dir,
            basename: basename.to_string(),
        })
    }
}

/// `key_to_path(cache_root, profile, object_key)` as a free function
pub fn key_to_path(cache_root: &Path, profile: &str, key: &str) -> Result<PathBuf, CacheError> {
    validate_profile(profile)?;
    let translator = PathTranslator::new(cache_root.join(profile));
    Ok(translator.resolve(key)?.data_path())
}

/// Profiles become a single directory level under the cache root
pub fn validate_profile(profile: &str) -> Result<(), CacheError> {
    if profile.is_empty()
        || profile == "."
        || profile == ".."
        || profile.contains(['/', '\\', '\0'])
        || profile.starts_with(TEMP_DIR_PREFIX)
    {
        return Err(CacheError::Config(format!(
            "Invalid profile name '{}'",
            profile
        )));
    }
    Ok(())
}

/// Location of one cached object and its companions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPath {
    key: String,
    dir: PathBuf,
    basename: String,
}

impl EntryPath {
    /// Normalized key this path was resolved from
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Whole-object cache file
    pub fn data_path(&self) -> PathBuf {
        self.dir.join(&self.basename)
    }

    /// Per-entry lock file
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(companion_name(&self.basename, LOCK_SUFFIX))
    }

    /// File name of chunk `index`
    pub fn chunk_file_name(&self, index: u64) -> String {
        format!("{}{}", self.chunk_prefix(), index)
    }

    pub fn chunk_path(&self, index: u64) -> PathBuf {
        self.dir.join(self.chunk_file_name(index))
    }

    pub fn chunk_lock_path(&self, index: u64) -> PathBuf {
        self.dir
            .join(companion_name(&self.chunk_file_name(index), LOCK_SUFFIX))
    }

    /// Common prefix of every chunk file of this entry
    pub fn chunk_prefix(&self) -> String {
        format!(".{}{}", self.basename, CHUNK_MARKER)
    }
}

/// Name of a companion file (`.lock`, `.meta`) for a data file
///
/// Chunk files are already hidden and get the suffix appended; whole-object
/// files are hidden first: `data` -> `.data.lock`, `.data#chunk0` ->
/// `.data#chunk0.lock`, `.hidden` -> `..hidden.lock`.
pub fn companion_name(file_name: &str, suffix: &str) -> String {
    if parse_chunk_file_name(file_name).is_some() {
        format!("{}{}", file_name, suffix)
    } else {
        format!(".{}{}", file_name, suffix)
    }
}

/// Companion path next to `path`
pub fn companion_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(companion_name(&name, suffix))
}

pub fn is_lock_file(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(LOCK_SUFFIX)
}

pub fn is_sidecar_file(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(SIDECAR_SUFFIX)
}

/// Split a chunk file name into (object basename, chunk index)
pub fn parse_chunk_file_name(file_name: &str) -> Option<(&str, u64)> {
    let rest = file_name.strip_prefix('.')?;
    let pos = rest.rfind(CHUNK_MARKER)?;
    let digits = &rest[pos + CHUNK_MARKER.len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&rest[..pos], digits.parse().ok()?))
}

fn is_reserved_name(name: &str) -> bool {
    // "x#chunk0" is rejected too: its companions would collide with the
    // companions of chunk 0 of "x".
    is_lock_file(name) || is_sidecar_file(name) || ends_with_chunk_marker(name)
}

fn ends_with_chunk_marker(name: &str) -> bool {
    match name.rfind(CHUNK_MARKER) {
        Some(pos) => {
            let digits = &name[pos + CHUNK_MARKER.len()..];
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Data file for a companion path, the inverse of `companion_path`
pub fn data_path_for_companion(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(suffix)?;
    if parse_chunk_file_name(stem).is_some() {
        Some(path.with_file_name(stem))
    } else {
        let data_name = stem.strip_prefix('.')?;
        if data_name.is_empty() {
            return None;
        }
        Some(path.with_file_name(data_name))
    }
}
