//! Out-of-band attributes of cache files
//!
//! Every cache file carries the source version (`user.etag`) it was fetched
//! against and, for chunks, the cache line size (`user.cache_line_size`) in
//! effect at write time. On Linux these are extended attributes set on the
//! staged file before it is renamed into place, so they appear atomically
//! with the data.
//!
//! Filesystems without user xattrs (and non-Linux targets) fall back to a
//! JSON sidecar `.<name>.meta` next to the data file. The sidecar records
//! the data file's size and inode; a sidecar that does not describe the file
//! actually opened is reported as corrupt, which callers treat as a miss.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::paths::companion_path;
use crate::cache::error::CacheError;
use crate::constants::SIDECAR_SUFFIX;

/// Attributes stamped on a cache file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttributes {
    /// Source version (ETag) the data was fetched against
    #[serde(default)]
    pub etag: Option<String>,
    /// Chunk size in effect when the chunk was written
    #[serde(default)]
    pub cache_line_size: Option<u64>,
}

impl EntryAttributes {
    pub fn new(etag: Option<&str>, cache_line_size: Option<u64>) -> Self {
        Self {
            etag: etag.map(str::to_string),
            cache_line_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.cache_line_size.is_none()
    }
}

/// Where attributes ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeStorage {
    ExtendedAttributes,
    Sidecar,
}

#[derive(Serialize, Deserialize)]
struct Sidecar {
    #[serde(flatten)]
    attributes: EntryAttributes,
    size: u64,
    #[serde(default)]
    inode: Option<u64>,
}

/// Stamp `attrs` on a staged file that will be renamed to `final_path`
///
/// Must be called after all data has been written to `staged`.
pub fn write_attributes(
    staged: &File,
    final_path: &Path,
    attrs: &EntryAttributes,
) -> Result<AttributeStorage, CacheError> {
    let sidecar_path = companion_path(final_path, SIDECAR_SUFFIX);

    if attrs.is_empty() {
        remove_quietly(&sidecar_path);
        return Ok(AttributeStorage::ExtendedAttributes);
    }

    #[cfg(target_os = "linux")]
    {
        match xattr::set_all(staged, attrs) {
            Ok(()) => {
                remove_quietly(&sidecar_path);
                return Ok(AttributeStorage::ExtendedAttributes);
            }
            Err(e) if xattr::is_unsupported(&e) => {
                tracing::debug!(
                    path = %final_path.display(),
                    "Extended attributes unsupported, using sidecar metadata"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    write_sidecar(staged, &sidecar_path, attrs)?;
    Ok(AttributeStorage::Sidecar)
}

/// Read the attributes of an opened cache file
pub fn read_attributes(file: &File, data_path: &Path) -> Result<EntryAttributes, CacheError> {
    #[cfg(target_os = "linux")]
    {
        match xattr::get_all(file) {
            Ok(attrs) if !attrs.is_empty() => return Ok(attrs),
            Ok(_) => {}
            Err(e) if xattr::is_unsupported(&e) => {}
            Err(e) => {
                return Err(CacheError::Metadata(format!(
                    "unreadable attributes on {}: {}",
                    data_path.display(),
                    e
                )))
            }
        }
    }

    read_sidecar(file, data_path)
}

/// Remove the sidecar of `data_path` if there is one
pub fn remove_sidecar(data_path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(companion_path(data_path, SIDECAR_SUFFIX)) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn write_sidecar(staged: &File, sidecar_path: &Path, attrs: &EntryAttributes) -> Result<(), CacheError> {
    let metadata = staged.metadata()?;
    let sidecar = Sidecar {
        attributes: attrs.clone(),
        size: metadata.len(),
        inode: inode_of(&metadata),
    };
    let json = serde_json::to_vec(&sidecar)?;

    // Same directory as the sidecar so the rename stays atomic
    let staging = sidecar_path.with_file_name(format!(
        "{}.{}",
        sidecar_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        uuid::Uuid::new_v4().simple()
    ));
    let result = publish_file(&staging, sidecar_path, &json);
    if result.is_err() {
        remove_quietly(&staging);
    }
    result.map_err(CacheError::from)
}

fn publish_file(staging: &Path, target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut out = File::create(staging)?;
    out.write_all(contents)?;
    out.sync_all()?;
    std::fs::rename(staging, target)
}

fn read_sidecar(file: &File, data_path: &Path) -> Result<EntryAttributes, CacheError> {
    let sidecar_path = companion_path(data_path, SIDECAR_SUFFIX);
    let raw = match std::fs::read(&sidecar_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(EntryAttributes::default()),
        Err(e) => return Err(e.into()),
    };
    let sidecar: Sidecar = serde_json::from_slice(&raw)?;

    let metadata = file.metadata()?;
    let inode_matches = match (sidecar.inode, inode_of(&metadata)) {
        (Some(recorded), Some(actual)) => recorded == actual,
        _ => true,
    };
    if sidecar.size != metadata.len() || !inode_matches {
        return Err(CacheError::Metadata(format!(
            "sidecar {} does not describe the current data file",
            sidecar_path.display()
        )));
    }
    Ok(sidecar.attributes)
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn inode_of(_metadata: &std::fs::Metadata) -> Option<u64> {
    None
}

fn remove_quietly(path: &Path) {
    let _ = std::fs::remove_file(path);
}

#[cfg(target_os = "linux")]
mod xattr {
    use super::EntryAttributes;
    use crate::constants::{XATTR_CACHE_LINE_SIZE, XATTR_ETAG};
    use std::ffi::CString;
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    pub fn set_all(file: &File, attrs: &EntryAttributes) -> io::Result<()> {
        if let Some(etag) = &attrs.etag {
            set(file, XATTR_ETAG, etag.as_bytes())?;
        }
        if let Some(size) = attrs.cache_line_size {
            set(file, XATTR_CACHE_LINE_SIZE, size.to_string().as_bytes())?;
        }
        Ok(())
    }

    pub fn get_all(file: &File) -> io::Result<EntryAttributes> {
        let etag = get(file, XATTR_ETAG)?
            .map(|raw| String::from_utf8(raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)))
            .transpose()?;
        let cache_line_size = get(file, XATTR_CACHE_LINE_SIZE)?
            .map(|raw| {
                String::from_utf8_lossy(&raw)
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
            .transpose()?;
        Ok(EntryAttributes {
            etag,
            cache_line_size,
        })
    }

    pub fn is_unsupported(err: &io::Error) -> bool {
        let code = err.raw_os_error();
        code == Some(libc::ENOTSUP) || code == Some(libc::EOPNOTSUPP)
    }

    fn set(file: &File, name: &str, value: &[u8]) -> io::Result<()> {
        let name = CString::new(name)?;
        // SAFETY: fd is owned by `file`, name is NUL-terminated, value/len describe a live slice
        let rc = unsafe {
            libc::fsetxattr(
                file.as_raw_fd(),
                name.as_ptr(),
                value.as_ptr() as *const libc::c_void,
                value.len(),
                0,
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn get(file: &File, name: &str) -> io::Result<Option<Vec<u8>>> {
        let name = CString::new(name)?;
        let fd = file.as_raw_fd();
        loop {
            // SAFETY: a null buffer with size 0 only queries the value length
            let size = unsafe { libc::fgetxattr(fd, name.as_ptr(), std::ptr::null_mut(), 0) };
            if size < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ENODATA) {
                    return Ok(None);
                }
                return Err(err);
            }

            let mut buf = vec![0u8; size as usize];
            // SAFETY: buf is a live allocation of buf.len() bytes
            let read = unsafe {
                libc::fgetxattr(
                    fd,
                    name.as_ptr(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if read < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    // Value grew between the two calls
                    Some(libc::ERANGE) => continue,
                    Some(libc::ENODATA) => return Ok(None),
                    _ => return Err(err),
                }
            }
            buf.truncate(read as usize);
            return Ok(Some(buf));
        }
    }
}
