//! Staged writes
//!
//! Every cache file is written in the profile's `.tmp-<profile>` directory,
//! stamped with its attributes and renamed into place. Readers therefore
//! see either the previous complete file or the new complete file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::attributes::{write_attributes, EntryAttributes};
use crate::cache::error::CacheError;

/// Fresh, not yet existing path inside `temp_dir`
pub fn staging_path(temp_dir: &Path) -> PathBuf {
    temp_dir.join(uuid::Uuid::new_v4().simple().to_string())
}

/// A file being written in the staging directory
///
/// Dropping it without [`StagedFile::commit`] removes the partial file.
#[derive(Debug)]
pub struct StagedFile {
    file: File,
    path: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn create(temp_dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(temp_dir)?;
        loop {
            let path = staging_path(temp_dir);
            match OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => {
                    return Ok(Self {
                        file,
                        path,
                        committed: false,
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Stage `data` in one go
    pub fn with_contents(temp_dir: &Path, data: &[u8]) -> Result<Self, CacheError> {
        let mut staged = Self::create(temp_dir)?;
        staged.file.write_all(data)?;
        Ok(staged)
    }

    /// Stage a copy of a local file
    pub fn copy_of(temp_dir: &Path, source: &Path) -> Result<Self, CacheError> {
        let mut staged = Self::create(temp_dir)?;
        let mut input = File::open(source)?;
        io::copy(&mut input, &mut staged.file)?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Stamp attributes and atomically move the file to `final_path`
    pub fn commit(mut self, final_path: &Path, attrs: &EntryAttributes) -> Result<(), CacheError> {
        self.file.flush()?;
        self.file.sync_data()?;
        write_attributes(&self.file, final_path, attrs)?;
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&self.path, final_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
                }
            }
        }
    }
}
