//! Backend contract consumed by the storage layer

use bytes::Bytes;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::StorageError;
pub use crate::cache::ByteRange;

/// Remote object metadata (the answer to a HEAD request)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    pub key: String,
    /// ETag or provider version id
    pub version_tag: Option<String>,
    pub size: u64,
    pub last_modified: SystemTime,
}

impl ObjectMetadata {
    /// Version string cache entries are stamped with
    ///
    /// The ETag when the backend has one, the modification time otherwise.
    pub fn source_version(&self) -> String {
        match &self.version_tag {
            Some(tag) => tag.clone(),
            None => {
                let since_epoch = self
                    .last_modified
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                format!("{}.{:09}", since_epoch.as_secs(), since_epoch.subsec_nanos())
            }
        }
    }
}

/// Object store operations the cache layer relies on
///
/// Implementations handle retries and authentication themselves.
pub trait StorageBackend: Send + Sync {
    fn get_object_metadata(&self, path: &str) -> Result<ObjectMetadata, StorageError>;

    /// Whole object, or only `range` of it
    fn get_object(&self, path: &str, range: Option<ByteRange>) -> Result<Bytes, StorageError>;

    fn put_object(&self, path: &str, data: &[u8]) -> Result<ObjectMetadata, StorageError>;

    fn delete_object(&self, path: &str) -> Result<(), StorageError>;
}
