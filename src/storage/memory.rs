//! In-memory storage backend
//!
//! Reference backend for tests and local experiments. It counts metadata
//! and data requests so callers can verify how often the remote side is hit.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use super::backend::{ByteRange, ObjectMetadata, StorageBackend};
use super::error::StorageError;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: SystemTime,
}

impl StoredObject {
    fn metadata(&self, key: &str) -> ObjectMetadata {
        ObjectMetadata {
            key: key.to_string(),
            version_tag: Some(self.etag.clone()),
            size: self.data.len() as u64,
            last_modified: self.last_modified,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, StoredObject>>,
    metadata_calls: AtomicUsize,
    data_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_object_metadata` calls so far
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_object` calls so far
    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.metadata_calls.store(0, Ordering::SeqCst);
        self.data_calls.store(0, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }
}

impl StorageBackend for MemoryBackend {
    fn get_object_metadata(&self, path: &str) -> Result<ObjectMetadata, StorageError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .get(path)
            .map(|o| o.metadata(path))
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn get_object(&self, path: &str, range: Option<ByteRange>) -> Result<Bytes, StorageError> {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.read();
        let object = objects
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        match range {
            None => Ok(object.data.clone()),
            Some(range) => {
                let range = range.clamp_to(object.data.len() as u64);
                Ok(object
                    .data
                    .slice(range.offset as usize..range.end() as usize))
            }
        }
    }

    fn put_object(&self, path: &str, data: &[u8]) -> Result<ObjectMetadata, StorageError> {
        let object = StoredObject {
            data: Bytes::copy_from_slice(data),
            etag: uuid::Uuid::new_v4().simple().to_string(),
            last_modified: SystemTime::now(),
        };
        let metadata = object.metadata(path);
        self.objects.write().insert(path.to_string(), object);
        Ok(metadata)
    }

    fn delete_object(&self, path: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}
