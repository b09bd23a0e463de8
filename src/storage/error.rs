//! Storage operation errors

use thiserror::Error;

use crate::cache::CacheError;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Object does not exist in the backend
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Backend failure (network, permissions, provider error)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Cache could not be set up
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
