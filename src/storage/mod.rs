// Storage module
//
// Storage operations layered over the disk cache. Cloud provider adapters
// implement `StorageBackend`; `MemoryBackend` is the in-process reference.

pub mod backend;
pub mod client;
pub mod error;
pub mod memory;

pub use backend::{ByteRange, ObjectMetadata, StorageBackend};
pub use client::CachedStorage;
pub use error::StorageError;
pub use memory::MemoryBackend;
