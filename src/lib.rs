// Multistore Library
// Unified storage access with a shared local disk cache

pub mod cache;
pub mod config;
pub mod constants;
pub mod logging;
pub mod storage;
