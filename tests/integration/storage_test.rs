// Cache-aware storage client tests

use multistore::cache::{
    CacheConfig, EvictionPolicy, EvictionPolicyConfig, SourceVersionCheckMode,
};
use multistore::config::Config;
use multistore::storage::{ByteRange, CachedStorage, MemoryBackend, StorageBackend};
use std::sync::Arc;
use tempfile::TempDir;

const KB: usize = 1024;

fn storage(root: &TempDir, check_source_version: bool) -> CachedStorage<MemoryBackend> {
    let mut config = CacheConfig::new("1M", root.path());
    config.cache_line_size = "16K".to_string();
    config.check_source_version = check_source_version;
    config.eviction_policy = EvictionPolicyConfig::new(EvictionPolicy::NoEviction);
    CachedStorage::with_cache_config(MemoryBackend::new(), "mem", Some(&config)).unwrap()
}

fn object() -> Vec<u8> {
    (0..40 * KB).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_range_reads_are_cached_per_chunk() {
    let root = TempDir::new().unwrap();
    let storage = storage(&root, true);
    let data = object();
    storage.backend().put_object("bucket/big.bin", &data).unwrap();

    let range = ByteRange::new(10 * KB as u64, 20 * KB as u64);
    let read = storage
        .read_range("bucket/big.bin", range, SourceVersionCheckMode::Inherit)
        .unwrap();
    assert_eq!(read.as_ref(), &data[10 * KB..30 * KB]);
    // Chunks 0 and 1
    assert_eq!(storage.backend().data_calls(), 2);

    let again = storage
        .read_range("bucket/big.bin", range, SourceVersionCheckMode::Inherit)
        .unwrap();
    assert_eq!(again, read);
    assert_eq!(storage.backend().data_calls(), 2);

    let cache = storage.cache().unwrap();
    assert!(cache.contains_chunk("bucket/big.bin", 0, None, SourceVersionCheckMode::Disable));
    assert!(cache.contains_chunk("bucket/big.bin", 1, None, SourceVersionCheckMode::Disable));
    assert!(!cache.contains_chunk("bucket/big.bin", 2, None, SourceVersionCheckMode::Disable));
}

#[test]
fn test_range_past_end_is_cut_at_object_size() {
    let root = TempDir::new().unwrap();
    let storage = storage(&root, true);
    let data = object();
    storage.backend().put_object("obj", &data).unwrap();

    let tail = storage
        .read_range(
            "obj",
            ByteRange::new(30 * KB as u64, 100 * KB as u64),
            SourceVersionCheckMode::Inherit,
        )
        .unwrap();
    assert_eq!(tail.as_ref(), &data[30 * KB..]);

    // The short last chunk is served from cache afterwards
    let calls = storage.backend().data_calls();
    let tail_again = storage
        .read_range(
            "obj",
            ByteRange::new(32 * KB as u64, 8 * KB as u64),
            SourceVersionCheckMode::Inherit,
        )
        .unwrap();
    assert_eq!(tail_again.as_ref(), &data[32 * KB..]);
    assert_eq!(storage.backend().data_calls(), calls);
}

#[test]
fn test_unversioned_range_read_skips_remote_when_warm() {
    let root = TempDir::new().unwrap();
    let storage = storage(&root, false);
    let data = object();
    storage.backend().put_object("obj", &data).unwrap();

    let range = ByteRange::new(0, 20 * KB as u64);
    storage
        .read_range("obj", range, SourceVersionCheckMode::Inherit)
        .unwrap();
    storage.backend().reset_counters();

    let read = storage
        .read_range("obj", range, SourceVersionCheckMode::Inherit)
        .unwrap();
    assert_eq!(read.as_ref(), &data[..20 * KB]);
    assert_eq!(storage.backend().metadata_calls(), 0);
    assert_eq!(storage.backend().data_calls(), 0);
}

#[test]
fn test_unversioned_tail_read_skips_remote_when_warm() {
    let root = TempDir::new().unwrap();
    let storage = storage(&root, false);
    let data = object();
    storage.backend().put_object("obj", &data).unwrap();

    let range = ByteRange::new(30 * KB as u64, 100 * KB as u64);
    storage
        .read_range("obj", range, SourceVersionCheckMode::Inherit)
        .unwrap();
    storage.backend().reset_counters();

    for _ in 0..3 {
        let read = storage
            .read_range("obj", range, SourceVersionCheckMode::Inherit)
            .unwrap();
        assert_eq!(read.as_ref(), &data[30 * KB..]);
    }
    assert_eq!(storage.backend().metadata_calls(), 0);
    assert_eq!(storage.backend().data_calls(), 0);
}

#[test]
fn test_open_ended_range_reads_to_object_end() {
    let root = TempDir::new().unwrap();
    let storage = storage(&root, false);
    let data = object();
    storage.backend().put_object("obj", &data).unwrap();

    let range = ByteRange::new(2, u64::MAX);
    let cold = storage
        .read_range("obj", range, SourceVersionCheckMode::Inherit)
        .unwrap();
    assert_eq!(cold.as_ref(), &data[2..]);

    storage.backend().reset_counters();
    let warm = storage
        .read_range("obj", range, SourceVersionCheckMode::Inherit)
        .unwrap();
    assert_eq!(warm, cold);
    assert_eq!(storage.backend().metadata_calls(), 0);

    let versioned = TempDir::new().unwrap();
    let checked = self::storage(&versioned, true);
    checked.backend().put_object("obj", &data).unwrap();
    let read = checked
        .read_range("obj", range, SourceVersionCheckMode::Inherit)
        .unwrap();
    assert_eq!(read.as_ref(), &data[2..]);
}

#[test]
fn test_write_invalidates_cached_copy() {
    let root = TempDir::new().unwrap();
    let storage = storage(&root, false);

    storage.write("doc", b"first").unwrap();
    assert_eq!(
        storage.read("doc", SourceVersionCheckMode::Inherit).unwrap().as_ref(),
        b"first"
    );

    storage.write("doc", b"second").unwrap();
    assert_eq!(
        storage.read("doc", SourceVersionCheckMode::Inherit).unwrap().as_ref(),
        b"second"
    );
}

#[test]
fn test_delete_removes_remote_and_cached_object() {
    let root = TempDir::new().unwrap();
    let storage = storage(&root, false);
    storage.write("gone", b"bytes").unwrap();
    storage.read("gone", SourceVersionCheckMode::Inherit).unwrap();

    storage.delete("gone").unwrap();
    assert!(storage
        .read("gone", SourceVersionCheckMode::Inherit)
        .unwrap_err()
        .is_not_found());
    assert!(!storage
        .cache()
        .unwrap()
        .contains("gone", None, SourceVersionCheckMode::Disable));
}

#[test]
fn test_concurrent_readers_fetch_once() {
    let root = TempDir::new().unwrap();
    let storage = Arc::new(storage(&root, false));
    storage.backend().put_object("hot", &object()).unwrap();
    storage.backend().reset_counters();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let storage = storage.clone();
            scope.spawn(move || {
                let data = storage.read("hot", SourceVersionCheckMode::Inherit).unwrap();
                assert_eq!(data.len(), 40 * KB);
            });
        }
    });

    assert_eq!(storage.backend().data_calls(), 1);
}

#[test]
fn test_client_built_from_yaml_config() {
    let root = TempDir::new().unwrap();
    let yaml = format!(
        "profiles:\n  mem: {{}}\ncache:\n  size: 1M\n  cache_line_size: 16K\n  location: {}\n  check_source_version: false\n  eviction_policy:\n    policy: lru\n    refresh_interval: 60\n",
        root.path().display()
    );
    let config = Config::from_yaml_with_env(&yaml).unwrap();
    config.validate().unwrap();

    let cache = config.cache_manager("mem").unwrap();
    assert!(cache.as_ref().unwrap().has_eviction_worker());
    let storage = CachedStorage::new(MemoryBackend::new(), cache);
    storage.write("from/config", b"configured").unwrap();
    assert_eq!(
        storage
            .read("from/config", SourceVersionCheckMode::Inherit)
            .unwrap()
            .as_ref(),
        b"configured"
    );
    assert!(root.path().join("mem/from/config").is_file());
}
