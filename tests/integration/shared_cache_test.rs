// Shared cache directory tests
//
// Independent CacheManager instances over one location stand in for
// separate processes: they share nothing but the filesystem and its locks.

use multistore::cache::{
    CacheConfig, CacheManager, EvictionPolicy, EvictionPolicyConfig, FileLock, OpenMode,
    SourceVersionCheckMode,
};
use multistore::constants::CACHE_REFRESH_LOCK_FILE;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::TempDir;

fn instance(root: &Path, profile: &str, policy: EvictionPolicy) -> CacheManager {
    let mut config = CacheConfig::new("8K", root);
    config.cache_line_size = "1K".to_string();
    config.eviction_policy = EvictionPolicyConfig::new(policy);
    CacheManager::new(profile, config).unwrap()
}

#[test]
fn test_entries_are_visible_across_instances() {
    let root = TempDir::new().unwrap();
    let writer = instance(root.path(), "shared", EvictionPolicy::NoEviction);
    let reader = instance(root.path(), "shared", EvictionPolicy::NoEviction);

    writer.set("bucket/a.txt", b"from writer", Some("v1")).unwrap();
    assert_eq!(
        reader.read("bucket/a.txt", Some("v1")).unwrap().as_ref(),
        b"from writer"
    );

    reader.delete("bucket/a.txt").unwrap();
    assert!(writer.read("bucket/a.txt", Some("v1")).is_none());
}

#[test]
fn test_profiles_do_not_share_entries() {
    let root = TempDir::new().unwrap();
    let first = instance(root.path(), "first", EvictionPolicy::NoEviction);
    let second = instance(root.path(), "second", EvictionPolicy::NoEviction);

    first.set("same/key", b"one", Some("v")).unwrap();
    assert!(second.read("same/key", Some("v")).is_none());
    assert!(root.path().join("first/same/key").is_file());
}

#[test]
fn test_entry_lock_excludes_other_instances() {
    let root = TempDir::new().unwrap();
    let first = instance(root.path(), "shared", EvictionPolicy::NoEviction);
    let second = instance(root.path(), "shared", EvictionPolicy::NoEviction);

    let guard = first.acquire_lock("bucket/locked").unwrap();
    let lock_path = guard.path().to_path_buf();
    assert!(FileLock::new(&lock_path).try_acquire().unwrap().is_none());
    drop(guard);

    let again = second.acquire_lock("bucket/locked").unwrap();
    assert_eq!(again.path(), lock_path);
}

#[test]
fn test_refresh_lock_held_by_other_instance_skips_pass() {
    let root = TempDir::new().unwrap();
    let cache = instance(root.path(), "shared", EvictionPolicy::Fifo);
    for i in 0..12 {
        cache
            .set(&format!("k{}", i), &vec![0u8; 1024], Some("v"))
            .unwrap();
    }

    let held = FileLock::new(root.path().join(CACHE_REFRESH_LOCK_FILE))
        .acquire()
        .unwrap();
    assert!(!cache.force_refresh_cache().unwrap());
    assert_eq!(cache.cache_size(), 12 * 1024);

    drop(held);
    assert!(cache.force_refresh_cache().unwrap());
    assert!(cache.cache_size() <= 8 * 1024);
}

#[test]
fn test_writer_handle_publishes_on_commit() {
    let root = TempDir::new().unwrap();
    let writer = instance(root.path(), "shared", EvictionPolicy::NoEviction);
    let reader = instance(root.path(), "shared", EvictionPolicy::NoEviction);

    let mut handle = writer.open("bucket/streamed", OpenMode::Write).unwrap().unwrap();
    handle.write_all(b"part one, ").unwrap();
    handle.write_all(b"part two").unwrap();
    assert!(reader.open("bucket/streamed", OpenMode::Read).unwrap().is_none());

    handle.commit(Some("etag-s")).unwrap();

    let mut contents = String::new();
    reader
        .open("bucket/streamed", OpenMode::Read)
        .unwrap()
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(contents, "part one, part two");
    assert!(reader.contains("bucket/streamed", Some("etag-s"), SourceVersionCheckMode::Enable));
    assert!(!reader.contains("bucket/streamed", Some("etag-t"), SourceVersionCheckMode::Enable));
}
