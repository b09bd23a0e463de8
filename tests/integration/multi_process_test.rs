// Cross-process locking tests
//
// The test binary re-runs itself as a child process that holds an entry
// lock and the whole-cache refresh lock until it is done writing.

use multistore::cache::{CacheConfig, CacheManager, EvictionPolicy, EvictionPolicyConfig, FileLock};
use multistore::constants::CACHE_REFRESH_LOCK_FILE;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const CHILD_DIR_ENV: &str = "MULTISTORE_LOCK_HOLDER_DIR";
const CHILD_TEST: &str = "integration::multi_process_test::lock_holder_child";
const KEY: &str = "shared/obj";
const READY: &str = "child-ready";
const DONE: &str = "child-done";

fn instance(root: &Path, policy: EvictionPolicy) -> CacheManager {
    let mut config = CacheConfig::new("8K", root);
    config.cache_line_size = "1K".to_string();
    config.eviction_policy = EvictionPolicyConfig::new(policy);
    CacheManager::new("shared", config).unwrap()
}

fn spawn_lock_holder(root: &Path, markers: &Path) -> Child {
    Command::new(std::env::current_exe().unwrap())
        .args([CHILD_TEST, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_DIR_ENV, format!("{}|{}", root.display(), markers.display()))
        .spawn()
        .unwrap()
}

fn wait_for(path: &Path, child: &mut Child) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !path.exists() {
        if let Some(status) = child.try_wait().unwrap() {
            panic!("lock holder exited early: {}", status);
        }
        assert!(Instant::now() < deadline, "lock holder never became ready");
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Runs only inside the child process started by the tests below
#[test]
fn lock_holder_child() {
    let Ok(dirs) = std::env::var(CHILD_DIR_ENV) else {
        return;
    };
    let (root, markers) = dirs.split_once('|').unwrap();
    let (root, markers) = (PathBuf::from(root), PathBuf::from(markers));

    let cache = instance(&root, EvictionPolicy::NoEviction);
    let entry_guard = cache.acquire_lock(KEY).unwrap();
    let refresh_guard = FileLock::new(root.join(CACHE_REFRESH_LOCK_FILE))
        .acquire()
        .unwrap();
    std::fs::write(markers.join(READY), b"").unwrap();

    std::thread::sleep(Duration::from_millis(500));
    std::fs::write(markers.join(DONE), b"").unwrap();
    drop(refresh_guard);
    drop(entry_guard);
}

#[test]
fn test_locks_exclude_another_process() {
    let root = TempDir::new().unwrap();
    let markers = TempDir::new().unwrap();
    let cache = instance(root.path(), EvictionPolicy::Fifo);
    for i in 0..12 {
        cache
            .set(&format!("k{}", i), &vec![0u8; 1024], Some("v"))
            .unwrap();
    }

    let mut child = spawn_lock_holder(root.path(), markers.path());
    wait_for(&markers.path().join(READY), &mut child);

    // The refresh lock is held elsewhere, so this pass is skipped
    assert!(!cache.force_refresh_cache().unwrap());
    assert_eq!(cache.cache_size(), 12 * 1024);

    // Blocks until the child releases the entry lock
    let guard = cache.acquire_lock(KEY).unwrap();
    assert!(markers.path().join(DONE).exists());
    drop(guard);

    assert!(child.wait().unwrap().success());
    assert!(cache.force_refresh_cache().unwrap());
    assert!(cache.cache_size() <= 8 * 1024);
}

#[test]
fn test_refresh_lock_is_released_when_holder_exits() {
    let root = TempDir::new().unwrap();
    let markers = TempDir::new().unwrap();
    let mut child = spawn_lock_holder(root.path(), markers.path());
    wait_for(&markers.path().join(READY), &mut child);
    assert!(FileLock::new(root.path().join(CACHE_REFRESH_LOCK_FILE))
        .try_acquire()
        .unwrap()
        .is_none());

    assert!(child.wait().unwrap().success());
    assert!(FileLock::new(root.path().join(CACHE_REFRESH_LOCK_FILE))
        .try_acquire()
        .unwrap()
        .is_some());
}
