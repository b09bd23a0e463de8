// Async adapter tests

use bytes::Bytes;
use multistore::cache::{
    AsyncCacheManager, ByteRange, CacheConfig, CacheManager, EvictionPolicy,
    EvictionPolicyConfig, ObjectCache, SourceVersionCheckMode,
};
use std::sync::Arc;
use tempfile::TempDir;

fn shared_cache(root: &TempDir, policy: EvictionPolicy) -> Arc<dyn ObjectCache> {
    let mut config = CacheConfig::new("64K", root.path());
    config.cache_line_size = "4K".to_string();
    config.eviction_policy = EvictionPolicyConfig::new(policy);
    Arc::new(AsyncCacheManager::new(
        CacheManager::new("async", config).unwrap(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_share_cache() {
    let root = TempDir::new().unwrap();
    let cache = shared_cache(&root, EvictionPolicy::NoEviction);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            let key = format!("task/{}", i);
            let payload = Bytes::from(format!("payload {}", i));
            cache.put(&key, payload.clone(), Some("v1")).await.unwrap();
            assert_eq!(cache.get(&key, Some("v1")).await, Some(payload));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 16);
    assert_eq!(stats.current_item_count, 16);
}

#[tokio::test]
async fn test_version_mismatch_is_a_miss() {
    let root = TempDir::new().unwrap();
    let cache = shared_cache(&root, EvictionPolicy::NoEviction);

    cache.put("k", Bytes::from_static(b"old"), Some("v1")).await.unwrap();
    assert!(cache.get("k", Some("v2")).await.is_none());
    assert!(cache.contains("k", Some("v1"), SourceVersionCheckMode::Inherit).await);
    assert!(!cache.contains("k", Some("v2"), SourceVersionCheckMode::Inherit).await);
    assert!(cache.contains("k", Some("v2"), SourceVersionCheckMode::Disable).await);
}

#[tokio::test]
async fn test_range_and_delete() {
    let root = TempDir::new().unwrap();
    let cache = shared_cache(&root, EvictionPolicy::NoEviction);

    cache
        .put("obj", Bytes::from_static(b"0123456789"), Some("v"))
        .await
        .unwrap();
    assert_eq!(
        cache.get_range("obj", ByteRange::new(2, 3), Some("v")).await,
        Some(Bytes::from_static(b"234"))
    );

    cache.delete("obj").await.unwrap();
    cache.delete("obj").await.unwrap();
    assert!(cache.get("obj", Some("v")).await.is_none());
}

#[tokio::test]
async fn test_refresh_under_no_eviction_is_a_no_op() {
    let root = TempDir::new().unwrap();
    let cache = shared_cache(&root, EvictionPolicy::NoEviction);
    assert!(!cache.refresh().await.unwrap());
}
