//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 内存存储集成测试：过期语义、模式删除与生命周期

#[path = "../common/mod.rs"]
mod common;

use oxstate::store::memory::{MemoryCacheStore, MemoryRateLimitStore};
use oxstate::store::{CacheStore, RateLimitStore};
use std::time::Duration;
use tokio::time::sleep;

/// 惰性过期与主动清理对同一个键给出一致的答案
#[tokio::test]
async fn test_lazy_and_active_expiry_agree() {
    common::setup_logging();
    let store = MemoryCacheStore::with_sweep_interval(Duration::from_millis(200));

    store.set_raw("read-path", b"a".to_vec(), 1).await.unwrap();
    store.set_raw("sweep-path", b"b".to_vec(), 1).await.unwrap();

    sleep(Duration::from_millis(1100)).await;
    // 读取路径：惰性过期
    assert_eq!(store.get_raw("read-path").await.unwrap(), None);
    // 清理路径：等sweep跑过之后条目被物理移除
    sleep(Duration::from_millis(500)).await;
    assert!(store.is_empty());
    store.destroy().await;
}

/// destroy取消清理任务并清空条目
#[tokio::test]
async fn test_destroy_cancels_sweep() {
    common::setup_logging();
    let store = MemoryCacheStore::with_sweep_interval(Duration::from_millis(100));
    store.set_raw("k", b"v".to_vec(), 60).await.unwrap();

    store.destroy().await;
    assert!(store.is_empty());
    // destroy之后写入仍然可用，但不再有后台清理
    store.set_raw("after", b"v".to_vec(), 60).await.unwrap();
    assert_eq!(store.get_raw("after").await.unwrap(), Some(b"v".to_vec()));
}

/// 模式删除把`*`当作任意长度通配符，按字面匹配其余字符
#[tokio::test]
async fn test_delete_pattern_glob_semantics() {
    common::setup_logging();
    let store = MemoryCacheStore::new();
    for key in ["order:1", "order:2:items", "order-archive:1", "user:9"] {
        store.set_raw(key, b"v".to_vec(), 60).await.unwrap();
    }

    let deleted = store.delete_pattern("order:*").await.unwrap();
    assert_eq!(deleted, 2);
    assert!(store.get_raw("order-archive:1").await.unwrap().is_some());
    assert!(store.get_raw("user:9").await.unwrap().is_some());
    store.destroy().await;
}

/// 限流计数器被后台清理在窗口过期后移除
#[tokio::test]
async fn test_rate_limit_sweep_removes_expired_counters() {
    common::setup_logging();
    let store = MemoryRateLimitStore::with_sweep_interval(Duration::from_millis(100));
    store.increment("stale", 200).await.unwrap();

    sleep(Duration::from_millis(600)).await;
    assert_eq!(store.get("stale").await.unwrap(), None);
    store.destroy().await;
}

/// increment对全新的键返回连贯的{count, reset_time}
#[tokio::test]
async fn test_increment_fresh_key_is_coherent() {
    common::setup_logging();
    let store = MemoryRateLimitStore::new();
    let counter = store.increment("fresh", 60_000).await.unwrap();
    assert_eq!(counter.count, 1);
    assert!(counter.reset_time > 0);
    store.destroy().await;
}
