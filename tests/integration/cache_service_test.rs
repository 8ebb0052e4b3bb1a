//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 缓存服务集成测试

#[path = "../common/mod.rs"]
mod common;

use oxstate::cache::{CacheOptions, CacheService};
use oxstate::store::memory::MemoryCacheStore;
use oxstate::store::CacheStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Product {
    id: u64,
    name: String,
    price_cents: u64,
}

fn sample_product() -> Product {
    Product {
        id: 1,
        name: "mechanical keyboard".to_string(),
        price_cents: 12999,
    }
}

fn service() -> (Arc<MemoryCacheStore>, CacheService) {
    common::setup_logging();
    let store = Arc::new(MemoryCacheStore::new());
    let service = CacheService::new(store.clone(), "app", 3600);
    (store, service)
}

/// set后立即get返回深度相等的值
#[tokio::test]
async fn test_set_then_get_round_trip() {
    let (store, service) = service();
    let product = sample_product();

    service.set("product:1", &product, &CacheOptions::default()).await;
    let cached: Option<Product> = service.get("product:1").await;
    assert_eq!(cached, Some(product));
    store.destroy().await;
}

/// 命名空间被规范化并作为键前缀写入存储
#[tokio::test]
async fn test_namespace_prefixes_keys() {
    let (store, service) = service();
    service.set("k", &42u64, &CacheOptions::default()).await;

    assert!(store.get_raw("app:k").await.unwrap().is_some());
    assert!(store.get_raw("k").await.unwrap().is_none());
    store.destroy().await;
}

/// TTL为1秒的条目在1.5秒后读取为None
#[tokio::test]
async fn test_ttl_expiry_observed() {
    let (store, service) = service();
    service
        .set(
            "ephemeral",
            &"soon gone".to_string(),
            &CacheOptions {
                ttl: Some(1),
                namespace: None,
            },
        )
        .await;

    sleep(Duration::from_millis(1500)).await;
    let value: Option<String> = service.get("ephemeral").await;
    assert_eq!(value, None);
    store.destroy().await;
}

/// 连续两次getOrSet只执行一次工厂
#[tokio::test]
async fn test_get_or_set_memoizes() {
    let (store, service) = service();
    let factory_calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = factory_calls.clone();
        let value: Product = service
            .get_or_set(
                "product:7",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(sample_product())
                },
                &CacheOptions::default(),
            )
            .await
            .expect("get_or_set failed");
        assert_eq!(value, sample_product());
    }

    assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
    store.destroy().await;
}

/// 工厂错误向上传播且不产生缓存写入
#[tokio::test]
async fn test_get_or_set_propagates_factory_error() {
    let (store, service) = service();

    let result: oxstate::Result<Product> = service
        .get_or_set(
            "broken",
            || async {
                Err(oxstate::CoreError::Backend(
                    "database unavailable".to_string(),
                ))
            },
            &CacheOptions::default(),
        )
        .await;

    assert!(result.is_err());
    let cached: Option<Product> = service.get("broken").await;
    assert_eq!(cached, None);
    store.destroy().await;
}

/// 模式失效只删除匹配的命名空间键
#[tokio::test]
async fn test_invalidate_pattern_scopes_to_matches() {
    let (store, service) = service();
    service.set("product:1", &1u64, &CacheOptions::default()).await;
    service.set("product:2", &2u64, &CacheOptions::default()).await;
    service.set("user:1", &3u64, &CacheOptions::default()).await;

    let deleted = service.invalidate_pattern("product:*").await;
    assert_eq!(deleted, 2);

    let p1: Option<u64> = service.get("product:1").await;
    let p2: Option<u64> = service.get("product:2").await;
    let u1: Option<u64> = service.get("user:1").await;
    assert_eq!(p1, None);
    assert_eq!(p2, None);
    assert_eq!(u1, Some(3));
    store.destroy().await;
}

/// 多键失效并发执行且全部生效
#[tokio::test]
async fn test_invalidate_many() {
    let (store, service) = service();
    service.set("a", &1u64, &CacheOptions::default()).await;
    service.set("b", &2u64, &CacheOptions::default()).await;
    service.set("c", &3u64, &CacheOptions::default()).await;

    service.invalidate_many(&["a", "b"]).await;

    let a: Option<u64> = service.get("a").await;
    let b: Option<u64> = service.get("b").await;
    let c: Option<u64> = service.get("c").await;
    assert_eq!(a, None);
    assert_eq!(b, None);
    assert_eq!(c, Some(3));
    store.destroy().await;
}

/// flush清空整个底层存储，包括其他命名空间的键
#[tokio::test]
async fn test_flush_is_global() {
    let (store, service) = service();
    service.set("mine", &1u64, &CacheOptions::default()).await;
    store
        .set_raw("other-namespace:key", b"raw".to_vec(), 60)
        .await
        .unwrap();

    service.flush().await;

    let mine: Option<u64> = service.get("mine").await;
    assert_eq!(mine, None);
    assert!(store.get_raw("other-namespace:key").await.unwrap().is_none());
    store.destroy().await;
}

/// 运行时修改命名空间和默认TTL对后续调用生效
#[tokio::test]
async fn test_runtime_reconfiguration() {
    let (store, service) = service();

    service.set_namespace("shop").await;
    assert_eq!(service.namespace().await, "shop:");
    service.set("k", &1u64, &CacheOptions::default()).await;
    assert!(store.get_raw("shop:k").await.unwrap().is_some());

    service.set_default_ttl(1);
    assert_eq!(service.default_ttl(), 1);
    service.set("short", &2u64, &CacheOptions::default()).await;
    sleep(Duration::from_millis(1500)).await;
    let short: Option<u64> = service.get("short").await;
    assert_eq!(short, None);
    store.destroy().await;
}

/// 反序列化失败按未命中处理而不是报错
#[tokio::test]
async fn test_corrupt_entry_reads_as_miss() {
    let (store, service) = service();
    store
        .set_raw("app:corrupt", b"definitely not json".to_vec(), 60)
        .await
        .unwrap();

    let value: Option<Product> = service.get("corrupt").await;
    assert_eq!(value, None);
    store.destroy().await;
}

/// 每次调用的命名空间覆盖写到对应前缀下
#[tokio::test]
async fn test_per_call_namespace_override() {
    let (store, service) = service();
    service
        .set(
            "k",
            &9u64,
            &CacheOptions {
                ttl: None,
                namespace: Some("session".to_string()),
            },
        )
        .await;

    assert!(store.get_raw("session:k").await.unwrap().is_some());
    assert!(store.get_raw("app:k").await.unwrap().is_none());
    store.destroy().await;
}
