//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 组合根集成测试：配置驱动的存储选择与回退

#[path = "../common/mod.rs"]
mod common;

use oxstate::cache::CacheOptions;
use oxstate::config::{Config, RedisConfig};
use oxstate::StateManager;
use serial_test::serial;
use std::collections::HashMap;

/// 没有连接字符串时使用内存存储，服务照常工作
#[tokio::test]
#[serial]
async fn test_memory_fallback_without_connection_string() {
    common::setup_logging();
    std::env::remove_var(oxstate::config::REDIS_URL_ENV);

    let manager = StateManager::init(Config::default()).await.expect("init failed");
    let cache = manager.cache_service();

    cache.set("k", &42u64, &CacheOptions::default()).await;
    let value: Option<u64> = cache.get("k").await;
    assert_eq!(value, Some(42));
    manager.shutdown().await.expect("shutdown failed");
}

/// 连接字符串指向不可达地址时静默回退到内存存储，初始化不失败
#[tokio::test]
#[serial]
async fn test_silent_fallback_on_unreachable_redis() {
    common::setup_logging();
    std::env::remove_var(oxstate::config::REDIS_URL_ENV);

    let config = Config {
        redis: Some(RedisConfig {
            connection_string: "redis://10.255.255.1:6379".to_string().into(),
            connection_timeout_ms: 300,
        }),
        ..Default::default()
    };

    let manager = StateManager::init(config).await.expect("init must not fail");
    let cache = manager.cache_service();
    cache.set("k", &"still works".to_string(), &CacheOptions::default()).await;
    let value: Option<String> = cache.get("k").await;
    assert_eq!(value, Some("still works".to_string()));
    manager.shutdown().await.expect("shutdown failed");
}

/// 非法配置在初始化时被拒绝
#[tokio::test]
#[serial]
async fn test_invalid_config_rejected() {
    common::setup_logging();
    let mut config = Config::default();
    config.cache.default_ttl = 0;
    assert!(StateManager::init(config).await.is_err());
}

/// 管理器装配的限流器与缓存服务共享配置默认值
#[tokio::test]
#[serial]
async fn test_manager_wires_configured_defaults() {
    common::setup_logging();
    std::env::remove_var(oxstate::config::REDIS_URL_ENV);

    let config = Config::from_toml_str(
        r#"
        [cache]
        namespace = "shop"
        default_ttl = 120

        [rate_limit]
        window_ms = 60000
        max = 2
        "#,
    )
    .expect("parse failed");

    let manager = StateManager::init(config).await.expect("init failed");
    let cache = manager.cache_service();
    assert_eq!(cache.namespace().await, "shop:");
    assert_eq!(cache.default_ttl(), 120);

    let limiter = manager.rate_limiter();
    assert!(limiter.check("c").await.allowed);
    assert!(limiter.check("c").await.allowed);
    assert!(!limiter.check("c").await.allowed);

    // 同一管理器的多个限流器共享存储
    let second = manager.rate_limiter();
    assert!(!second.check("c").await.allowed);
    manager.shutdown().await.expect("shutdown failed");
}

/// 管理器装配的批量加载器使用配置的合并窗口
#[tokio::test]
#[serial]
async fn test_manager_builds_batch_loader() {
    common::setup_logging();
    std::env::remove_var(oxstate::config::REDIS_URL_ENV);

    let manager = StateManager::init(Config::default()).await.expect("init failed");
    let loader = manager.batch_loader(|keys: Vec<u64>| async move {
        Ok(keys.into_iter().map(|k| (k, k * 2)).collect::<HashMap<_, _>>())
    });

    assert_eq!(loader.load(21).await, Some(42));
    manager.shutdown().await.expect("shutdown failed");
}
