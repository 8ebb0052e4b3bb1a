//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存服务，在存储契约之上提供命名空间、序列化、
//! TTL默认值、getOrSet记忆化以及单键/多键/模式失效。
//!
//! 本层是显式失败开放的：缓存基础设施的任何故障都不能阻止调用方
//! 的业务操作，最坏情况是损失一次缓存命中。

use crate::error::Result;
use crate::serialization::{Serializer, SerializerEnum};
use crate::store::CacheStore;
use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// 单次缓存操作的选项
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// 过期时间（秒），None时使用服务默认值
    pub ttl: Option<u64>,
    /// 命名空间覆盖，None时使用服务命名空间
    pub namespace: Option<String>,
}

/// 规范化命名空间，保证以`:`结尾
fn normalize_namespace(ns: &str) -> String {
    if ns.ends_with(':') {
        ns.to_string()
    } else {
        format!("{}:", ns)
    }
}

/// 缓存服务
///
/// 除命名空间和默认TTL外不持有任何可变状态，所有条目都委托给
/// 注入的存储实现
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    serializer: SerializerEnum,
    namespace: RwLock<String>,
    default_ttl: AtomicU64,
}

impl CacheService {
    /// 创建新的缓存服务
    ///
    /// # 参数
    ///
    /// * `store` - 注入的存储实现
    /// * `namespace` - 键命名空间前缀
    /// * `default_ttl` - 默认过期时间（秒）
    pub fn new(store: Arc<dyn CacheStore>, namespace: &str, default_ttl: u64) -> Self {
        Self {
            store,
            serializer: SerializerEnum::default(),
            namespace: RwLock::new(normalize_namespace(namespace)),
            default_ttl: AtomicU64::new(default_ttl),
        }
    }

    /// 创建使用指定序列化器的缓存服务
    pub fn with_serializer(
        store: Arc<dyn CacheStore>,
        namespace: &str,
        default_ttl: u64,
        serializer: SerializerEnum,
    ) -> Self {
        Self {
            store,
            serializer,
            namespace: RwLock::new(normalize_namespace(namespace)),
            default_ttl: AtomicU64::new(default_ttl),
        }
    }

    /// 当前命名空间
    pub async fn namespace(&self) -> String {
        self.namespace.read().await.clone()
    }

    /// 当前默认TTL（秒）
    pub fn default_ttl(&self) -> u64 {
        self.default_ttl.load(Ordering::Relaxed)
    }

    /// 拼接命名空间后的完整键
    async fn full_key(&self, key: &str, ns_override: Option<&str>) -> String {
        match ns_override {
            Some(ns) => format!("{}{}", normalize_namespace(ns), key),
            None => format!("{}{}", self.namespace.read().await, key),
        }
    }

    /// 获取缓存值
    ///
    /// 反序列化失败或存储错误被记录并当作未命中处理（失败开放读取）
    #[instrument(skip(self), level = "debug")]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with_options(key, &CacheOptions::default()).await
    }

    async fn get_with_options<T: DeserializeOwned>(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> Option<T> {
        let full_key = self.full_key(key, options.namespace.as_deref()).await;
        match self.store.get_raw(&full_key).await {
            Ok(Some(bytes)) => match self.serializer.deserialize(&bytes) {
                Ok(value) => {
                    debug!("Cache hit: key={}", full_key);
                    Some(value)
                }
                Err(e) => {
                    warn!("Cache deserialization failed for key {}: {}, treating as miss", full_key, e);
                    None
                }
            },
            Ok(None) => {
                debug!("Cache miss: key={}", full_key);
                None
            }
            Err(e) => {
                warn!("Cache read failed for key {}: {}, treating as miss", full_key, e);
                None
            }
        }
    }

    /// 设置缓存值
    ///
    /// 序列化失败或存储错误被记录后静默返回；缓存写入失败绝不使
    /// 调用方的业务操作失败（失败开放写入）
    #[instrument(skip(self, value), level = "debug")]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, options: &CacheOptions) {
        let full_key = self.full_key(key, options.namespace.as_deref()).await;
        let bytes = match self.serializer.serialize(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cache serialization failed for key {}: {}, skipping write", full_key, e);
                return;
            }
        };

        let ttl = options.ttl.unwrap_or_else(|| self.default_ttl());
        if let Err(e) = self.store.set_raw(&full_key, bytes, ttl).await {
            warn!("Cache write failed for key {}: {}, skipping", full_key, e);
        }
    }

    /// 读取缓存，未命中时调用工厂并写回
    ///
    /// 工厂在本次调用内至多执行一次，成功结果在返回前写入缓存。
    /// 注意没有跨调用方的互斥：两个并发调用方同时未命中时都会
    /// 执行工厂，记忆化是尽力而为的。工厂错误属于调用方的业务
    /// 错误，原样向上传播
    #[instrument(skip(self, factory), level = "debug")]
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        factory: F,
        options: &CacheOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(cached) = self.get_with_options(key, options).await {
            return Ok(cached);
        }

        let value = factory().await?;
        self.set(key, &value, options).await;
        Ok(value)
    }

    /// 使单个键失效
    #[instrument(skip(self), level = "debug")]
    pub async fn invalidate(&self, key: &str) {
        let full_key = self.full_key(key, None).await;
        if let Err(e) = self.store.delete(&full_key).await {
            warn!("Cache invalidate failed for key {}: {}", full_key, e);
        }
    }

    /// 并发地使多个键失效，单个失败被记录并吞掉
    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    pub async fn invalidate_many(&self, keys: &[&str]) {
        let namespace = self.namespace.read().await.clone();
        let deletes = keys.iter().map(|key| {
            let full_key = format!("{}{}", namespace, key);
            let store = self.store.clone();
            async move {
                if let Err(e) = store.delete(&full_key).await {
                    warn!("Cache invalidate failed for key {}: {}", full_key, e);
                }
            }
        });
        join_all(deletes).await;
    }

    /// 使所有匹配glob模式的命名空间键失效
    ///
    /// # 返回值
    ///
    /// 返回被删除的键数量
    #[instrument(skip(self), level = "debug")]
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let full_pattern = self.full_key(pattern, None).await;
        match self.store.delete_pattern(&full_pattern).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Cache pattern invalidation failed for {}: {}", full_pattern, e);
                0
            }
        }
    }

    /// 清空整个底层存储
    ///
    /// 注意：这不限于本服务的命名空间；存储被多个服务共享时
    /// 这是全局操作
    #[instrument(skip(self), level = "debug")]
    pub async fn flush(&self) {
        if let Err(e) = self.store.flush().await {
            warn!("Cache flush failed: {}", e);
        }
    }

    /// 修改后续调用的默认TTL
    pub fn set_default_ttl(&self, ttl_secs: u64) {
        self.default_ttl.store(ttl_secs, Ordering::Relaxed);
    }

    /// 修改后续调用的命名空间
    pub async fn set_namespace(&self, namespace: &str) {
        *self.namespace.write().await = normalize_namespace(namespace);
    }
}
