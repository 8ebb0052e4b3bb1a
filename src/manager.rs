//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态协调层的组合根，负责构造存储并装配服务。
//!
//! 管理器是显式持有的值而不是全局单例；存储的生命周期（后台
//! 清理任务、`destroy`）由持有管理器的一方负责。

use crate::batch::{BatchExecuteOptions, BatchLoader};
use crate::cache::CacheService;
use crate::config::Config;
use crate::error::Result;
use crate::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::store::memory::{MemoryCacheStore, MemoryRateLimitStore};
use crate::store::redis::{RedisCacheStore, RedisRateLimitStore};
use crate::store::{CacheStore, RateLimitStore};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// 状态协调层管理器
///
/// 根据配置选择后端：配置了可达的Redis时使用网络化存储，否则
/// 静默回退到进程内存储。缓存服务和限流器不需要知道它们持有的
/// 具体存储
pub struct StateManager {
    cache_store: Arc<dyn CacheStore>,
    rate_limit_store: Arc<dyn RateLimitStore>,
    config: Config,
}

impl StateManager {
    /// 按配置初始化管理器
    ///
    /// Redis连接字符串缺失或连接失败都不是启动失败：记录后回退
    /// 到内存实现
    ///
    /// # 参数
    ///
    /// * `config` - 顶层配置
    #[instrument(skip(config), level = "info")]
    pub async fn init(config: Config) -> Result<Self> {
        config.validate()?;

        let sweep = Duration::from_secs(config.cache.sweep_interval_secs);
        let (cache_store, rate_limit_store) = match config.redis_url() {
            Some(url) => Self::connect_redis(&url, &config, sweep).await,
            None => {
                info!("No Redis connection string configured, using memory stores");
                Self::memory_stores(sweep)
            }
        };

        Ok(Self {
            cache_store,
            rate_limit_store,
            config,
        })
    }

    /// 无配置的便捷构造：全部使用内存存储
    pub fn in_memory() -> Self {
        let config = Config::default();
        let sweep = Duration::from_secs(config.cache.sweep_interval_secs);
        let (cache_store, rate_limit_store) = Self::memory_stores(sweep);
        Self {
            cache_store,
            rate_limit_store,
            config,
        }
    }

    fn memory_stores(sweep: Duration) -> (Arc<dyn CacheStore>, Arc<dyn RateLimitStore>) {
        (
            Arc::new(MemoryCacheStore::with_sweep_interval(sweep)),
            Arc::new(MemoryRateLimitStore::with_sweep_interval(sweep)),
        )
    }

    async fn connect_redis(
        url: &str,
        config: &Config,
        sweep: Duration,
    ) -> (Arc<dyn CacheStore>, Arc<dyn RateLimitStore>) {
        let timeout_ms = config
            .redis
            .as_ref()
            .map(|r| r.connection_timeout_ms)
            .unwrap_or(5000);

        let cache = RedisCacheStore::connect(url, timeout_ms).await;
        let rate = RedisRateLimitStore::connect(url, timeout_ms).await;
        match (cache, rate) {
            (Ok(cache), Ok(rate)) => {
                info!("Using Redis stores");
                (Arc::new(cache), Arc::new(rate))
            }
            (cache, rate) => {
                let e = cache
                    .err()
                    .map(|e| e.to_string())
                    .or_else(|| rate.err().map(|e| e.to_string()))
                    .unwrap_or_default();
                warn!("Redis unavailable ({}), falling back to memory stores", e);
                Self::memory_stores(sweep)
            }
        }
    }

    /// 构造缓存服务，使用配置中的命名空间和默认TTL
    pub fn cache_service(&self) -> CacheService {
        CacheService::new(
            self.cache_store.clone(),
            &self.config.cache.namespace,
            self.config.cache.default_ttl,
        )
    }

    /// 构造使用配置默认参数的限流器
    pub fn rate_limiter(&self) -> RateLimiter {
        self.rate_limiter_with(self.config.rate_limit.clone())
    }

    /// 构造使用指定参数的限流器，与其他限流器共享同一个存储
    pub fn rate_limiter_with(&self, config: RateLimiterConfig) -> RateLimiter {
        RateLimiter::new(self.rate_limit_store.clone(), config)
    }

    /// 构造批量加载器，使用配置中的合并窗口
    pub fn batch_loader<K, V, F, Fut>(&self, batch_fn: F) -> BatchLoader<K, V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<K, V>>> + Send + 'static,
    {
        BatchLoader::with_delay(
            batch_fn,
            Duration::from_millis(self.config.batch.batch_delay_ms),
        )
    }

    /// 配置中的批量执行选项
    pub fn batch_execute_options(&self) -> BatchExecuteOptions {
        BatchExecuteOptions {
            batch_size: self.config.batch.batch_size,
            concurrency: self.config.batch.concurrency,
        }
    }

    /// 直接访问缓存存储（用于插入自定义服务）
    pub fn cache_store(&self) -> Arc<dyn CacheStore> {
        self.cache_store.clone()
    }

    /// 直接访问限流存储
    pub fn rate_limit_store(&self) -> Arc<dyn RateLimitStore> {
        self.rate_limit_store.clone()
    }

    /// 优雅关闭
    ///
    /// 销毁管理器构造的所有存储，取消它们的后台清理任务
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<()> {
        self.cache_store.destroy().await;
        self.rate_limit_store.destroy().await;
        info!("StateManager shut down");
        Ok(())
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
