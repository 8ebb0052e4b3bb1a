//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了网络化存储适配器，把存储契约转发到外部Redis服务。
//!
//! 所有操作在传输错误时降级为安全的no-op或不存在结果并记录日志，
//! 绝不向调用方传播错误；只有构造（连接建立）会失败，由组合根
//! 负责透明回退到内存实现。

use super::{now_millis, CacheStore, RateLimitCounter, RateLimitStore};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 建立Redis连接并用PING验证可达性
async fn connect_verified(url: &str, connection_timeout_ms: u64) -> Result<ConnectionManager> {
    let client = Client::open(url)?;
    let timeout = Duration::from_millis(connection_timeout_ms);

    let manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
        .await
        .map_err(|_| CoreError::Timeout(format!("Redis connect timed out after {:?}", timeout)))??;

    let mut conn = manager.clone();
    tokio::time::timeout(timeout, redis::cmd("PING").query_async::<String>(&mut conn))
        .await
        .map_err(|_| CoreError::Timeout(format!("Redis PING timed out after {:?}", timeout)))??;

    Ok(manager)
}

/// Redis缓存存储适配器
#[derive(Clone)]
pub struct RedisCacheStore {
    manager: ConnectionManager,
}

impl RedisCacheStore {
    /// 连接到Redis并创建缓存存储
    ///
    /// # 参数
    ///
    /// * `url` - 连接字符串
    /// * `connection_timeout_ms` - 连接和验证的超时时间（毫秒）
    ///
    /// # 返回值
    ///
    /// 返回新的存储实例；连接失败时返回错误，调用方应回退到内存实现
    #[instrument(skip(url), level = "info", name = "init_redis_cache_store")]
    pub async fn connect(url: &str, connection_timeout_ms: u64) -> Result<Self> {
        let manager = connect_verified(url, connection_timeout_ms).await?;
        debug!("RedisCacheStore connected");
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    #[instrument(skip(self), level = "debug")]
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Redis GET failed for key {}: {}, treating as miss", key, e);
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!("Redis SET failed for key {}: {}, skipping write", key, e);
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!("Redis DEL failed for key {}: {}", key, e);
        }
        Ok(())
    }

    /// 通过SCAN MATCH遍历并批量删除匹配的键
    #[instrument(skip(self), level = "debug")]
    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        let mut deleted = 0usize;
        let mut cursor = 0i64;

        loop {
            let scan: redis::RedisResult<(i64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await;

            let (next_cursor, keys) = match scan {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Redis SCAN failed for pattern {}: {}", pattern, e);
                    return Ok(deleted);
                }
            };

            if !keys.is_empty() {
                let mut pipe = redis::pipe();
                for key in &keys {
                    pipe.del(key).ignore();
                }
                match pipe.query_async::<()>(&mut conn).await {
                    Ok(_) => deleted += keys.len(),
                    Err(e) => {
                        warn!("Redis pipeline DEL failed for pattern {}: {}", pattern, e);
                        return Ok(deleted);
                    }
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!("Redis delete_pattern: pattern={}, deleted={}", pattern, deleted);
        Ok(deleted)
    }

    #[instrument(skip(self), level = "debug")]
    async fn flush(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        if let Err(e) = redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await {
            warn!("Redis FLUSHDB failed: {}", e);
        }
        Ok(())
    }

    async fn destroy(&self) {
        // 过期由Redis服务端负责，没有需要取消的后台任务
    }
}

/// Redis限流存储适配器
///
/// 计数器使用服务端原子INCR，窗口由PEXPIRE实现；重置时间保存在
/// 伴随键`{key}:reset`中。原子自增是外部服务的属性，不是本层的
#[derive(Clone)]
pub struct RedisRateLimitStore {
    manager: ConnectionManager,
}

impl RedisRateLimitStore {
    /// 连接到Redis并创建限流存储
    #[instrument(skip(url), level = "info", name = "init_redis_rate_limit_store")]
    pub async fn connect(url: &str, connection_timeout_ms: u64) -> Result<Self> {
        let manager = connect_verified(url, connection_timeout_ms).await?;
        debug!("RedisRateLimitStore connected");
        Ok(Self { manager })
    }

    #[inline]
    fn reset_key(key: &str) -> String {
        format!("{}:reset", key)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    #[instrument(skip(self), level = "debug")]
    async fn increment(&self, key: &str, window_ms: u64) -> Result<RateLimitCounter> {
        // INCR后首次计数建立窗口：计数键和重置时间键同时获得窗口长度的过期
        let script = redis::Script::new(
            r#"
            local count = redis.call('INCR', KEYS[1])
            if count == 1 then
                redis.call('PEXPIRE', KEYS[1], ARGV[1])
                redis.call('SET', KEYS[2], ARGV[2], 'PX', ARGV[1])
            end
            local reset = redis.call('GET', KEYS[2])
            if not reset then
                reset = ARGV[2]
                redis.call('SET', KEYS[2], reset, 'PX', ARGV[1])
            end
            return {count, reset}
            "#,
        );

        let now = now_millis();
        let fallback_reset = now + window_ms;
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<(u64, String)> = script
            .key(key)
            .key(Self::reset_key(key))
            .arg(window_ms)
            .arg(fallback_reset)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok((count, reset)) => Ok(RateLimitCounter {
                count,
                reset_time: reset.parse().unwrap_or(fallback_reset),
            }),
            Err(e) => {
                // 失败开放：限流基础设施故障不能阻止业务请求
                warn!("Redis INCR failed for key {}: {}, failing open", key, e);
                Ok(RateLimitCounter {
                    count: 1,
                    reset_time: fallback_reset,
                })
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn decrement(&self, key: &str) -> Result<()> {
        let script = redis::Script::new(
            r#"
            local current = redis.call('GET', KEYS[1])
            if current and tonumber(current) > 0 then
                redis.call('DECR', KEYS[1])
            end
            return 1
            "#,
        );

        let mut conn = self.manager.clone();
        let result: redis::RedisResult<i32> = script.key(key).invoke_async(&mut conn).await;
        if let Err(e) = result {
            warn!("Redis DECR failed for key {}: {}", key, e);
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = redis::pipe()
            .del(key)
            .del(Self::reset_key(key))
            .query_async(&mut conn)
            .await;
        if let Err(e) = result {
            warn!("Redis reset failed for key {}: {}", key, e);
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<RateLimitCounter>> {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<(Option<u64>, Option<String>)> = redis::pipe()
            .get(key)
            .get(Self::reset_key(key))
            .query_async(&mut conn)
            .await;

        match result {
            Ok((Some(count), Some(reset))) => {
                let reset_time = match reset.parse() {
                    Ok(t) => t,
                    Err(_) => return Ok(None),
                };
                Ok(Some(RateLimitCounter { count, reset_time }))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("Redis GET failed for key {}: {}, treating as absent", key, e);
                Ok(None)
            }
        }
    }

    async fn destroy(&self) {
        // 计数器由Redis服务端过期，没有后台任务
    }
}
