//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内存储实现，作为默认的后端引擎。
//!
//! 读取路径执行惰性过期：即使后台清理尚未运行，过期条目的读取
//! 也与不存在的键行为一致。后台清理按固定周期主动驱逐过期条目，
//! 约束只写不读的键造成的内存增长。

use super::{now_millis, CacheStore, RateLimitCounter, RateLimitStore};
use crate::error::Result;
use crate::utils::glob_to_regex;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// 默认清理周期
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// 缓存条目
///
/// 由创建它的存储实例独占持有
#[derive(Debug, Clone)]
struct CacheEntry {
    /// 序列化后的值
    value: Vec<u8>,
    /// 绝对过期时间（epoch毫秒）
    expires_at: u64,
}

impl CacheEntry {
    #[inline]
    fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// 内存缓存存储
///
/// 基于DashMap的进程内实现，每个条目记录绝对过期时间
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, CacheEntry>>,
    cancel: CancellationToken,
}

impl MemoryCacheStore {
    /// 创建新的内存缓存存储，使用默认清理周期（60秒）
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// 创建新的内存缓存存储并指定清理周期
    ///
    /// # 参数
    ///
    /// * `interval` - 后台清理周期
    pub fn with_sweep_interval(interval: Duration) -> Self {
        let entries: Arc<DashMap<String, CacheEntry>> = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        let sweep_entries = entries.clone();
        let sweep_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // 首次tick立即返回，跳过
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = now_millis();
                        let before = sweep_entries.len();
                        sweep_entries.retain(|_, entry| !entry.is_expired(now));
                        let evicted = before.saturating_sub(sweep_entries.len());
                        if evicted > 0 {
                            debug!("Memory cache sweep evicted {} expired entries", evicted);
                        }
                    }
                    _ = sweep_cancel.cancelled() => {
                        debug!("Memory cache sweep task cancelled");
                        break;
                    }
                }
            }
        });

        Self { entries, cancel }
    }

    /// 当前存活条目数（含尚未被清理的过期条目）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 存储是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    #[instrument(skip(self), level = "debug")]
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = now_millis();
        // 惰性过期：条目已过期时移除并视为不存在
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(key);
                debug!("Memory get: key={}, expired=true, removed", key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let expires_at = now_millis() + ttl_secs * 1000;
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    /// 模式删除需要线性扫描全部存活键，非索引操作
    #[instrument(skip(self), level = "debug")]
    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let matcher = glob_to_regex(pattern)?;
        let matched: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let count = matched.len();
        for key in matched {
            self.entries.remove(&key);
        }
        debug!("Memory delete_pattern: pattern={}, deleted={}", pattern, count);
        Ok(count)
    }

    #[instrument(skip(self), level = "debug")]
    async fn flush(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }

    async fn destroy(&self) {
        self.cancel.cancel();
        self.entries.clear();
    }
}

/// 内存限流存储
///
/// 每个键维护一个固定窗口计数器；后台清理移除窗口已过期的计数器
pub struct MemoryRateLimitStore {
    counters: Arc<DashMap<String, RateLimitCounter>>,
    cancel: CancellationToken,
}

impl MemoryRateLimitStore {
    /// 创建新的内存限流存储，使用默认清理周期（60秒）
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// 创建新的内存限流存储并指定清理周期
    pub fn with_sweep_interval(interval: Duration) -> Self {
        let counters: Arc<DashMap<String, RateLimitCounter>> = Arc::new(DashMap::new());
        let cancel = CancellationToken::new();

        let sweep_counters = counters.clone();
        let sweep_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = now_millis();
                        let before = sweep_counters.len();
                        sweep_counters.retain(|_, counter| now <= counter.reset_time);
                        let evicted = before.saturating_sub(sweep_counters.len());
                        if evicted > 0 {
                            debug!("Rate limit sweep evicted {} expired counters", evicted);
                        }
                    }
                    _ = sweep_cancel.cancelled() => {
                        debug!("Rate limit sweep task cancelled");
                        break;
                    }
                }
            }
        });

        Self { counters, cancel }
    }
}

impl Default for MemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    #[instrument(skip(self), level = "debug")]
    async fn increment(&self, key: &str, window_ms: u64) -> Result<RateLimitCounter> {
        let now = now_millis();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| RateLimitCounter {
                count: 0,
                reset_time: now + window_ms,
            });

        if now > entry.reset_time {
            // 窗口滚动：边界由滚动后的首次自增建立
            entry.count = 1;
            entry.reset_time = now + window_ms;
        } else {
            entry.count += 1;
        }
        Ok(entry.clone())
    }

    #[instrument(skip(self), level = "debug")]
    async fn decrement(&self, key: &str) -> Result<()> {
        if let Some(mut entry) = self.counters.get_mut(key) {
            if entry.count > 0 {
                entry.count -= 1;
            }
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn reset(&self, key: &str) -> Result<()> {
        self.counters.remove(key);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<RateLimitCounter>> {
        let now = now_millis();
        match self.counters.get(key) {
            Some(entry) if now <= entry.reset_time => Ok(Some(entry.clone())),
            Some(_) => {
                // 窗口已过期，读取与不存在一致；物理移除交给sweep或下一次increment
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn destroy(&self) {
        self.cancel.cancel();
        self.counters.clear();
    }
}
