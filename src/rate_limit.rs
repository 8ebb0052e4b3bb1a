//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了固定窗口限流器。
//!
//! 窗口边界由上一个窗口（或不存在）之后的首次自增建立，持续恰好
//! `window_ms`毫秒；窗口内所有自增共享同一个重置时间。已知特性：
//! 病态时机下跨越窗口边界最多可放行约2倍max的请求，这是固定窗口
//! 算法的固有行为而非缺陷，下游依赖这些确切数字。

use crate::store::{RateLimitStore, now_millis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};

/// 默认拒绝消息
const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

/// 限流器配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// 窗口长度（毫秒）
    pub window_ms: u64,
    /// 窗口内允许的最大请求数
    pub max: u64,
    /// 拒绝时返回的消息（可选）
    pub message: Option<String>,
    /// 成功的请求不计入配额
    pub skip_successful_requests: bool,
    /// 失败的请求不计入配额
    pub skip_failed_requests: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max: 100,
            message: None,
            skip_successful_requests: false,
            skip_failed_requests: false,
        }
    }
}

/// 限流状态信息
///
/// 可序列化，便于调用方写入响应头
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitInfo {
    /// 配置的上限
    pub limit: u64,
    /// 当前窗口内的计数
    pub current: u64,
    /// 剩余配额，`max(0, limit - current)`
    pub remaining: u64,
    /// 窗口重置时间（epoch毫秒）
    pub reset_time: u64,
}

/// 限流检查结果
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// 本次请求是否放行
    pub allowed: bool,
    /// 当前限流状态
    pub info: RateLimitInfo,
}

/// 固定窗口限流器
///
/// 除配置外不持有任何可变状态，计数器全部委托给注入的存储。
/// 内存存储下并发自增的原子性由DashMap的按键锁保证，跨进程
/// 原子性（如需要）是网络化存储的属性
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// 创建新的限流器
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    fn info_from(&self, count: u64, reset_time: u64) -> RateLimitInfo {
        RateLimitInfo {
            limit: self.config.max,
            current: count,
            remaining: self.config.max.saturating_sub(count),
            reset_time,
        }
    }

    /// 检查并记账一次请求
    ///
    /// 先自增再判定，因此`current`可以超过`max`；`allowed`为
    /// `count <= max`。存储故障时失败开放（放行）
    ///
    /// # 参数
    ///
    /// * `client_key` - 客户端标识符
    #[instrument(skip(self), level = "debug")]
    pub async fn check(&self, client_key: &str) -> RateLimitResult {
        match self.store.increment(client_key, self.config.window_ms).await {
            Ok(counter) => RateLimitResult {
                allowed: counter.count <= self.config.max,
                info: self.info_from(counter.count, counter.reset_time),
            },
            Err(e) => {
                warn!("Rate limit increment failed for {}: {}, failing open", client_key, e);
                RateLimitResult {
                    allowed: true,
                    info: self.info_from(0, now_millis() + self.config.window_ms),
                }
            }
        }
    }

    /// 请求处理完成后结算
    ///
    /// 根据配置决定本次结果是否计入配额：`success`且配置了
    /// `skip_successful_requests`（或失败且配置了`skip_failed_requests`）
    /// 时回退一次计数，然后重新读取并返回与`check`相同形状的结果。
    /// 计数器尚不存在时行为等同于`check`
    #[instrument(skip(self), level = "debug")]
    pub async fn consume(&self, client_key: &str, success: bool) -> RateLimitResult {
        let skip = (success && self.config.skip_successful_requests)
            || (!success && self.config.skip_failed_requests);

        if skip {
            if let Err(e) = self.store.decrement(client_key).await {
                warn!("Rate limit decrement failed for {}: {}", client_key, e);
            }
        }

        match self.store.get(client_key).await {
            Ok(Some(counter)) => RateLimitResult {
                allowed: counter.count <= self.config.max,
                info: self.info_from(counter.count, counter.reset_time),
            },
            Ok(None) => self.check(client_key).await,
            Err(e) => {
                warn!("Rate limit read failed for {}: {}, failing open", client_key, e);
                RateLimitResult {
                    allowed: true,
                    info: self.info_from(0, now_millis() + self.config.window_ms),
                }
            }
        }
    }

    /// 删除计数器，立即恢复全部配额
    #[instrument(skip(self), level = "debug")]
    pub async fn reset(&self, client_key: &str) {
        if let Err(e) = self.store.reset(client_key).await {
            warn!("Rate limit reset failed for {}: {}", client_key, e);
        }
    }

    /// 只读地查询限流状态，不改变计数器
    ///
    /// # 返回值
    ///
    /// 计数器不存在时返回None
    #[instrument(skip(self), level = "debug")]
    pub async fn get_info(&self, client_key: &str) -> Option<RateLimitInfo> {
        match self.store.get(client_key).await {
            Ok(Some(counter)) => Some(self.info_from(counter.count, counter.reset_time)),
            Ok(None) => None,
            Err(e) => {
                warn!("Rate limit read failed for {}: {}", client_key, e);
                None
            }
        }
    }

    /// 配置的拒绝消息
    pub fn get_message(&self) -> &str {
        self.config.message.as_deref().unwrap_or(DEFAULT_MESSAGE)
    }
}
