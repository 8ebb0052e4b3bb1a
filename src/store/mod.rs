//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态协调层的存储契约，以及内存和Redis两种实现。
//!
//! 缓存服务和限流器只持有 trait object，不关心背后是进程内
//! 存储还是网络化存储；两种实现可以在构造期互换。

pub mod memory;
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 缓存存储契约
///
/// 任何背后引擎（进程内或网络化）都必须满足的最小能力接口。
/// 契约要求：读取已过期或不存在的键必须返回None；`set_raw`总是覆盖；
/// `delete_pattern`将`*`视为任意长度通配符
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 获取缓存值（字节形式）
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    ///
    /// # 返回值
    ///
    /// 返回缓存值，键不存在或已过期时返回None
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 设置缓存值（字节形式）
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值（字节数组）
    /// * `ttl_secs` - 过期时间（秒）
    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    /// 删除缓存项
    async fn delete(&self, key: &str) -> Result<()>;

    /// 删除所有匹配glob模式的缓存项
    ///
    /// # 参数
    ///
    /// * `pattern` - glob模式，`*`匹配任意长度字符
    ///
    /// # 返回值
    ///
    /// 返回被删除的键数量
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;

    /// 清空整个存储
    ///
    /// 注意：这是全局操作，不限于某个命名空间
    async fn flush(&self) -> Result<()>;

    /// 销毁存储实例
    ///
    /// 取消后台清理任务并释放所有条目；优雅关闭时必须调用，
    /// 否则会泄漏定时器
    async fn destroy(&self);
}

/// 限流计数器记录
///
/// 首次自增时创建；当前时间超过`reset_time`后下一次自增
/// 将窗口滚动为`count=1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitCounter {
    /// 当前窗口内的计数
    pub count: u64,
    /// 窗口重置时间（epoch毫秒），恒等于窗口建立时刻加窗口长度
    pub reset_time: u64,
}

/// 限流存储契约
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// 自增计数器
    ///
    /// 键不存在或窗口已过期时建立新窗口（count=1），否则在
    /// 当前窗口内加一。任何情况下都返回连贯的计数器记录
    ///
    /// # 参数
    ///
    /// * `key` - 客户端键
    /// * `window_ms` - 窗口长度（毫秒）
    async fn increment(&self, key: &str, window_ms: u64) -> Result<RateLimitCounter>;

    /// 递减计数器（下限为0）
    ///
    /// 用于"本次结果不计入配额"的语义；键不存在时为no-op
    async fn decrement(&self, key: &str) -> Result<()>;

    /// 删除计数器（立即恢复全部配额）
    async fn reset(&self, key: &str) -> Result<()>;

    /// 读取计数器，不产生任何变更
    ///
    /// 计数器不存在或窗口已过期时返回None
    async fn get(&self, key: &str) -> Result<Option<RateLimitCounter>>;

    /// 销毁存储实例，取消后台清理任务
    async fn destroy(&self);
}

/// 当前时间（epoch毫秒）
#[inline]
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
