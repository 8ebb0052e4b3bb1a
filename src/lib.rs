//! oxstate - 应用服务的时间窗口状态原语
//!
//! 提供三个共享同一架构问题的并发协调组件：带模式失效的TTL
//! 键值缓存、可配置窗口的请求限流器、把并发点查询合并为一次
//! 批量获取的加载器。三者都建立在可插拔的存储抽象之上，后端
//! 可在进程内实现与网络化Redis实现之间互换。

#![doc(html_root_url = "https://docs.rs/oxstate/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod rate_limit;
pub mod serialization;
pub mod store;
pub mod utils;

// Re-export commonly used items
pub use batch::{batch_execute, chunk, BatchExecuteOptions, BatchLoader};
pub use cache::{CacheOptions, CacheService};
pub use config::Config;
pub use error::{CoreError, Result};
pub use manager::StateManager;
pub use rate_limit::{RateLimitInfo, RateLimitResult, RateLimiter, RateLimiterConfig};
pub use store::{CacheStore, RateLimitCounter, RateLimitStore};

/// oxstate 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
