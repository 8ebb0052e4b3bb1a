//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态协调层的配置结构和解析逻辑。

use crate::error::{CoreError, Result};
use crate::rate_limit::RateLimiterConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

/// Redis连接字符串的环境变量名
///
/// 存在时覆盖配置文件中的连接字符串；两者都缺失时静默回退到内存存储
pub const REDIS_URL_ENV: &str = "OXSTATE_REDIS_URL";

/// 顶层配置
///
/// 描述缓存服务、限流器、批量加载器以及可选的Redis后端
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// 缓存服务配置
    #[serde(default)]
    pub cache: CacheConfig,
    /// 限流器默认配置
    #[serde(default)]
    pub rate_limit: RateLimiterConfig,
    /// 批量加载配置
    #[serde(default)]
    pub batch: BatchConfig,
    /// Redis后端配置（可选，缺失时使用内存存储）
    pub redis: Option<RedisConfig>,
}

/// 缓存服务配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 键命名空间前缀（总是规范化为以`:`结尾）
    pub namespace: String,
    /// 默认的缓存过期时间（秒）
    pub default_ttl: u64,
    /// 内存存储的过期清理间隔（秒）
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "app:".to_string(),
            default_ttl: 3600,
            sweep_interval_secs: 60,
        }
    }
}

/// 批量加载配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    /// 合并窗口（毫秒），窗口内的点查询合并为一次批量获取
    pub batch_delay_ms: u64,
    /// 批量写操作的单批大小
    pub batch_size: usize,
    /// 批量写操作的并发上限
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_delay_ms: 10,
            batch_size: 100,
            concurrency: 4,
        }
    }
}

/// Redis后端配置
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| CoreError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从TOML文件加载配置
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 返回解析并通过校验的配置或错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 校验配置
    ///
    /// 拒绝会导致运行时行为未定义的零值参数
    pub fn validate(&self) -> Result<()> {
        if self.cache.default_ttl == 0 {
            return Err(CoreError::Configuration(
                "cache.default_ttl must be greater than 0".to_string(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(CoreError::Configuration(
                "cache.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(CoreError::Configuration(
                "rate_limit.window_ms must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.max == 0 {
            return Err(CoreError::Configuration(
                "rate_limit.max must be greater than 0".to_string(),
            ));
        }
        if self.batch.batch_size == 0 || self.batch.concurrency == 0 {
            return Err(CoreError::Configuration(
                "batch.batch_size and batch.concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 解析Redis连接字符串
    ///
    /// 环境变量优先于配置文件；两者都缺失时返回None，
    /// 调用方应回退到内存存储而不是报错
    pub fn redis_url(&self) -> Option<String> {
        if let Ok(url) = std::env::var(REDIS_URL_ENV) {
            if !url.is_empty() {
                return Some(url);
            }
        }
        self.redis
            .as_ref()
            .map(|r| r.connection_string.expose_secret().to_string())
    }
}
