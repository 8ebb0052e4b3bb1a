//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了状态协调层的错误类型和处理机制。

use thiserror::Error;

/// 状态协调层错误类型枚举
///
/// 定义了缓存、限流和批量加载过程中可能发生的各种错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 后端存储操作失败
    #[error("Backend error: {0}")]
    Backend(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 操作不支持
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

/// 状态协调层操作结果类型别名
///
/// 简化错误处理，所有操作都返回此类型
pub type Result<T> = std::result::Result<T, CoreError>;
