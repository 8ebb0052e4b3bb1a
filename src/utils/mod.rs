//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块
//!
//! 提供测试和调用方共用的工具函数，包括：
//! - 日志设置工具
//! - glob模式转换工具
//! - 唯一名称生成工具

use crate::error::{CoreError, Result};
use regex::Regex;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init()
            .ok();
    });
}

/// 把glob模式编译为匹配器
///
/// `*`匹配任意长度字符，其余字符按字面匹配，整体锚定到完整键
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    let anchored = format!("^{}$", escaped.join(".*"));
    Regex::new(&anchored)
        .map_err(|e| CoreError::Configuration(format!("Invalid glob pattern {}: {}", pattern, e)))
}

/// 生成带前缀的唯一名称，用于测试中隔离共享后端里的键
pub fn generate_unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
