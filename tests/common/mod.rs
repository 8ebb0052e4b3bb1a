//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const REDIS_TEST_URL: &str = "redis://127.0.0.1:6379";

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 检查Redis是否可用，不可用的测试应当跳过而不是失败
#[allow(dead_code)]
pub async fn wait_for_redis(url: &str) -> bool {
    for _ in 0..3 {
        if let Ok(client) = redis::Client::open(url) {
            if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
                if redis::cmd("PING")
                    .query_async::<String>(&mut conn)
                    .await
                    .is_ok()
                {
                    return true;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

/// 生成唯一的键前缀，隔离共享Redis里的测试数据
#[allow(dead_code)]
pub fn generate_unique_prefix(name: &str) -> String {
    oxstate::utils::generate_unique_name(name)
}
