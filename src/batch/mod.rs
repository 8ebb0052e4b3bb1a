//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了批量加载与批量执行设施：把大量近乎同时的点查询
//! 合并为一次批量获取的加载器，以及带并发上限的分批执行助手。

pub mod loader;

use crate::error::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;

pub use loader::{BatchFn, BatchLoader};

/// 批量执行选项
#[derive(Debug, Clone)]
pub struct BatchExecuteOptions {
    /// 单批大小
    pub batch_size: usize,
    /// 并发上限
    pub concurrency: usize,
}

impl Default for BatchExecuteOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 4,
        }
    }
}

/// 把切片拆分为固定大小的分组
///
/// 最后一组可能不足`size`个；`size`为0时按1处理
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items
        .chunks(size.max(1))
        .map(|group| group.to_vec())
        .collect()
}

/// 分批并发地执行批量操作，按输入顺序收集结果
///
/// 用于读合并路径之外的批量写操作。每批最多`batch_size`个条目，
/// 同时在途的批次不超过`concurrency`个；任何一批失败都使整个
/// 调用失败
///
/// # 参数
///
/// * `items` - 全部待处理条目
/// * `f` - 批量操作，接收一批条目并返回对应的一批结果
/// * `options` - 批大小与并发上限
pub async fn batch_execute<T, R, F, Fut>(
    items: Vec<T>,
    f: F,
    options: &BatchExecuteOptions,
) -> Result<Vec<R>>
where
    T: Clone,
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<R>>>,
{
    let batches = chunk(&items, options.batch_size);
    let results: Vec<Vec<R>> = stream::iter(batches.into_iter().map(f))
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;
    Ok(results.into_iter().flatten().collect())
}
