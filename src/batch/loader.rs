//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了批量合并加载器，用于抵御N+1式的重复点查询。
//!
//! 短时间窗口内发出的多次`load`调用被合并为一次底层批量获取；
//! 调度状态是一个显式标志而不是定时器的存在与否。加载器不引用
//! 任何存储，队列和结果缓存都是纯内存的。

use crate::error::Result;
use ahash::AHashMap;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

/// 默认合并窗口
const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(10);

/// 批量获取函数
///
/// 接收一组去重后的键，返回键到值的映射；映射中缺失的键
/// 被解析为None
pub type BatchFn<K, V> =
    Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, Result<HashMap<K, V>>> + Send + Sync>;

/// 待执行批次的挂起状态
///
/// 同一个键在批次执行前注册的所有等待者收到相同的解析值
struct PendingState<K, V> {
    /// 每个键的等待者列表
    waiters: AHashMap<K, Vec<oneshot::Sender<Option<V>>>>,
    /// 是否已有批次被调度
    scheduled: bool,
}

struct LoaderInner<K, V> {
    batch_fn: BatchFn<K, V>,
    delay: Duration,
    /// 批次执行后填充的结果缓存；`load`入队前先查它，
    /// 解析过一次的键在显式清除前不会重新获取
    results: DashMap<K, Option<V>>,
    pending: Mutex<PendingState<K, V>>,
}

/// 批量合并加载器
#[derive(Clone)]
pub struct BatchLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<LoaderInner<K, V>>,
}

impl<K, V> BatchLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// 创建新的加载器，使用默认合并窗口（10毫秒）
    pub fn new<F, Fut>(batch_fn: F) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<K, V>>> + Send + 'static,
    {
        Self::with_delay(batch_fn, DEFAULT_BATCH_DELAY)
    }

    /// 创建新的加载器并指定合并窗口
    ///
    /// # 参数
    ///
    /// * `batch_fn` - 批量获取函数
    /// * `delay` - 合并窗口长度
    pub fn with_delay<F, Fut>(batch_fn: F, delay: Duration) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HashMap<K, V>>> + Send + 'static,
    {
        let batch_fn: BatchFn<K, V> =
            Arc::new(move |keys| -> BoxFuture<'static, Result<HashMap<K, V>>> {
                Box::pin(batch_fn(keys))
            });
        Self {
            inner: Arc::new(LoaderInner {
                batch_fn,
                delay,
                results: DashMap::new(),
                pending: Mutex::new(PendingState {
                    waiters: AHashMap::new(),
                    scheduled: false,
                }),
            }),
        }
    }

    /// 加载单个键
    ///
    /// 结果缓存命中时立即返回；否则注册为等待者，并在当前没有
    /// 已调度批次时调度一个。入队后的调用方总会被解析（值或
    /// None），绝不会无限挂起
    pub async fn load(&self, key: K) -> Option<V> {
        if let Some(cached) = self.inner.results.get(&key) {
            return cached.clone();
        }

        let rx = {
            let mut pending = self.inner.pending.lock().await;
            let (tx, rx) = oneshot::channel();
            pending.waiters.entry(key).or_default().push(tx);

            if !pending.scheduled {
                pending.scheduled = true;
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(inner.delay).await;
                    LoaderInner::flush(&inner).await;
                });
            }
            rx
        };

        // 发送端在flush中总是被消费，接收失败等价于批次失败
        rx.await.unwrap_or(None)
    }

    /// 加载多个键，依赖同一合并机制，按输入顺序返回
    pub async fn load_many(&self, keys: Vec<K>) -> Vec<Option<V>> {
        join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// 清空结果缓存，下一次`load`重新走批量路径
    pub fn clear(&self) {
        self.inner.results.clear();
    }

    /// 清除单个键的缓存结果
    pub fn clear_key(&self, key: &K) {
        self.inner.results.remove(key);
    }
}

impl<K, V> LoaderInner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// 执行一个批次
    ///
    /// 先取走全部挂起的等待者并复位调度标志，批次执行期间新到的
    /// `load`会调度下一个批次。批量函数失败时，本批次所有键的全部
    /// 等待者都被解析为None且不写入结果缓存，合并的失败绝不阻塞
    /// 调用方
    async fn flush(inner: &Arc<Self>) {
        let waiters = {
            let mut pending = inner.pending.lock().await;
            pending.scheduled = false;
            std::mem::take(&mut pending.waiters)
        };

        if waiters.is_empty() {
            return;
        }

        let keys: Vec<K> = waiters.keys().cloned().collect();
        debug!("Batch flush with {} distinct keys", keys.len());

        match (inner.batch_fn)(keys).await {
            Ok(mut resolved) => {
                for (key, senders) in waiters {
                    let value = resolved.remove(&key);
                    inner.results.insert(key, value.clone());
                    for sender in senders {
                        let _ = sender.send(value.clone());
                    }
                }
            }
            Err(e) => {
                warn!("Batch fetch failed: {}, resolving all waiters with None", e);
                for (_, senders) in waiters {
                    for sender in senders {
                        let _ = sender.send(None);
                    }
                }
            }
        }
    }
}
