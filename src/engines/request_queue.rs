// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{EngineError, HttpClient, HttpRequest, HttpResponse, Requester};
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::debug;

/// 请求队列配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestQueueOptions {
    /// 最大并发请求数，必须大于0
    pub concurrency: usize,
    /// 每个响应之后的间隔（毫秒），0 表示不延迟
    pub delay: u64,
}

impl Default for RequestQueueOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            delay: 0,
        }
    }
}

/// 受限请求通道
///
/// 同时最多有 `concurrency` 个请求在执行。配置了延迟时，
/// 槽位在响应返回后继续保留 `delay` 毫秒才释放给下一个请求，
/// 调用方本身不会被延迟阻塞。
pub struct RequestQueue {
    client: Arc<dyn HttpClient>,
    permits: Arc<Semaphore>,
    delay: Duration,
    shutdown: watch::Sender<bool>,
    active: Arc<AtomicUsize>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RequestQueue {
    /// 创建新的请求通道
    ///
    /// # 参数
    ///
    /// * `client` - HTTP客户端
    /// * `options` - 并发与延迟配置
    pub fn new(client: Arc<dyn HttpClient>, options: RequestQueueOptions) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            client,
            permits: Arc::new(Semaphore::new(options.concurrency.max(1))),
            delay: Duration::from_millis(options.delay),
            shutdown,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 当前正在执行的请求数
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// 关闭通道
    ///
    /// 排队中的请求立即失败，执行中的请求被中止
    pub fn close(&self) {
        self.permits.close();
        self.shutdown.send_replace(true);
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, EngineError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(EngineError::Closed);
        }

        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| EngineError::Closed)?
            }
            _ = shutdown.changed() => return Err(EngineError::Closed),
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(self.active.clone());
        counter!("harvestrs_requests_total").increment(1);
        debug!("Request {} {}", request.method, request.url);

        let result = tokio::select! {
            result = self.client.execute(request) => result,
            _ = shutdown.changed() => Err(EngineError::Closed),
        };
        drop(guard);

        if self.delay.is_zero() || self.is_closed() {
            drop(permit);
        } else {
            let delay = self.delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                drop(permit);
            });
        }

        result
    }
}

#[async_trait]
impl Requester for RequestQueue {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, EngineError> {
        self.send(request).await
    }
}
