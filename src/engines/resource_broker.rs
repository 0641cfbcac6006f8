// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::settings::Settings;
use crate::engines::chromium_engine::ChromiumLauncher;
use crate::engines::request_queue::{RequestQueue, RequestQueueOptions};
use crate::engines::reqwest_engine::ReqwestClient;
use crate::engines::traits::{
    Browser, BrowserLauncher, BrowserPage, EngineError, HttpClient, HttpRequest, HttpResponse,
    PageProvider, Requester,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// 共享资源管理器
///
/// 持有进程级别的浏览器实例与请求通道：
/// - 浏览器在第一次请求页面时启动，并发调用方等待同一次启动，
///   启动失败会返回给所有等待者
/// - 请求通过受限通道发出
/// - `close` 关闭浏览器并取消所有通道上的请求，可重复调用
pub struct ResourceBroker {
    launcher: Arc<dyn BrowserLauncher>,
    browser: OnceCell<Result<Arc<dyn Browser>, EngineError>>,
    client: Arc<dyn HttpClient>,
    default_queue: Arc<RequestQueue>,
    run_queues: Mutex<Vec<Weak<RequestQueue>>>,
    closed: AtomicBool,
}

impl ResourceBroker {
    /// 创建资源管理器，不会立即启动浏览器
    ///
    /// # 参数
    ///
    /// * `launcher` - 浏览器启动器
    /// * `client` - HTTP客户端
    /// * `queue` - 默认请求通道配置
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        client: Arc<dyn HttpClient>,
        queue: RequestQueueOptions,
    ) -> Self {
        Self {
            launcher,
            browser: OnceCell::new(),
            default_queue: Arc::new(RequestQueue::new(client.clone(), queue)),
            client,
            run_queues: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// 根据配置创建基于chromiumoxide与reqwest的资源管理器
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        let client = ReqwestClient::new(&settings.request_defaults)?;
        Ok(Self::new(
            Arc::new(ChromiumLauncher::new(settings.browser.clone())),
            Arc::new(client),
            settings.request_queue,
        ))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 浏览器是否已成功启动
    pub fn is_browser_launched(&self) -> bool {
        matches!(self.browser.get(), Some(Ok(_)))
    }

    /// 获取浏览器实例，必要时启动
    ///
    /// # 返回值
    ///
    /// * `Ok(browser)` - 浏览器实例
    /// * `Err(EngineError::Closed)` - 资源管理器已关闭
    /// * `Err(EngineError::LaunchFailed)` - 启动失败
    pub async fn browser(&self) -> Result<Arc<dyn Browser>, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }

        let launched = self
            .browser
            .get_or_init(|| async {
                info!("Launching browser");
                match self.launcher.launch().await {
                    Ok(browser) => Ok(browser),
                    Err(e) => {
                        error!("Browser launch failed: {}", e);
                        Err(e)
                    }
                }
            })
            .await;

        launched.clone()
    }

    /// 获取请求通道
    ///
    /// 未指定配置时返回进程级通道；指定配置时创建独立通道，
    /// 该通道同样会在 `close` 时被取消
    pub fn request_channel(&self, options: Option<RequestQueueOptions>) -> Arc<dyn Requester> {
        match options {
            None => self.default_queue.clone(),
            Some(options) => {
                let queue = Arc::new(RequestQueue::new(self.client.clone(), options));
                if self.is_closed() {
                    queue.close();
                }
                let mut run_queues = self.run_queues.lock();
                run_queues.retain(|q| q.strong_count() > 0);
                run_queues.push(Arc::downgrade(&queue));
                debug!(
                    "Created run request channel (concurrency={}, delay={}ms)",
                    options.concurrency, options.delay
                );
                queue
            }
        }
    }

    /// 关闭所有资源
    ///
    /// 在浏览器关闭完成后返回；未使用过任何资源或重复调用都是安全的
    pub async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing resource broker");

        self.default_queue.close();
        for queue in self.run_queues.lock().drain(..) {
            if let Some(queue) = queue.upgrade() {
                queue.close();
            }
        }

        // Waits for an in-flight launch and prevents any later one
        let state = self
            .browser
            .get_or_init(|| async { Err(EngineError::Closed) })
            .await;

        if let Ok(browser) = state {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
                return Err(e);
            }
            info!("Browser closed");
        }
        Ok(())
    }
}

#[async_trait]
impl PageProvider for ResourceBroker {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, EngineError> {
        let browser = self.browser().await?;
        browser.new_page().await
    }
}

#[async_trait]
impl Requester for ResourceBroker {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, EngineError> {
        self.default_queue.request(request).await
    }
}

/// 单次数据源调用的页面作用域
///
/// 记录通过它打开的所有页面，数据源结束时统一关闭
pub struct PageScope {
    provider: Arc<dyn PageProvider>,
    pages: Mutex<Vec<Arc<dyn BrowserPage>>>,
}

impl PageScope {
    pub fn new(provider: Arc<dyn PageProvider>) -> Self {
        Self {
            provider,
            pages: Mutex::new(Vec::new()),
        }
    }

    /// 当前作用域内打开的页面数量
    pub fn open_pages(&self) -> usize {
        self.pages.lock().len()
    }

    /// 关闭作用域内的所有页面
    pub async fn close_all(&self) {
        let pages: Vec<_> = self.pages.lock().drain(..).collect();
        for page in pages {
            if let Err(e) = page.close().await {
                // Pages are already gone once the browser is closed
                if !e.is_closed() {
                    debug!("Failed to close page: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl PageProvider for PageScope {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, EngineError> {
        let page = self.provider.new_page().await?;
        self.pages.lock().push(page.clone());
        Ok(page)
    }
}
