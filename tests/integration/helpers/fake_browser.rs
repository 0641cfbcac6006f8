// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use harvestrs::engines::traits::{
    Browser, BrowserLauncher, BrowserPage, DocumentResponse, EngineError, RawItem, Viewport,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 模拟页面内容
#[derive(Debug, Clone)]
pub struct FakePageSpec {
    pub status: u16,
    pub status_text: String,
    /// 先返回一个验证页响应
    pub challenge_first: bool,
    /// 永远不返回主文档响应
    pub hang: bool,
    /// 选择器 -> 元素数量
    pub counts: HashMap<String, usize>,
    /// 链接选择器 -> 目标URL
    pub links: HashMap<String, String>,
    /// 条目选择器 -> 条目属性
    pub items: HashMap<String, Vec<RawItem>>,
    /// 选择器 -> 文本
    pub texts: HashMap<String, Vec<String>>,
    /// 前 N 次提取时条目属性都为空
    pub blank_polls: usize,
}

impl Default for FakePageSpec {
    fn default() -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            challenge_first: false,
            hang: false,
            counts: HashMap::new(),
            links: HashMap::new(),
            items: HashMap::new(),
            texts: HashMap::new(),
            blank_polls: 0,
        }
    }
}

impl FakePageSpec {
    pub fn status(mut self, status: u16, text: &str) -> Self {
        self.status = status;
        self.status_text = text.to_string();
        self
    }

    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn challenge_first(mut self) -> Self {
        self.challenge_first = true;
        self
    }

    pub fn element(mut self, selector: &str, count: usize) -> Self {
        self.counts.insert(selector.to_string(), count);
        self
    }

    pub fn link(mut self, selector: &str, url: &str) -> Self {
        self.links.insert(selector.to_string(), url.to_string());
        self
    }

    /// 添加条目，同时登记条目根元素和各属性组合元素
    pub fn items(mut self, selector: &str, rows: Vec<Vec<(&str, &str, Option<&str>)>>) -> Self {
        self.counts.insert(selector.to_string(), rows.len());
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let mut item = RawItem::new();
            for (name, attribute_selector, value) in row {
                *self
                    .counts
                    .entry(format!("{} {}", selector, attribute_selector))
                    .or_insert(0) += 1;
                item.insert(name.to_string(), value.map(str::to_string));
            }
            items.push(item);
        }
        self.items.insert(selector.to_string(), items);
        self
    }

    pub fn texts(mut self, selector: &str, texts: &[&str]) -> Self {
        self.counts.insert(selector.to_string(), texts.len());
        self.texts.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn blank_polls(mut self, polls: usize) -> Self {
        self.blank_polls = polls;
        self
    }
}

/// 模拟站点：URL -> 页面内容
#[derive(Clone, Default)]
pub struct FakeSite {
    pages: Arc<Mutex<HashMap<String, FakePageSpec>>>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, spec: FakePageSpec) -> Self {
        self.pages.lock().insert(url.to_string(), spec);
        self
    }

    fn get(&self, url: &str) -> Option<FakePageSpec> {
        self.pages.lock().get(url).cloned()
    }
}

/// 模拟页面，记录访问历史
pub struct FakePage {
    site: FakeSite,
    current: Mutex<Option<String>>,
    responses: Mutex<Option<UnboundedSender<DocumentResponse>>>,
    visited: Mutex<Vec<String>>,
    polls: Mutex<HashMap<String, usize>>,
    viewport: Mutex<Option<Viewport>>,
    closed: AtomicBool,
}

impl FakePage {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            current: Mutex::new(None),
            responses: Mutex::new(None),
            visited: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
            viewport: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        *self.viewport.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn current_spec(&self) -> FakePageSpec {
        self.current
            .lock()
            .as_deref()
            .and_then(|url| self.site.get(url))
            .unwrap_or_default()
    }

    fn load(&self, url: &str) {
        self.visited.lock().push(url.to_string());
        *self.current.lock() = Some(url.to_string());

        let spec = self
            .site
            .get(url)
            .unwrap_or_else(|| FakePageSpec::default().status(404, "Not Found"));
        if spec.hang {
            return;
        }

        let sender = self.responses.lock().clone();
        let Some(sender) = sender else {
            return;
        };
        if spec.challenge_first {
            let mut headers = HashMap::new();
            headers.insert("server".to_string(), "cloudflare".to_string());
            let _ = sender.unbounded_send(DocumentResponse {
                url: url.to_string(),
                status: 503,
                status_text: "Service Unavailable".to_string(),
                headers,
            });
        }
        let _ = sender.unbounded_send(DocumentResponse {
            url: url.to_string(),
            status: spec.status,
            status_text: spec.status_text.clone(),
            headers: HashMap::new(),
        });
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn set_viewport(&self, viewport: Viewport) -> Result<(), EngineError> {
        self.ensure_open()?;
        *self.viewport.lock() = Some(viewport);
        Ok(())
    }

    async fn document_responses(&self) -> Result<BoxStream<'static, DocumentResponse>, EngineError> {
        self.ensure_open()?;
        let (sender, receiver) = unbounded();
        *self.responses.lock() = Some(sender);
        Ok(receiver.boxed())
    }

    async fn goto(&self, url: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.load(url);
        Ok(())
    }

    async fn bring_to_front(&self) -> Result<(), EngineError> {
        self.ensure_open()
    }

    async fn force_same_window(&self, _selector: &str) -> Result<(), EngineError> {
        self.ensure_open()
    }

    async fn click(&self, selector: &str) -> Result<(), EngineError> {
        self.ensure_open()?;
        match self.current_spec().links.get(selector) {
            Some(url) => {
                self.load(url);
                Ok(())
            }
            None => Err(EngineError::Page(format!("No element for {}", selector))),
        }
    }

    async fn count(&self, selector: &str) -> Result<usize, EngineError> {
        self.ensure_open()?;
        let spec = self.current_spec();
        if spec.links.contains_key(selector) {
            return Ok(1);
        }
        Ok(spec.counts.get(selector).copied().unwrap_or(0))
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>, EngineError> {
        self.ensure_open()?;
        Ok(self.current_spec().texts.get(selector).cloned().unwrap_or_default())
    }

    async fn item_attributes(
        &self,
        item_selector: &str,
        _attributes: &[(String, String)],
    ) -> Result<Vec<RawItem>, EngineError> {
        self.ensure_open()?;
        let spec = self.current_spec();
        let items = spec.items.get(item_selector).cloned().unwrap_or_default();

        let key = format!("{:?} {}", self.current.lock().as_deref(), item_selector);
        let poll = {
            let mut polls = self.polls.lock();
            let poll = polls.entry(key).or_insert(0);
            *poll += 1;
            *poll
        };
        if poll <= spec.blank_polls {
            return Ok(items
                .into_iter()
                .map(|item| item.into_keys().map(|k| (k, None)).collect())
                .collect());
        }
        Ok(items)
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        self.responses.lock().take();
        Ok(())
    }
}

/// 模拟浏览器
pub struct FakeBrowser {
    site: FakeSite,
    pages: Mutex<Vec<Arc<FakePage>>>,
    closed: AtomicBool,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            pages: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn pages(&self) -> Vec<Arc<FakePage>> {
        self.pages.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        let page = Arc::new(FakePage::new(self.site.clone()));
        self.pages.lock().push(page.clone());
        Ok(page)
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        for page in self.pages.lock().iter() {
            page.closed.store(true, Ordering::SeqCst);
            page.responses.lock().take();
        }
        Ok(())
    }
}

/// 模拟浏览器启动器，统计启动次数
pub struct FakeLauncher {
    site: FakeSite,
    launches: AtomicUsize,
    fail: bool,
    delay: Duration,
    browser: Mutex<Option<Arc<FakeBrowser>>>,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            launches: AtomicUsize::new(0),
            fail: false,
            delay: Duration::ZERO,
            browser: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(FakeSite::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn browser(&self) -> Option<Arc<FakeBrowser>> {
        self.browser.lock().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>, EngineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EngineError::LaunchFailed("no chromium binary".to_string()));
        }
        let browser = Arc::new(FakeBrowser::new(self.site.clone()));
        *self.browser.lock() = Some(browser.clone());
        Ok(browser)
    }
}
