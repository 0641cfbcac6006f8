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

use crate::domain::models::event::{event_channel, EventSink, EventStream};
use crate::domain::models::list_node::{ItemsConfig, Link, LinkTarget, ListNode, Pagination};
use crate::domain::models::options::SourceOptions;
use crate::domain::models::record::Record;
use crate::domain::models::source::DataSource;
use crate::engines::traits::{BrowserPage, DocumentResponse, EngineError, Viewport};
use crate::utils::errors::{CrawlError, ErrorKind, SourceError};
use futures::future::{join_all, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// 采样模式下每个节点最多爬取的页数
pub const SAMPLE_MAX_PAGES: usize = 2;

/// 有效数据轮询配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingSettings {
    /// 轮询间隔（毫秒）
    pub frequency: u64,
    /// 总超时时间（毫秒）
    pub timeout: u64,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            frequency: 50,
            timeout: 5000,
        }
    }
}

/// 列表爬虫配置，来自数据源选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    /// 等待选择器超时（毫秒）
    pub default_timeout: u64,
    /// 导航超时（毫秒）
    pub default_navigation_timeout: u64,
    pub viewport: Viewport,
    pub scraping: ScrapingSettings,
    /// 未设置 `max_pages` 的分页节点最多爬取的页数
    pub num_pages_to_scrape: usize,
    /// 点击下一页之后、等待条目之前的停顿（毫秒）
    pub next_page_delay: u64,
    /// 覆盖运行级的 `series`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<bool>,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            default_timeout: 1000,
            default_navigation_timeout: 30_000,
            viewport: Viewport::default(),
            scraping: ScrapingSettings::default(),
            num_pages_to_scrape: 10,
            next_page_delay: 0,
            series: None,
        }
    }
}

/// 爬取状态
#[derive(Debug, Clone)]
pub enum CrawlState {
    Idle,
    Navigating,
    WaitingForTarget,
    Extracting,
    Paginating,
    Descending,
    Done,
    Failed(CrawlError),
}

impl CrawlState {
    fn name(&self) -> &'static str {
        match self {
            CrawlState::Idle => "idle",
            CrawlState::Navigating => "navigating",
            CrawlState::WaitingForTarget => "waiting_for_target",
            CrawlState::Extracting => "extracting",
            CrawlState::Paginating => "paginating",
            CrawlState::Descending => "descending",
            CrawlState::Done => "done",
            CrawlState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlState::Done | CrawlState::Failed(_))
    }
}

/// 单次提取的结果
struct Extraction {
    /// 所有条目规则匹配到的元素数量
    matched: usize,
    records: Vec<Record>,
}

fn is_valid(records: &[Record]) -> bool {
    records.iter().any(|r| r.values().any(|v| !v.is_null()))
}

fn parse_error(error: anyhow::Error) -> CrawlError {
    CrawlError::Parse(error.to_string())
}

/// 爬取状态机
///
/// 在一个页面上驱动 导航 -> 等待 -> 提取 -> 分页/下钻 的循环。
/// 每一步都有自己的超时，错误只终止当前分支并作为错误事件报告
pub struct CrawlStateMachine {
    page: Arc<dyn BrowserPage>,
    settings: CrawlerSettings,
    sample: bool,
    sink: EventSink,
}

impl CrawlStateMachine {
    pub fn new(page: Arc<dyn BrowserPage>, settings: CrawlerSettings, sample: bool, sink: EventSink) -> Self {
        Self {
            page,
            settings,
            sample,
            sink,
        }
    }

    /// 爬取一个列表节点及其子节点
    ///
    /// # 返回值
    ///
    /// 节点的终止状态：`Done` 或 `Failed`
    pub async fn crawl(&self, node: &ListNode) -> CrawlState {
        self.crawl_node(node).await
    }

    fn report(&self, error: CrawlError) {
        debug!("Crawl error: {}", error);
        self.sink.error(error);
    }

    fn max_pages(&self, pagination: &Pagination) -> usize {
        let max = pagination
            .max_pages
            .unwrap_or(self.settings.num_pages_to_scrape);
        if self.sample {
            max.min(SAMPLE_MAX_PAGES)
        } else {
            max
        }
    }

    /// 提取完成（或失败）之后的下一个状态
    fn after_extraction(node: &ListNode) -> CrawlState {
        if node.lists.is_some() {
            CrawlState::Descending
        } else {
            CrawlState::Done
        }
    }

    fn crawl_node<'a>(&'a self, node: &'a ListNode) -> BoxFuture<'a, CrawlState> {
        async move {
            let mut state = CrawlState::Idle;
            let mut page_number = 1usize;

            while !state.is_terminal() {
                if self.sink.is_closed() {
                    state = CrawlState::Done;
                    break;
                }

                let next = match &state {
                    CrawlState::Idle => match node.validate() {
                        Ok(()) => CrawlState::Navigating,
                        Err(e) => CrawlState::Failed(e),
                    },
                    CrawlState::Navigating => match self.navigate(&node.link).await {
                        Ok(()) if node.items.is_empty() => Self::after_extraction(node),
                        Ok(()) => CrawlState::WaitingForTarget,
                        Err(e) => CrawlState::Failed(e),
                    },
                    CrawlState::WaitingForTarget => match self.wait_for_items(&node.items).await {
                        Ok(()) => CrawlState::Extracting,
                        // An absent items root on a later page is an empty page
                        Err(CrawlError::SelectorTimeout { .. }) if page_number > 1 => {
                            CrawlState::Done
                        }
                        Err(e) => {
                            self.report(e);
                            Self::after_extraction(node)
                        }
                    },
                    CrawlState::Extracting => match self.extract(&node.items).await {
                        Ok(records) => {
                            let count = records.len();
                            if count > 0 {
                                self.sink.data(records);
                            }
                            if node.pagination.is_some() {
                                if count == 0 {
                                    CrawlState::Done
                                } else {
                                    CrawlState::Paginating
                                }
                            } else {
                                Self::after_extraction(node)
                            }
                        }
                        Err(e) => {
                            self.report(e);
                            Self::after_extraction(node)
                        }
                    },
                    CrawlState::Paginating => match node.pagination {
                        Some(ref pagination) => {
                            if page_number >= self.max_pages(pagination) {
                                CrawlState::Done
                            } else {
                                match self.next_page(pagination).await {
                                    Ok(true) => {
                                        page_number += 1;
                                        CrawlState::WaitingForTarget
                                    }
                                    Ok(false) => CrawlState::Done,
                                    Err(e) => CrawlState::Failed(e),
                                }
                            }
                        }
                        None => CrawlState::Done,
                    },
                    CrawlState::Descending => {
                        self.descend(node).await;
                        CrawlState::Done
                    }
                    CrawlState::Done | CrawlState::Failed(_) => break,
                };

                trace!(from = state.name(), to = next.name(), page = page_number, "Crawl state");
                if let CrawlState::Failed(ref e) = next {
                    self.report(e.clone());
                }
                state = next;
            }

            state
        }
        .boxed()
    }

    /// 子节点在同一页面上按顺序爬取
    ///
    /// 父节点以URL为入口时，每个有效的子节点之前重新导航到该URL
    async fn descend(&self, node: &ListNode) {
        let Some(ref lists) = node.lists else {
            return;
        };
        let parent_url = match node.link.target() {
            Some(LinkTarget::Url(url)) => Some(url),
            _ => None,
        };

        for child in lists {
            if self.sink.is_closed() {
                return;
            }
            if let Err(e) = child.validate() {
                self.report(e);
                continue;
            }
            if let Some(url) = parent_url {
                let link = Link {
                    url: Some(url.to_string()),
                    selector: None,
                };
                if let Err(e) = self.navigate(&link).await {
                    self.report(e);
                    continue;
                }
            }
            self.crawl_node(child).await;
        }
    }

    /// 导航到链接
    ///
    /// 在导航开始前订阅主文档响应；验证页响应会被跳过，
    /// 状态码 >= 400 视为导航失败。整个过程受导航超时限制
    async fn navigate(&self, link: &Link) -> Result<(), CrawlError> {
        let target = link
            .target()
            .ok_or_else(|| CrawlError::InvalidListNode("link must specify exactly one of url or selector".to_string()))?;
        let timeout_ms = self.settings.default_navigation_timeout;
        let label = match target {
            LinkTarget::Url(url) | LinkTarget::Selector(url) => url.to_string(),
        };

        let mut responses = self.page.document_responses().await?;
        let navigation = self.follow(target, &mut responses);

        match tokio::time::timeout(Duration::from_millis(timeout_ms), navigation).await {
            Ok(result) => result,
            Err(_) => Err(CrawlError::NavigationTimeout {
                url: label,
                timeout_ms,
            }),
        }
    }

    /// 打开链接并等待主文档响应
    async fn follow(
        &self,
        target: LinkTarget<'_>,
        responses: &mut BoxStream<'static, DocumentResponse>,
    ) -> Result<(), CrawlError> {
        match target {
            LinkTarget::Url(url) => {
                debug!("Navigating to {}", url);
                self.page.goto(url).await?;
            }
            LinkTarget::Selector(selector) => {
                debug!("Clicking {}", selector);
                self.wait_for_any(&[selector.to_string()]).await?;
                self.page.bring_to_front().await?;
                self.page.force_same_window(selector).await?;
                self.page.click(selector).await?;
            }
        }

        while let Some(response) = responses.next().await {
            if response.is_bot_challenge() {
                debug!(
                    "Bot challenge ({}) while loading {}, waiting for next response",
                    response.status, response.url
                );
                continue;
            }
            if response.status >= 400 {
                let url = match target {
                    LinkTarget::Url(url) => url.to_string(),
                    LinkTarget::Selector(_) => response.url,
                };
                return Err(CrawlError::NavigationHttp {
                    url,
                    status: response.status,
                    status_text: response.status_text,
                });
            }
            return Ok(());
        }

        Err(CrawlError::Engine(EngineError::Page(
            "page closed before the document response arrived".to_string(),
        )))
    }

    /// 等待任一选择器出现
    ///
    /// 超时错误使用第一个选择器
    async fn wait_for_any(&self, selectors: &[String]) -> Result<(), CrawlError> {
        let timeout_ms = self.settings.default_timeout;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let interval = Duration::from_millis(self.settings.scraping.frequency.max(1));

        loop {
            for selector in selectors {
                if self.page.count(selector).await? > 0 {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(CrawlError::SelectorTimeout {
                    selector: selectors.first().cloned().unwrap_or_default(),
                    timeout_ms,
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// 等待条目根元素；声明了属性时还要等到任一 "条目 属性" 组合出现
    async fn wait_for_items(&self, items: &[ItemsConfig]) -> Result<(), CrawlError> {
        for config in items {
            self.wait_for_any(&[config.selector.clone()]).await?;
            if !config.attributes.is_empty() {
                let combinations: Vec<String> = config
                    .attributes
                    .iter()
                    .map(|a| format!("{} {}", config.selector, a.selector))
                    .collect();
                self.wait_for_any(&combinations).await?;
            }
        }
        Ok(())
    }

    /// 单次提取
    async fn extract_once(&self, items: &[ItemsConfig]) -> Result<Extraction, CrawlError> {
        let mut extraction = Extraction {
            matched: 0,
            records: Vec::new(),
        };

        for config in items {
            if !config.attributes.is_empty() {
                let raw = self
                    .page
                    .item_attributes(&config.selector, &config.attribute_selectors())
                    .await?;
                extraction.matched += raw.len();

                for item in raw {
                    let mut record = Record::new();
                    for attribute in &config.attributes {
                        let Some(Some(text)) = item.get(&attribute.name) else {
                            continue;
                        };
                        if text.is_empty() {
                            continue;
                        }
                        let value = match attribute.parse {
                            Some(ref parser) => parser.apply(text).map_err(parse_error)?,
                            None => Value::String(text.clone()),
                        };
                        record.insert(attribute.name.clone(), value);
                    }
                    if !record.is_empty() {
                        extraction.records.push(record);
                    }
                }
            } else if let Some(ref parser) = config.parse {
                let texts = self.page.texts(&config.selector).await?;
                extraction.matched += texts.len();

                for text in texts {
                    for value in parser.apply(&text).map_err(parse_error)? {
                        if let Value::Object(record) = value {
                            if !record.is_empty() {
                                extraction.records.push(record);
                            }
                        }
                    }
                }
            }
        }

        Ok(extraction)
    }

    /// 重试直到得到有效数据
    ///
    /// 至少一条记录含有非空属性即为有效；没有匹配到任何元素时返回空结果
    async fn extract(&self, items: &[ItemsConfig]) -> Result<Vec<Record>, CrawlError> {
        let scraping = self.settings.scraping;
        let deadline = Instant::now() + Duration::from_millis(scraping.timeout);
        let interval = Duration::from_millis(scraping.frequency.max(1));

        loop {
            let extraction = self.extract_once(items).await?;
            if extraction.matched == 0 || is_valid(&extraction.records) {
                return Ok(extraction.records);
            }
            if Instant::now() >= deadline {
                return Err(CrawlError::InvalidDataTimeout);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// 翻到下一页
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 已导航到下一页
    /// * `Ok(false)` - 没有下一页链接
    async fn next_page(&self, pagination: &Pagination) -> Result<bool, CrawlError> {
        let selector = &pagination.next.selector;
        match self.wait_for_any(&[selector.clone()]).await {
            Ok(()) => {}
            Err(CrawlError::SelectorTimeout { .. }) => {
                debug!("No next page link ({}), pagination finished", selector);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        let link = Link {
            url: None,
            selector: Some(selector.clone()),
        };
        self.navigate(&link).await?;

        let delay = self.settings.next_page_delay;
        if delay > 0 {
            trace!(delay_ms = delay, "Waiting before scraping next page");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(true)
    }
}

/// 列表爬虫数据源
///
/// 按 `ListNode` 树爬取。`series` 时顶层列表共享一个页面按顺序爬取，
/// 否则每个顶层列表使用独立页面并发爬取；数据源选项中的 `series` 优先于运行级配置
#[derive(Debug, Clone)]
pub struct ListCrawler {
    lists: Arc<Vec<ListNode>>,
}

impl ListCrawler {
    pub fn new(lists: Vec<ListNode>) -> Self {
        Self {
            lists: Arc::new(lists),
        }
    }
}

async fn open_page(options: &SourceOptions, settings: &CrawlerSettings) -> Result<Arc<dyn BrowserPage>, EngineError> {
    let page = options.pages.new_page().await?;
    page.set_viewport(settings.viewport).await?;
    Ok(page)
}

impl DataSource for ListCrawler {
    fn get_data(&self, options: SourceOptions) -> Result<EventStream, SourceError> {
        let settings: CrawlerSettings = options.settings_as().map_err(|e| {
            SourceError::new(
                ErrorKind::Configuration,
                format!("Invalid crawler options: {}", e),
            )
        })?;

        let (sink, stream) = event_channel();
        let lists = self.lists.clone();
        let series = settings.series.unwrap_or(options.series);

        tokio::spawn(async move {
            if series {
                match open_page(&options, &settings).await {
                    Ok(page) => {
                        let machine = CrawlStateMachine::new(page, settings, options.sample, sink.clone());
                        for node in lists.iter() {
                            machine.crawl(node).await;
                        }
                    }
                    Err(e) => {
                        sink.error(e);
                    }
                }
            } else {
                join_all(lists.iter().map(|node| {
                    let sink = sink.clone();
                    let options = &options;
                    async move {
                        match open_page(options, &settings).await {
                            Ok(page) => {
                                CrawlStateMachine::new(page, settings, options.sample, sink)
                                    .crawl(node)
                                    .await;
                            }
                            Err(e) => {
                                sink.error(e);
                            }
                        }
                    }
                }))
                .await;
            }
            sink.end();
        });

        Ok(stream)
    }

    fn default_options(&self) -> Map<String, Value> {
        match serde_json::to_value(CrawlerSettings::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
