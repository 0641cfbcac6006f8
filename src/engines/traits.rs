// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// 引擎错误类型
///
/// 浏览器与HTTP能力接口返回的错误
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// 浏览器启动失败
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),
    /// 页面操作失败
    #[error("Page operation failed: {0}")]
    Page(String),
    /// 脚本执行失败
    #[error("Script evaluation failed: {0}")]
    Evaluation(String),
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(String),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 资源已关闭
    #[error("Resource broker is closed")]
    Closed,
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::Timeout
        } else {
            EngineError::RequestFailed(e.to_string())
        }
    }
}

impl EngineError {
    /// 判断错误是否由资源关闭引起
    pub fn is_closed(&self) -> bool {
        matches!(self, EngineError::Closed)
    }
}

/// HTTP请求描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    /// 请求方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 目标URL
    pub url: String,
    /// 请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求体
    #[serde(default)]
    pub body: Option<String>,
    /// 超时时间（毫秒）
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout_ms: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }
}

/// HTTP响应
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP状态码
    pub status: u16,
    /// 状态描述
    pub status_text: String,
    /// 响应头
    pub headers: HashMap<String, String>,
    /// 响应内容
    pub body: String,
}

/// 主文档响应
///
/// 页面导航时收到的文档级别响应
#[derive(Debug, Clone)]
pub struct DocumentResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// 响应头（小写键名）
    pub headers: HashMap<String, String>,
}

impl DocumentResponse {
    /// 判断响应是否为反爬虫验证页
    ///
    /// 验证页会在通过后重新加载目标文档，因此不应视为导航失败
    pub fn is_bot_challenge(&self) -> bool {
        if !matches!(self.status, 403 | 429 | 503) {
            return false;
        }
        if self
            .headers
            .get("cf-mitigated")
            .is_some_and(|v| v.eq_ignore_ascii_case("challenge"))
        {
            return true;
        }
        self.headers.get("server").is_some_and(|server| {
            let server = server.to_ascii_lowercase();
            server.contains("cloudflare") || server.contains("ddos-guard")
        })
    }
}

/// 视口尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// 单个条目的原始属性值，键为属性名
pub type RawItem = BTreeMap<String, Option<String>>;

/// 浏览器页面能力接口
///
/// 爬取状态机只通过该接口操作页面，不依赖具体的浏览器实现
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// 设置视口
    async fn set_viewport(&self, viewport: Viewport) -> Result<(), EngineError>;

    /// 订阅主文档响应
    ///
    /// 必须在导航开始前调用，返回的流按到达顺序产出响应
    async fn document_responses(
        &self,
    ) -> Result<BoxStream<'static, DocumentResponse>, EngineError>;

    /// 导航到绝对URL
    async fn goto(&self, url: &str) -> Result<(), EngineError>;

    /// 将页面置于前台
    async fn bring_to_front(&self) -> Result<(), EngineError>;

    /// 强制链接在当前窗口打开
    async fn force_same_window(&self, selector: &str) -> Result<(), EngineError>;

    /// 点击元素
    async fn click(&self, selector: &str) -> Result<(), EngineError>;

    /// 统计匹配选择器的元素数量
    async fn count(&self, selector: &str) -> Result<usize, EngineError>;

    /// 获取所有匹配元素的文本内容
    async fn texts(&self, selector: &str) -> Result<Vec<String>, EngineError>;

    /// 按条目提取属性文本
    ///
    /// `attributes` 为 (属性名, 相对选择器) 列表
    async fn item_attributes(
        &self,
        item_selector: &str,
        attributes: &[(String, String)],
    ) -> Result<Vec<RawItem>, EngineError>;

    /// 关闭页面
    async fn close(&self) -> Result<(), EngineError>;
}

/// 浏览器实例
#[async_trait]
pub trait Browser: Send + Sync {
    /// 打开新页面
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, EngineError>;

    /// 关闭浏览器，中止所有页面操作
    async fn close(&self) -> Result<(), EngineError>;
}

/// 浏览器启动器
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Browser>, EngineError>;
}

/// HTTP客户端
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, EngineError>;
}

/// 受限请求通道，注入给数据源使用
#[async_trait]
pub trait Requester: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, EngineError>;
}

/// 页面获取能力，注入给数据源使用
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn BrowserPage>, EngineError>;
}
