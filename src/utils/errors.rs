// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::EngineError;
use thiserror::Error;

/// 爬取错误类型
///
/// 爬取状态机每一步的分类错误，只影响当前分支
#[derive(Error, Debug, Clone)]
pub enum CrawlError {
    /// 导航超时
    #[error("Navigation Timeout Exceeded ({url}): {timeout_ms}ms exceeded")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// 导航返回错误状态码
    #[error("HTTP {status} ({url}): {status_text}")]
    NavigationHttp {
        url: String,
        status: u16,
        status_text: String,
    },

    /// 等待选择器超时
    #[error("waiting for selector \"{selector}\" failed: timeout {timeout_ms}ms exceeded")]
    SelectorTimeout { selector: String, timeout_ms: u64 },

    /// 等待有效数据超时
    #[error("Timed out while waiting for valid data")]
    InvalidDataTimeout,

    /// 列表节点配置无效
    #[error("Invalid list configuration: {0}")]
    InvalidListNode(String),

    /// 用户解析逻辑失败
    #[error("Failed to parse data: {0}")]
    Parse(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CrawlError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::NavigationTimeout { .. } | CrawlError::NavigationHttp { .. } => {
                ErrorKind::Navigation
            }
            CrawlError::SelectorTimeout { .. } => ErrorKind::SelectorTimeout,
            CrawlError::InvalidDataTimeout => ErrorKind::InvalidData,
            CrawlError::InvalidListNode(_) => ErrorKind::Configuration,
            CrawlError::Parse(_) => ErrorKind::Parse,
            CrawlError::Engine(_) => ErrorKind::Engine,
        }
    }
}

/// 编排器错误类型
///
/// 注册与调用阶段的编程错误，同步返回给调用方
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Invalid source name: \"{0}\"")]
    InvalidSourceName(String),

    #[error("Source already exists: \"{0}\"")]
    SourceExists(String),

    #[error("Data source does not exist: \"{0}\"")]
    SourceNotFound(String),
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 配置错误（无效列表节点、缺少必需选项）
    Configuration,
    /// 导航失败
    Navigation,
    /// 等待选择器超时
    SelectorTimeout,
    /// 等待有效数据超时
    InvalidData,
    /// 用户解析或处理逻辑失败
    Parse,
    /// HTTP请求失败
    Request,
    /// 浏览器或资源错误
    Engine,
    /// 数据源自身报告的错误
    Source,
}

/// 数据源错误事件
///
/// 通过事件流传递给调用方，`message` 即展示给用户的完整消息
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SourceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 数据源自身报告的错误
    pub fn reported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Source, message)
    }

    /// 缺少必需选项
    pub fn missing_option(source: &str, key: &str, requirement: &str) -> Self {
        Self::new(
            ErrorKind::Configuration,
            format!(
                "Missing required option (`option.sourceOptions.{}.{}`): {}",
                source, key, requirement
            ),
        )
    }

    /// 在消息前加上数据源名称
    pub fn namespaced(mut self, source: &str) -> Self {
        self.message = format!("[{}] {}", source, self.message);
        self
    }
}

impl From<CrawlError> for SourceError {
    fn from(error: CrawlError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<EngineError> for SourceError {
    fn from(error: EngineError) -> Self {
        let kind = match error {
            EngineError::RequestFailed(_) | EngineError::Timeout => ErrorKind::Request,
            _ => ErrorKind::Engine,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<OrchestratorError> for SourceError {
    fn from(error: OrchestratorError) -> Self {
        Self::new(ErrorKind::Configuration, error.to_string())
    }
}

/// 数据源定义加载错误
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to read source definitions: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid source definitions: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Registry(#[from] OrchestratorError),
}
