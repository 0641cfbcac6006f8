// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::CrawlError;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 文本解析函数：整段文本 -> 多个值
pub type TextParseFn = Arc<dyn Fn(&str) -> anyhow::Result<Vec<Value>> + Send + Sync>;

/// 属性解析函数：属性文本 -> 值
pub type ValueParseFn = Arc<dyn Fn(&str) -> anyhow::Result<Value> + Send + Sync>;

/// 属性值解析规则
#[derive(Clone)]
pub enum ValueParser {
    /// 正则表达式，取第一个捕获组，不匹配时为 `null`
    Pattern(Regex),
    /// 自定义函数
    Func(ValueParseFn),
}

impl ValueParser {
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(ValueParser::Pattern)
    }

    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        ValueParser::Func(Arc::new(f))
    }

    /// 解析属性文本
    pub fn apply(&self, text: &str) -> anyhow::Result<Value> {
        match self {
            ValueParser::Pattern(regex) => Ok(regex
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .map_or(Value::Null, |s| Value::String(s.to_string()))),
            ValueParser::Func(f) => f(text),
        }
    }
}

impl fmt::Debug for ValueParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueParser::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            ValueParser::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for ValueParser {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        ValueParser::pattern(&pattern).map_err(serde::de::Error::custom)
    }
}

/// 整段文本解析器
#[derive(Clone)]
pub struct TextParser(pub TextParseFn);

impl TextParser {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        TextParser(Arc::new(f))
    }

    pub fn apply(&self, text: &str) -> anyhow::Result<Vec<Value>> {
        (self.0)(text)
    }
}

impl fmt::Debug for TextParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TextParser(..)")
    }
}

/// 链接：绝对URL或可点击元素的选择器，二者只能有一个
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
}

/// 链接目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget<'a> {
    Url(&'a str),
    Selector(&'a str),
}

impl Link {
    pub fn target(&self) -> Option<LinkTarget<'_>> {
        match (&self.url, &self.selector) {
            (Some(url), None) => Some(LinkTarget::Url(url)),
            (None, Some(selector)) => Some(LinkTarget::Selector(selector)),
            _ => None,
        }
    }
}

/// 单个属性的提取规则
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeConfig {
    /// 记录中的字段名
    pub name: String,
    /// 相对条目元素的选择器
    pub selector: String,
    #[serde(default)]
    pub parse: Option<ValueParser>,
}

impl AttributeConfig {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            parse: None,
        }
    }

    pub fn with_parser(mut self, parser: ValueParser) -> Self {
        self.parse = Some(parser);
        self
    }
}

/// 条目提取规则
///
/// 声明了 `attributes` 时按条目提取属性；否则把每个匹配元素的文本交给 `parse`
#[derive(Debug, Clone, Deserialize)]
pub struct ItemsConfig {
    /// 条目根选择器
    pub selector: String,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
    #[serde(skip)]
    pub parse: Option<TextParser>,
}

impl ItemsConfig {
    /// 按属性提取
    pub fn attributes(selector: impl Into<String>, attributes: Vec<AttributeConfig>) -> Self {
        Self {
            selector: selector.into(),
            attributes,
            parse: None,
        }
    }

    /// 按整段文本提取
    pub fn text<F>(selector: impl Into<String>, parse: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        Self {
            selector: selector.into(),
            attributes: Vec::new(),
            parse: Some(TextParser::new(parse)),
        }
    }

    /// (属性名, 选择器) 列表
    pub fn attribute_selectors(&self) -> Vec<(String, String)> {
        self.attributes
            .iter()
            .map(|a| (a.name.clone(), a.selector.clone()))
            .collect()
    }

    fn validate(&self) -> Result<(), CrawlError> {
        if self.selector.trim().is_empty() {
            return Err(CrawlError::InvalidListNode(
                "items selector must not be empty".to_string(),
            ));
        }
        if self.attributes.is_empty() && self.parse.is_none() {
            return Err(CrawlError::InvalidListNode(format!(
                "items \"{}\" need attributes or a parse function",
                self.selector
            )));
        }
        Ok(())
    }
}

/// 下一页链接
#[derive(Debug, Clone, Deserialize)]
pub struct NextLink {
    pub selector: String,
}

/// 分页规则
#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub next: NextLink,
    /// 最多爬取的页数（包含第一页）
    #[serde(default)]
    pub max_pages: Option<usize>,
}

/// 列表节点
///
/// 一层 链接 -> 条目 -> 分页/子列表 的爬取配置
#[derive(Debug, Clone, Deserialize)]
pub struct ListNode {
    pub link: Link,
    #[serde(default)]
    pub items: Vec<ItemsConfig>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub lists: Option<Vec<ListNode>>,
}

impl ListNode {
    /// 以绝对URL为入口的节点
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            link: Link {
                url: Some(url.into()),
                selector: None,
            },
            items: Vec::new(),
            pagination: None,
            lists: None,
        }
    }

    /// 以点击元素为入口的节点
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            link: Link {
                url: None,
                selector: Some(selector.into()),
            },
            items: Vec::new(),
            pagination: None,
            lists: None,
        }
    }

    pub fn with_items(mut self, items: ItemsConfig) -> Self {
        self.items.push(items);
        self
    }

    pub fn with_pagination(mut self, next_selector: impl Into<String>, max_pages: Option<usize>) -> Self {
        self.pagination = Some(Pagination {
            next: NextLink {
                selector: next_selector.into(),
            },
            max_pages,
        });
        self
    }

    pub fn with_lists(mut self, lists: Vec<ListNode>) -> Self {
        self.lists = Some(lists);
        self
    }

    /// 校验本节点的结构（不递归校验子节点）
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 结构有效
    /// * `Err(CrawlError::InvalidListNode)` - 链接同时/都未指定URL与选择器，
    ///   URL不是绝对地址，或同时声明了分页与子列表，或条目规则无效
    pub fn validate(&self) -> Result<(), CrawlError> {
        match self.link.target() {
            None => {
                return Err(CrawlError::InvalidListNode(
                    "link must specify exactly one of url or selector".to_string(),
                ))
            }
            Some(LinkTarget::Url(url)) => {
                url::Url::parse(url).map_err(|e| {
                    CrawlError::InvalidListNode(format!("invalid link url \"{}\": {}", url, e))
                })?;
            }
            Some(LinkTarget::Selector(_)) => {}
        }
        if self.pagination.is_some() && self.lists.is_some() {
            return Err(CrawlError::InvalidListNode(
                "a list cannot have both pagination and lists".to_string(),
            ));
        }
        if let Some(ref pagination) = self.pagination {
            if pagination.next.selector.trim().is_empty() {
                return Err(CrawlError::InvalidListNode(
                    "pagination next selector must not be empty".to_string(),
                ));
            }
        }
        self.items.iter().try_for_each(ItemsConfig::validate)
    }
}
