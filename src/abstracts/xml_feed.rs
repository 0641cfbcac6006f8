// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::abstracts::xml_tree::{parse_xml, value_at_path, values_at_path};
use crate::domain::models::event::{event_channel, EventSink, EventStream};
use crate::domain::models::list_node::ValueParser;
use crate::domain::models::options::SourceOptions;
use crate::domain::models::record::Record;
use crate::domain::models::source::DataSource;
use crate::engines::traits::HttpRequest;
use crate::utils::errors::{ErrorKind, SourceError};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// 采样模式下的分组上限
pub const SAMPLE_GROUP_LIMIT: usize = 5;
/// 采样模式下每个分组的条目上限
pub const SAMPLE_ITEM_LIMIT: usize = 10;

/// 订阅源中的数据路径
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPaths {
    /// 分组路径，如 `rss/channel`
    pub group: String,
    /// 分组内的条目路径，如 `item`
    pub item: String,
    /// 记录字段 -> 条目内的路径，如 `title/0`
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl FeedPaths {
    pub fn new(group: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            item: item.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(mut self, field: impl Into<String>, path: impl Into<String>) -> Self {
        self.attributes.insert(field.into(), path.into());
        self
    }
}

/// 单个XML订阅源
#[derive(Debug, Clone, Deserialize)]
pub struct Feed {
    pub request: HttpRequest,
    pub paths: FeedPaths,
    /// 字段 -> 解析规则，只作用于文本值
    #[serde(default)]
    pub parse_attributes: HashMap<String, ValueParser>,
}

impl Feed {
    pub fn new(request: HttpRequest, paths: FeedPaths) -> Self {
        Self {
            request,
            paths,
            parse_attributes: HashMap::new(),
        }
    }

    pub fn with_parser(mut self, field: impl Into<String>, parser: ValueParser) -> Self {
        self.parse_attributes.insert(field.into(), parser);
        self
    }

    /// 提取单个条目，路径不存在的字段被省略
    fn extract_item(&self, item: &Value) -> Result<Record, SourceError> {
        let mut record = Record::new();
        for (field, path) in &self.paths.attributes {
            let Some(value) = value_at_path(item, path) else {
                continue;
            };
            let value = match (self.parse_attributes.get(field), value) {
                (Some(parser), Value::String(text)) => parser.apply(text).map_err(|e| {
                    SourceError::new(
                        ErrorKind::Parse,
                        format!("Failed to parse \"{}\": {}", field, e),
                    )
                })?,
                (_, value) => value.clone(),
            };
            record.insert(field.clone(), value);
        }
        Ok(record)
    }

    /// 获取并解析订阅源，每个分组产出一批数据
    async fn fetch(&self, options: &SourceOptions, sink: &EventSink) -> Result<(), SourceError> {
        debug!("Fetching feed {}", self.request.url);
        let response = options.requester.request(self.request.clone()).await?;
        if response.status >= 400 {
            return Err(SourceError::new(
                ErrorKind::Request,
                format!(
                    "HTTP {} ({}): {}",
                    response.status, self.request.url, response.status_text
                ),
            ));
        }

        let tree = parse_xml(&response.body)
            .map_err(|e| SourceError::new(ErrorKind::Parse, e.to_string()))?;

        let mut groups = values_at_path(&tree, &self.paths.group);
        if options.sample {
            groups.truncate(SAMPLE_GROUP_LIMIT);
        }

        for group in groups {
            let mut items = values_at_path(group, &self.paths.item);
            if options.sample {
                items.truncate(SAMPLE_ITEM_LIMIT);
            }

            let mut records = Vec::with_capacity(items.len());
            for item in items {
                let record = self.extract_item(item)?;
                if !record.is_empty() {
                    records.push(record);
                }
            }
            if !records.is_empty() {
                sink.data(records);
            }
        }
        Ok(())
    }
}

/// XML订阅源数据源
///
/// 失败的订阅源产出错误事件，其余订阅源继续
#[derive(Debug, Clone)]
pub struct XmlFeed {
    feeds: Arc<Vec<Feed>>,
}

impl XmlFeed {
    pub fn new(feeds: Vec<Feed>) -> Self {
        Self {
            feeds: Arc::new(feeds),
        }
    }
}

impl DataSource for XmlFeed {
    fn get_data(&self, options: SourceOptions) -> Result<EventStream, SourceError> {
        let (sink, stream) = event_channel();
        let feeds = self.feeds.clone();

        tokio::spawn(async move {
            let selected = if options.sample {
                &feeds[..feeds.len().min(1)]
            } else {
                &feeds[..]
            };

            if options.series {
                for feed in selected {
                    if let Err(e) = feed.fetch(&options, &sink).await {
                        sink.error(e);
                    }
                }
            } else {
                let options = &options;
                let sink = &sink;
                join_all(selected.iter().map(|feed| async move {
                    if let Err(e) = feed.fetch(options, sink).await {
                        sink.error(e);
                    }
                }))
                .await;
            }
            sink.end();
        });

        Ok(stream)
    }
}
