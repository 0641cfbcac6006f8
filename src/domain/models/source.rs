// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::event::EventStream;
use crate::domain::models::options::{merge_settings, SourceOptions};
use crate::utils::errors::SourceError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// 数据源接口
///
/// `get_data` 立即返回事件流，数据在后台任务中产出。
/// 同步返回的错误由适配器转换为错误事件
pub trait DataSource: Send + Sync {
    fn get_data(&self, options: SourceOptions) -> Result<EventStream, SourceError>;

    /// 数据源实现自带的默认选项
    fn default_options(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// 基于闭包的数据源
pub struct FnSource<F>(F);

/// 用闭包创建数据源
pub fn from_fn<F>(f: F) -> FnSource<F>
where
    F: Fn(SourceOptions) -> Result<EventStream, SourceError> + Send + Sync,
{
    FnSource(f)
}

impl<F> DataSource for FnSource<F>
where
    F: Fn(SourceOptions) -> Result<EventStream, SourceError> + Send + Sync,
{
    fn get_data(&self, options: SourceOptions) -> Result<EventStream, SourceError> {
        (self.0)(options)
    }
}

/// 已注册的数据源
#[derive(Clone)]
pub struct Source {
    pub name: String,
    pub home_url: String,
    /// 默认选项，运行时的选项合并在其之上
    pub default_options: Map<String, Value>,
    /// 必需选项：键 -> 说明
    pub required_options: BTreeMap<String, String>,
    producer: Arc<dyn DataSource>,
}

impl Source {
    /// 创建数据源，默认选项取自数据源实现
    pub fn new(name: impl Into<String>, producer: impl DataSource + 'static) -> Self {
        Self::from_arc(name, Arc::new(producer))
    }

    pub fn from_arc(name: impl Into<String>, producer: Arc<dyn DataSource>) -> Self {
        Self {
            name: name.into(),
            home_url: String::new(),
            default_options: producer.default_options(),
            required_options: BTreeMap::new(),
            producer,
        }
    }

    pub fn with_home_url(mut self, home_url: impl Into<String>) -> Self {
        self.home_url = home_url.into();
        self
    }

    /// 追加默认选项，覆盖数据源实现的同名默认值
    pub fn with_default_options(mut self, options: Map<String, Value>) -> Self {
        self.default_options = merge_settings(Some(&options), &self.default_options);
        self
    }

    pub fn with_required_option(mut self, key: impl Into<String>, requirement: impl Into<String>) -> Self {
        self.required_options.insert(key.into(), requirement.into());
        self
    }

    pub fn producer(&self) -> &Arc<dyn DataSource> {
        &self.producer
    }

    /// 对外展示的数据源信息
    pub fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name.clone(),
            home_url: self.home_url.clone(),
            default_options: self.default_options.clone(),
            required_options: self.required_options.clone(),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("home_url", &self.home_url)
            .field("default_options", &self.default_options)
            .field("required_options", &self.required_options)
            .finish_non_exhaustive()
    }
}

/// 数据源信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub home_url: String,
    pub default_options: Map<String, Value>,
    pub required_options: BTreeMap<String, String>,
}
