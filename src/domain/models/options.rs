// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::record::Record;
use crate::domain::services::filter_service::FilterSpec;
use crate::engines::request_queue::RequestQueueOptions;
use crate::engines::traits::{PageProvider, Requester};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 记录处理函数
///
/// 在过滤之前对每条记录调用；返回 `Ok(None)` 表示丢弃该记录
pub type ProcessFn = Arc<dyn Fn(Record) -> anyhow::Result<Option<Record>> + Send + Sync>;

/// 过滤模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// 缺少字段的记录不能通过包含规则
    #[default]
    Strict,
    /// 缺少字段（或字段为假值）的记录跳过该字段的规则
    Loose,
}

/// 过滤规则
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub mode: Option<FilterMode>,
    /// 字段 -> 允许的值
    pub include: HashMap<String, Vec<Value>>,
    /// 字段 -> 排除的值
    pub exclude: HashMap<String, Vec<Value>>,
}

impl FilterOptions {
    /// 将当前规则合并到默认规则之上，包含与排除规则按字段合并
    pub fn merged_over(&self, defaults: &FilterOptions) -> FilterOptions {
        let mut include = defaults.include.clone();
        include.extend(self.include.clone());
        let mut exclude = defaults.exclude.clone();
        exclude.extend(self.exclude.clone());
        FilterOptions {
            mode: self.mode.or(defaults.mode),
            include,
            exclude,
        }
    }
}

/// 单次运行的配置
///
/// 未设置的字段使用编排器的默认配置
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// 所有数据源（以及数据源内部的异步操作）按顺序执行
    pub series: Option<bool>,
    /// 采样模式
    pub sample: Option<bool>,
    /// 采样模式下每批数据的最大记录数
    pub sample_data_limit: Option<usize>,
    pub filter: FilterOptions,
    /// 只运行这些数据源，优先于黑名单
    pub sources_white_list: Option<Vec<String>>,
    /// 不运行这些数据源
    pub sources_black_list: Option<Vec<String>>,
    /// 数据源名称 -> 该数据源的选项
    pub source_options: HashMap<String, Map<String, Value>>,
    /// 为本次运行创建独立的请求通道
    pub request_queue: Option<RequestQueueOptions>,
    /// 记录处理函数
    #[serde(skip)]
    pub process: Option<ProcessFn>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("series", &self.series)
            .field("sample", &self.sample)
            .field("sample_data_limit", &self.sample_data_limit)
            .field("filter", &self.filter)
            .field("sources_white_list", &self.sources_white_list)
            .field("sources_black_list", &self.sources_black_list)
            .field("source_options", &self.source_options)
            .field("request_queue", &self.request_queue)
            .field("process", &self.process.is_some())
            .finish()
    }
}

/// 采样模式下的默认批次上限
pub const DEFAULT_SAMPLE_DATA_LIMIT: usize = 10;

impl RunOptions {
    pub fn series(mut self, series: bool) -> Self {
        self.series = Some(series);
        self
    }

    pub fn sample(mut self, sample: bool) -> Self {
        self.sample = Some(sample);
        self
    }

    pub fn with_filter(mut self, filter: FilterOptions) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_source_options(mut self, source: impl Into<String>, options: Map<String, Value>) -> Self {
        self.source_options.insert(source.into(), options);
        self
    }

    pub fn with_process<F>(mut self, process: F) -> Self
    where
        F: Fn(Record) -> anyhow::Result<Option<Record>> + Send + Sync + 'static,
    {
        self.process = Some(Arc::new(process));
        self
    }

    /// 合并到默认配置之上，得到不可变的运行配置
    pub fn resolve(&self, defaults: &RunOptions) -> ResolvedOptions {
        let filter = self.filter.merged_over(&defaults.filter);
        let mut source_options = defaults.source_options.clone();
        source_options.extend(self.source_options.clone());

        ResolvedOptions {
            series: self.series.or(defaults.series).unwrap_or(false),
            sample: self.sample.or(defaults.sample).unwrap_or(false),
            sample_data_limit: self
                .sample_data_limit
                .or(defaults.sample_data_limit)
                .unwrap_or(DEFAULT_SAMPLE_DATA_LIMIT),
            filter: Arc::new(FilterSpec::new(&filter)),
            sources_white_list: self
                .sources_white_list
                .clone()
                .or_else(|| defaults.sources_white_list.clone()),
            sources_black_list: self
                .sources_black_list
                .clone()
                .or_else(|| defaults.sources_black_list.clone()),
            source_options,
            request_queue: self.request_queue.or(defaults.request_queue),
            process: self.process.clone().or_else(|| defaults.process.clone()),
        }
    }
}

/// 合并后的运行配置
///
/// 过滤规则在此构建一次，供本次运行的所有数据源共享
#[derive(Clone)]
pub struct ResolvedOptions {
    pub series: bool,
    pub sample: bool,
    pub sample_data_limit: usize,
    pub filter: Arc<FilterSpec>,
    pub sources_white_list: Option<Vec<String>>,
    pub sources_black_list: Option<Vec<String>>,
    pub source_options: HashMap<String, Map<String, Value>>,
    pub request_queue: Option<RequestQueueOptions>,
    pub process: Option<ProcessFn>,
}

impl ResolvedOptions {
    /// 数据源是否通过白名单/黑名单
    ///
    /// 设置了白名单时只看白名单
    pub fn allows(&self, name: &str) -> bool {
        if let Some(ref white_list) = self.sources_white_list {
            return white_list.iter().any(|n| n == name);
        }
        if let Some(ref black_list) = self.sources_black_list {
            return !black_list.iter().any(|n| n == name);
        }
        true
    }

    /// 运行时为某个数据源提供的选项（不含数据源默认值）
    pub fn run_source_options(&self, name: &str) -> Option<&Map<String, Value>> {
        self.source_options.get(name)
    }
}

/// 单次数据源调用的冻结配置
///
/// 数据源只通过注入的能力访问浏览器页面与HTTP请求
#[derive(Clone)]
pub struct SourceOptions {
    /// 数据源名称
    pub name: String,
    pub series: bool,
    pub sample: bool,
    pub sample_data_limit: usize,
    /// 数据源自己的选项：运行选项合并到数据源默认选项之上
    pub settings: Map<String, Value>,
    /// 请求能力
    pub requester: Arc<dyn Requester>,
    /// 页面能力
    pub pages: Arc<dyn PageProvider>,
}

impl SourceOptions {
    /// 将选项反序列化为具体的配置类型
    pub fn settings_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.settings.clone()))
    }
}

impl fmt::Debug for SourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceOptions")
            .field("name", &self.name)
            .field("series", &self.series)
            .field("sample", &self.sample)
            .field("sample_data_limit", &self.sample_data_limit)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// 合并数据源选项：`overrides` 中的键覆盖 `defaults`
pub fn merge_settings(overrides: Option<&Map<String, Value>>, defaults: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    if let Some(overrides) = overrides {
        for (k, v) in overrides {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}
