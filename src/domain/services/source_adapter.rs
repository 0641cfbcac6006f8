// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::event::{event_channel, EventSink, EventStream, SourceEvent};
use crate::domain::models::options::{merge_settings, ResolvedOptions, SourceOptions};
use crate::domain::models::record::{Record, SOURCE_FIELD};
use crate::domain::models::source::Source;
use crate::engines::resource_broker::PageScope;
use crate::engines::traits::{PageProvider, Requester};
use crate::utils::errors::{ErrorKind, SourceError};
use futures::StreamExt;
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 数据源适配器
///
/// 包装单个数据源的事件流：
/// - 先处理、再打标签、再过滤，最后按采样上限截断
/// - 错误消息加上数据源名称前缀
/// - 无论数据源产出零个、多个终止事件还是同步失败，都只产出一个 `End`
/// - 结束时释放数据源的事件流并关闭它打开的页面
pub struct SourceAdapter {
    source: Source,
    options: ResolvedOptions,
}

impl SourceAdapter {
    pub fn new(source: Source, options: ResolvedOptions) -> Self {
        Self { source, options }
    }

    /// 校验必需选项
    ///
    /// 只检查运行时提供的选项，数据源默认值不能满足必需选项
    pub fn check_required_options(&self) -> Result<(), SourceError> {
        let provided = self.options.run_source_options(&self.source.name);
        for (key, requirement) in &self.source.required_options {
            if !provided.is_some_and(|options| options.contains_key(key)) {
                return Err(SourceError::missing_option(
                    &self.source.name,
                    key,
                    requirement,
                ));
            }
        }
        Ok(())
    }

    /// 构建本次调用的冻结配置
    fn source_options(
        &self,
        requester: Arc<dyn Requester>,
        pages: Arc<dyn PageProvider>,
    ) -> SourceOptions {
        SourceOptions {
            name: self.source.name.clone(),
            series: self.options.series,
            sample: self.options.sample,
            sample_data_limit: self.options.sample_data_limit,
            settings: merge_settings(
                self.options.run_source_options(&self.source.name),
                &self.source.default_options,
            ),
            requester,
            pages,
        }
    }

    /// 运行数据源
    ///
    /// 必须在tokio运行时中调用
    ///
    /// # 参数
    ///
    /// * `requester` - 本次运行使用的请求通道
    /// * `provider` - 页面来源
    ///
    /// # 返回值
    ///
    /// 恰好以一个 `End` 结束的事件流
    pub fn run(self, requester: Arc<dyn Requester>, provider: Arc<dyn PageProvider>) -> EventStream {
        let (sink, stream) = event_channel();
        let name = self.source.name.clone();

        if let Err(error) = self.check_required_options() {
            warn!(source = %name, "{}", error);
            self.emit_error(&sink, error);
            sink.end();
            return stream;
        }

        let pages = Arc::new(PageScope::new(provider));
        let options = self.source_options(requester, pages.clone());
        debug!(source = %name, "Getting data from source");

        match self.source.producer().get_data(options) {
            Ok(inner) => {
                tokio::spawn(self.pump(inner, sink, pages));
            }
            Err(error) => {
                self.emit_error(&sink, error);
                tokio::spawn(async move {
                    pages.close_all().await;
                    sink.end();
                });
            }
        }

        stream
    }

    async fn pump(self, mut inner: EventStream, sink: EventSink, pages: Arc<PageScope>) {
        let name = self.source.name.clone();
        let mut emitted = 0usize;
        let mut errors = 0usize;

        loop {
            let event = tokio::select! {
                event = inner.next() => event,
                _ = sink.closed() => {
                    debug!(source = %name, "Consumer stopped listening");
                    break;
                }
            };

            match event {
                Some(SourceEvent::Data(records)) => {
                    let (records, failures) = self.prepare_batch(records);
                    for failure in failures {
                        errors += 1;
                        self.emit_error(&sink, failure);
                    }
                    if !records.is_empty() {
                        emitted += records.len();
                        counter!("harvestrs_records_total", "source" => name.clone())
                            .increment(records.len() as u64);
                        sink.data(records);
                    }
                }
                Some(SourceEvent::Error(error)) => {
                    errors += 1;
                    self.emit_error(&sink, error);
                }
                Some(SourceEvent::End) | None => break,
            }
        }

        drop(inner);
        pages.close_all().await;
        info!(source = %name, records = emitted, errors = errors, "Source finished");
        sink.end();
    }

    fn emit_error(&self, sink: &EventSink, error: SourceError) {
        counter!("harvestrs_source_errors_total", "source" => self.source.name.clone())
            .increment(1);
        sink.error(error.namespaced(&self.source.name));
    }

    /// 处理、打标签、过滤并截断一批记录
    ///
    /// 处理函数的失败作为错误返回，不影响同批的其他记录
    pub fn prepare_batch(&self, records: Vec<Record>) -> (Vec<Record>, Vec<SourceError>) {
        let mut failures = Vec::new();
        let mut prepared = Vec::with_capacity(records.len());

        for record in records {
            let record = match self.options.process {
                Some(ref process) => match process(record) {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(e) => {
                        failures.push(SourceError::new(
                            ErrorKind::Parse,
                            format!("Failed to process data: {}", e),
                        ));
                        continue;
                    }
                },
                None => record,
            };

            if record.is_empty() {
                continue;
            }

            let mut record = record;
            record.insert(
                SOURCE_FIELD.to_string(),
                Value::String(self.source.name.clone()),
            );
            prepared.push(record);
        }

        let mut filtered = self.options.filter.filter(prepared);
        if self.options.sample && self.options.sample_data_limit > 0 {
            filtered.truncate(self.options.sample_data_limit);
        }
        (filtered, failures)
    }
}

#[cfg(test)]
#[path = "source_adapter_test.rs"]
mod tests;
