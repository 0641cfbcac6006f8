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

use crate::domain::models::event::{event_channel, EventSink, EventStream, SourceEvent};
use crate::domain::models::options::RunOptions;
use crate::domain::models::source::{Source, SourceInfo};
use crate::domain::services::source_adapter::SourceAdapter;
use crate::engines::resource_broker::ResourceBroker;
use crate::engines::traits::{EngineError, PageProvider};
use crate::utils::errors::OrchestratorError;
use futures::future::join_all;
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// 数据源编排器
///
/// 维护数据源注册表，在一次运行中把选中的数据源分发出去
/// （按顺序或并发），合并所有数据和错误事件，
/// 所有数据源结束后产出唯一的 `End`
pub struct Orchestrator {
    sources: RwLock<Vec<Source>>,
    broker: Arc<ResourceBroker>,
    defaults: RunOptions,
}

impl Orchestrator {
    /// 创建编排器
    ///
    /// # 参数
    ///
    /// * `broker` - 共享资源管理器
    /// * `defaults` - 默认运行配置，每次运行的配置合并在其之上
    pub fn new(broker: Arc<ResourceBroker>, defaults: RunOptions) -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            broker,
            defaults,
        }
    }

    pub fn broker(&self) -> &Arc<ResourceBroker> {
        &self.broker
    }

    /// 注册数据源
    ///
    /// # 返回值
    ///
    /// * `Err(OrchestratorError::InvalidSourceName)` - 名称为空
    /// * `Err(OrchestratorError::SourceExists)` - 名称已注册
    pub fn add_source(&self, source: Source) -> Result<(), OrchestratorError> {
        if source.name.is_empty() {
            return Err(OrchestratorError::InvalidSourceName(source.name));
        }

        let mut sources = self.sources.write();
        if sources.iter().any(|s| s.name == source.name) {
            return Err(OrchestratorError::SourceExists(source.name));
        }
        debug!(source = %source.name, "Source registered");
        sources.push(source);
        Ok(())
    }

    pub fn source_exists(&self, name: &str) -> bool {
        self.sources.read().iter().any(|s| s.name == name)
    }

    /// 按注册顺序列出通过白名单/黑名单的数据源
    pub fn list_sources(&self, options: &RunOptions) -> Vec<SourceInfo> {
        let resolved = options.resolve(&self.defaults);
        self.sources
            .read()
            .iter()
            .filter(|s| resolved.allows(&s.name))
            .map(Source::info)
            .collect()
    }

    /// 从所有选中的数据源获取数据
    ///
    /// 必须在tokio运行时中调用。返回的事件流在所有数据源结束后
    /// 恰好产出一个 `End`，没有选中任何数据源时也是如此
    pub fn get_data(&self, options: RunOptions) -> EventStream {
        let resolved = options.resolve(&self.defaults);
        let sources: Vec<Source> = self
            .sources
            .read()
            .iter()
            .filter(|s| resolved.allows(&s.name))
            .cloned()
            .collect();

        let requester = self.broker.request_channel(resolved.request_queue);
        let pages: Arc<dyn PageProvider> = self.broker.clone();
        let (sink, stream) = event_channel();

        let span = info_span!("run", run_id = %Uuid::new_v4());
        span.in_scope(|| {
            info!(
                sources = sources.len(),
                series = resolved.series,
                sample = resolved.sample,
                "Starting run"
            )
        });

        tokio::spawn(async move {
            let run_source = |source: Source| {
                let adapter = SourceAdapter::new(source, resolved.clone());
                forward(adapter.run(requester.clone(), pages.clone()), sink.clone())
            };

            if resolved.series {
                for source in sources {
                    if sink.is_closed() {
                        break;
                    }
                    run_source(source).await;
                }
            } else {
                join_all(sources.into_iter().map(run_source)).await;
            }

            info!("Run finished");
            sink.end();
        }
        .instrument(span));

        stream
    }

    /// 从单个数据源获取数据
    ///
    /// # 返回值
    ///
    /// * `Ok(stream)` - 恰好以一个 `End` 结束的事件流
    /// * `Err(OrchestratorError::SourceNotFound)` - 数据源不存在
    pub fn get_data_from_source(
        &self,
        name: &str,
        options: RunOptions,
    ) -> Result<EventStream, OrchestratorError> {
        let source = self
            .sources
            .read()
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| OrchestratorError::SourceNotFound(name.to_string()))?;

        let resolved = options.resolve(&self.defaults);
        let requester = self.broker.request_channel(resolved.request_queue);
        let adapter = SourceAdapter::new(source, resolved);
        Ok(adapter.run(requester, self.broker.clone()))
    }

    /// 关闭共享资源，可重复调用
    pub async fn close(&self) -> Result<(), EngineError> {
        self.broker.close().await
    }
}

/// 把单个数据源的数据与错误转发到运行的事件流
async fn forward(mut stream: EventStream, sink: EventSink) {
    loop {
        let event = tokio::select! {
            event = stream.next() => event,
            _ = sink.closed() => return,
        };
        match event {
            Some(SourceEvent::Data(records)) => {
                sink.data(records);
            }
            Some(SourceEvent::Error(error)) => {
                sink.error(error);
            }
            Some(SourceEvent::End) | None => return,
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
