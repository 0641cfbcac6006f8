// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod fake_browser;

use fake_browser::{FakeLauncher, FakeSite};
use futures::StreamExt;
use harvestrs::domain::models::event::{EventStream, SourceEvent};
use harvestrs::domain::models::record::Record;
use harvestrs::domain::services::orchestrator::Orchestrator;
use harvestrs::engines::request_queue::RequestQueueOptions;
use harvestrs::engines::resource_broker::ResourceBroker;
use harvestrs::engines::reqwest_engine::{ReqwestClient, RequestDefaults};
use harvestrs::utils::errors::SourceError;
use harvestrs::domain::models::options::RunOptions;
use std::sync::Arc;

/// 事件流收集结果
#[derive(Debug, Default)]
pub struct Collected {
    pub batches: Vec<Vec<Record>>,
    pub errors: Vec<SourceError>,
    pub ends: usize,
}

impl Collected {
    pub fn records(&self) -> Vec<&Record> {
        self.batches.iter().flatten().collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }
}

/// 读取事件流直到结束
pub async fn collect(mut stream: EventStream) -> Collected {
    let mut collected = Collected::default();
    while let Some(event) = stream.next().await {
        match event {
            SourceEvent::Data(records) => collected.batches.push(records),
            SourceEvent::Error(error) => collected.errors.push(error),
            SourceEvent::End => collected.ends += 1,
        }
    }
    collected
}

pub fn http_client() -> Arc<ReqwestClient> {
    Arc::new(ReqwestClient::new(&RequestDefaults::default()).unwrap())
}

pub fn broker(launcher: Arc<FakeLauncher>) -> Arc<ResourceBroker> {
    Arc::new(ResourceBroker::new(
        launcher,
        http_client(),
        RequestQueueOptions::default(),
    ))
}

/// 基于模拟站点的编排器
pub struct Harness {
    pub launcher: Arc<FakeLauncher>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(site: FakeSite) -> Self {
        Self::with_launcher(FakeLauncher::new(site))
    }

    pub fn with_launcher(launcher: FakeLauncher) -> Self {
        let launcher = Arc::new(launcher);
        let orchestrator = Orchestrator::new(broker(launcher.clone()), RunOptions::default());
        Self {
            launcher,
            orchestrator,
        }
    }

    pub async fn run(&self, options: RunOptions) -> Collected {
        collect(self.orchestrator.get_data(options)).await
    }
}
