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

use anyhow::Context;
use futures::StreamExt;
use harvestrs::abstracts::definition::{load_definitions, register_definitions};
use harvestrs::config::settings::Settings;
use harvestrs::domain::models::event::SourceEvent;
use harvestrs::domain::services::orchestrator::Orchestrator;
use harvestrs::engines::resource_broker::ResourceBroker;
use harvestrs::utils::telemetry;
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 主函数
///
/// 加载配置与数据源定义，运行一次全部数据源，
/// 每条记录以一行JSON输出到stdout
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // 2. Initialize logging
    telemetry::init_telemetry(settings.log.json);
    info!("Starting harvestrs...");

    // 3. Shared browser and request channel
    let broker = Arc::new(ResourceBroker::from_settings(&settings)?);
    let orchestrator = Orchestrator::new(broker, settings.run.clone());

    // 4. Register sources; a positional argument overrides the configured file
    let sources_file = std::env::args()
        .nth(1)
        .or_else(|| settings.sources_file.clone())
        .context("No sources file given (argument or `sources_file` setting)")?;
    let definitions = load_definitions(&sources_file)
        .with_context(|| format!("Failed to load sources from {}", sources_file))?;
    let count = register_definitions(&orchestrator, definitions)?;
    info!("Registered {} sources from {}", count, sources_file);

    // 5. Run once
    let mut events = orchestrator.get_data(Default::default());
    let stdout = std::io::stdout();
    let (mut records, mut errors) = (0usize, 0usize);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(SourceEvent::Data(batch)) => {
                    let mut out = stdout.lock();
                    for record in &batch {
                        writeln!(out, "{}", serde_json::to_string(record)?)?;
                    }
                    records += batch.len();
                }
                Some(SourceEvent::Error(e)) => {
                    errors += 1;
                    error!(kind = ?e.kind, "{}", e);
                }
                Some(SourceEvent::End) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
                break;
            }
        }
    }

    // 6. Release browser and request channel
    orchestrator.close().await?;
    info!(records, errors, "Run finished");

    Ok(())
}
