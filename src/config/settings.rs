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

use crate::domain::models::options::RunOptions;
use crate::engines::chromium_engine::BrowserOptions;
use crate::engines::request_queue::RequestQueueOptions;
use crate::engines::reqwest_engine::RequestDefaults;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 应用程序配置设置
///
/// 包含浏览器、请求队列、默认请求参数、默认运行选项和数据源定义文件等配置项
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 浏览器配置
    pub browser: BrowserOptions,
    /// 进程级请求队列配置
    pub request_queue: RequestQueueOptions,
    /// 默认请求参数
    pub request_defaults: RequestDefaults,
    /// 默认运行选项
    pub run: RunOptions,
    /// 数据源定义文件路径
    pub sources_file: Option<String>,
    /// 日志配置
    pub log: LogSettings,
}

/// 日志配置设置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// 是否输出JSON格式日志
    pub json: bool,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次加载内置默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和
    /// `HARVESTRS__` 前缀的环境变量，后者覆盖前者
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("HARVESTRS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// 从指定文件加载配置，不读取环境变量
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // Browser
            .set_default("browser.headless", true)?
            .set_default("browser.timeout", 10_000)?
            // Request channel
            .set_default("request_queue.concurrency", 10)?
            .set_default("request_queue.delay", 0)?
            // Requests
            .set_default("request_defaults.timeout_ms", 30_000)?
            .set_default("request_defaults.skip_tls_verification", false)?
            .set_default("log.json", false)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
