// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::abstracts::list_crawler::ListCrawler;
use crate::abstracts::xml_feed::{Feed, XmlFeed};
use crate::domain::models::list_node::ListNode;
use crate::domain::models::source::Source;
use crate::domain::services::orchestrator::Orchestrator;
use crate::utils::errors::DefinitionError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// 数据源使用的抽象实现及其配置
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "abstract", rename_all = "snake_case")]
pub enum AbstractDefinition {
    ListCrawler { lists: Vec<ListNode> },
    XmlFeed { feeds: Vec<Feed> },
}

/// 声明式数据源定义
///
/// 只能使用正则表达式解析规则，函数解析器需要在代码中注册数据源
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    pub name: String,
    #[serde(default)]
    pub home_url: String,
    #[serde(default)]
    pub default_options: Map<String, Value>,
    #[serde(default)]
    pub required_options: BTreeMap<String, String>,
    #[serde(flatten)]
    pub definition: AbstractDefinition,
}

#[derive(Debug, Deserialize)]
struct DefinitionsFile {
    #[serde(default)]
    sources: Vec<SourceDefinition>,
}

impl SourceDefinition {
    /// 构建数据源
    ///
    /// 定义中的默认选项覆盖抽象实现的同名默认值
    pub fn into_source(self) -> Source {
        let source = match self.definition {
            AbstractDefinition::ListCrawler { lists } => Source::new(self.name, ListCrawler::new(lists)),
            AbstractDefinition::XmlFeed { feeds } => Source::new(self.name, XmlFeed::new(feeds)),
        };

        self.required_options.into_iter().fold(
            source
                .with_home_url(self.home_url)
                .with_default_options(self.default_options),
            |source, (key, requirement)| source.with_required_option(key, requirement),
        )
    }
}

/// 解析YAML格式的数据源定义
pub fn parse_definitions(yaml: &str) -> Result<Vec<SourceDefinition>, DefinitionError> {
    let file: DefinitionsFile = serde_yaml::from_str(yaml)?;
    Ok(file.sources)
}

/// 从文件加载数据源定义
pub fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<SourceDefinition>, DefinitionError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_definitions(&contents)
}

/// 将数据源定义注册到编排器
///
/// # 返回值
///
/// * `Ok(count)` - 注册的数据源数量
/// * `Err(DefinitionError::Registry)` - 名称无效或重复
pub fn register_definitions(
    orchestrator: &Orchestrator,
    definitions: Vec<SourceDefinition>,
) -> Result<usize, DefinitionError> {
    let count = definitions.len();
    for definition in definitions {
        let name = definition.name.clone();
        orchestrator.add_source(definition.into_source())?;
        info!(source = %name, "Loaded source definition");
    }
    Ok(count)
}
