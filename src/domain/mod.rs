// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// - 领域模型（models）：记录、事件流、数据源、列表节点与运行配置
/// - 服务（services）：过滤、数据源适配与多数据源编排
///
/// 领域层只通过 `engines::traits` 中的能力接口访问浏览器与网络
pub mod models;
pub mod services;
