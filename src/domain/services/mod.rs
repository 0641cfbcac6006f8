// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 过滤服务（filter_service）：按包含/排除规则过滤记录
/// - 数据源适配器（source_adapter）：处理、打标签、过滤单个数据源的事件流
/// - 编排器（orchestrator）：注册数据源并合并多个数据源的事件流
pub mod filter_service;
pub mod orchestrator;
pub mod source_adapter;
