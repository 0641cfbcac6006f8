// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 抽象实现模块
///
/// 提供可复用的爬取模式，具体数据源通过配置而不是重新实现来使用
pub mod abstracts;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含数据源、事件流、运行选项，以及过滤、适配和编排服务
pub mod domain;

/// 引擎模块
///
/// 实现浏览器与HTTP能力，以及管理它们生命周期的资源管理器
pub mod engines;

/// 工具模块
///
/// 提供错误类型与日志初始化
pub mod utils;
