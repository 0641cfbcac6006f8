// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 错误类型模块
///
/// 定义各层使用的错误类型
pub mod errors;

/// 日志初始化
pub mod telemetry;
