// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 记录（record）：数据源产出的开放键值结构
/// - 事件（event）：数据/错误/终止事件流
/// - 数据源（source）：已注册的数据源与数据源接口
/// - 列表节点（list_node）：递归的列表爬取配置
/// - 选项（options）：运行配置与冻结的数据源调用配置
pub mod event;
pub mod list_node;
pub mod options;
pub mod record;
pub mod source;
