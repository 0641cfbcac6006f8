// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 可复用的数据源抽象实现
///
/// - 列表爬虫（list_crawler）：基于浏览器页面的 链接/分页/子列表 爬取
/// - XML订阅源（xml_feed）：通过请求通道获取并解析XML订阅源
/// - 声明式定义（definition）：从YAML加载基于抽象实现的数据源
pub mod definition;
pub mod list_crawler;
pub mod xml_feed;
pub mod xml_tree;
