// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::options::{FilterMode, FilterOptions};
use crate::domain::models::record::{is_truthy, value_key, Record};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// 记录过滤器
///
/// 由过滤规则构建一次，值集合按文本形式存储，成员判断为O(1)。
///
/// 每个声明的字段都必须通过：
/// - 标量：包含规则要求值在集合中，排除规则要求值不在集合中
/// - 数组：包含规则要求任一元素在集合中，排除规则要求所有元素都不在集合中
/// - 严格模式：缺少字段时包含规则失败，排除规则通过
/// - 宽松模式：字段缺失或为假值时跳过该字段的规则
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    mode: FilterMode,
    include: HashMap<String, HashSet<String>>,
    exclude: HashMap<String, HashSet<String>>,
}

fn to_sets(rules: &HashMap<String, Vec<Value>>) -> HashMap<String, HashSet<String>> {
    rules
        .iter()
        .map(|(field, values)| (field.clone(), values.iter().map(value_key).collect()))
        .collect()
}

impl FilterSpec {
    pub fn new(options: &FilterOptions) -> Self {
        Self {
            mode: options.mode.unwrap_or_default(),
            include: to_sets(&options.include),
            exclude: to_sets(&options.exclude),
        }
    }

    /// 判断单条记录是否通过过滤
    ///
    /// 空记录永远不通过
    pub fn matches(&self, record: &Record) -> bool {
        if record.is_empty() {
            return false;
        }

        let strict = self.mode == FilterMode::Strict;
        let skipped = |value: Option<&Value>| !strict && !value.is_some_and(is_truthy);

        let passed_include = self.include.iter().all(|(field, set)| {
            let value = record.get(field);
            if skipped(value) {
                return true;
            }
            match value {
                Some(Value::Array(items)) => items.iter().any(|v| set.contains(&value_key(v))),
                Some(v) => set.contains(&value_key(v)),
                None => false,
            }
        });
        if !passed_include {
            return false;
        }

        self.exclude.iter().all(|(field, set)| {
            let value = record.get(field);
            if skipped(value) {
                return true;
            }
            match value {
                Some(Value::Array(items)) => items.iter().all(|v| !set.contains(&value_key(v))),
                Some(v) => !set.contains(&value_key(v)),
                None => true,
            }
        })
    }

    /// 过滤一批记录，保持原有顺序
    pub fn filter(&self, records: Vec<Record>) -> Vec<Record> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

#[cfg(test)]
#[path = "filter_service_test.rs"]
mod tests;
