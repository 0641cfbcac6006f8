// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;

/// 数据记录
///
/// 开放的键值结构，最终会被加上 `source` 字段
pub type Record = serde_json::Map<String, Value>;

/// 数据源名称字段
pub const SOURCE_FIELD: &str = "source";

/// 判断值是否为真值
///
/// `null`、`false`、`0`、空字符串视为假值，数组和对象总是真值
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// 值的文本形式，用于集合成员比较
///
/// `1`、`1.0` 与 `"1"` 得到相同的键
pub fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f == 0.0 => "0".to_string(),
            // Integral floats print without a fraction, up to where exponent notation starts
            Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{:.0}", f),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(value_key).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}
