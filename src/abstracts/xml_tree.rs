// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::{Map, Value};
use thiserror::Error;
use xmlparser::{ElementEnd, Token, Tokenizer};

/// 属性键
pub const ATTRIBUTES_KEY: &str = "$";
/// 混合内容元素的文本键
pub const TEXT_KEY: &str = "_";

/// XML解析错误
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Invalid XML: {0}")]
    Syntax(#[from] xmlparser::Error),

    #[error("Unexpected closing tag </{found}>, expected </{expected}>")]
    Mismatched { expected: String, found: String },

    #[error("Unclosed element <{0}>")]
    Unclosed(String),

    #[error("Document has no root element")]
    NoRoot,
}

#[derive(Default)]
struct Frame {
    name: String,
    attributes: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Frame::default()
        }
    }

    /// 元素转换为通用树节点
    ///
    /// 只有文本的元素折叠为字符串，其余元素为对象：
    /// 子元素按名称组成数组，属性在 `$` 下，文本在 `_` 下
    fn into_value(self) -> Value {
        let has_text = !self.text.trim().is_empty();
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(if has_text { self.text } else { String::new() });
        }

        let mut object = Map::new();
        if !self.attributes.is_empty() {
            object.insert(ATTRIBUTES_KEY.to_string(), Value::Object(self.attributes));
        }
        if has_text {
            object.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        object.extend(self.children);
        Value::Object(object)
    }
}

fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

/// 解码XML实体
fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find(';') else {
            out.push_str(after);
            return out;
        };

        let entity = &after[1..end];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16))
                .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse::<u32>()))
                .and_then(|code| code.ok())
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&after[..=end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// 将XML文档解析为通用树
///
/// 返回 `{根元素名: 根元素}`
pub fn parse_xml(xml: &str) -> Result<Value, XmlError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    for token in Tokenizer::from(xml) {
        match token? {
            Token::ElementStart { prefix, local, .. } => {
                stack.push(Frame::new(qualified(prefix.as_str(), local.as_str())));
            }
            Token::Attribute {
                prefix,
                local,
                value,
                ..
            } => {
                if let Some(frame) = stack.last_mut() {
                    frame.attributes.insert(
                        qualified(prefix.as_str(), local.as_str()),
                        Value::String(unescape(value.as_str())),
                    );
                }
            }
            Token::ElementEnd { end, .. } => {
                let closing = match end {
                    ElementEnd::Open => continue,
                    ElementEnd::Close(prefix, local) => Some(qualified(prefix.as_str(), local.as_str())),
                    ElementEnd::Empty => None,
                };

                let frame = stack.pop().ok_or(XmlError::NoRoot)?;
                if let Some(found) = closing {
                    if found != frame.name {
                        return Err(XmlError::Mismatched {
                            expected: frame.name,
                            found,
                        });
                    }
                }

                let name = frame.name.clone();
                let value = frame.into_value();
                match stack.last_mut() {
                    Some(parent) => {
                        let siblings = parent
                            .children
                            .entry(name)
                            .or_insert_with(|| Value::Array(Vec::new()));
                        if let Value::Array(siblings) = siblings {
                            siblings.push(value);
                        }
                    }
                    None => root = Some((name, value)),
                }
            }
            Token::Text { text } => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&unescape(text.as_str()));
                }
            }
            Token::Cdata { text, .. } => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(text.as_str());
                }
            }
            _ => {}
        }
    }

    if let Some(frame) = stack.pop() {
        return Err(XmlError::Unclosed(frame.name));
    }

    let (name, value) = root.ok_or(XmlError::NoRoot)?;
    let mut document = Map::new();
    document.insert(name, value);
    Ok(Value::Object(document))
}

/// 按斜杠分隔的路径取值，数字段索引数组
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// 路径上的值作为列表：数组原样返回，单个值视为一个元素
pub fn values_at_path<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    match value_at_path(value, path) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}
