//! 实体参数的递归下降拆分与分类。
//!
//! 参数文本按顶层逗号拆分，拆分时跟踪括号深度与单引号字符串状态；
//! 每一段再按固定顺序分类为 [`Value`]。

use once_cell::sync::Lazy;
use regex::Regex;

/// 列表与内联类型值允许的最大嵌套深度。
const MAX_NESTING: usize = 64;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?$").expect("number pattern"));
static ENUMERATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.([A-Za-z0-9_]+)\.$").expect("enumeration pattern"));
static TYPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^([A-Z_][A-Z0-9_]*)\s*\((.*)\)$").expect("typed value pattern"));

/// 参数值。每个消费点都应穷尽匹配，以免新增种类被静默忽略。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Reference(u32),
    Str(String),
    Number(f64),
    Bool(bool),
    Enum(String),
    List(Vec<Value>),
    /// 内联类型值，例如 `CARTESIAN_POINT('', (0, 0, 0))`。
    Typed { name: String, params: Vec<Value> },
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Reference(_) => "reference",
            Value::Str(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Enum(_) => "enumeration",
            Value::List(_) => "list",
            Value::Typed { .. } => "typed value",
        }
    }
}

/// 单个参数的解析失败，只影响该参数本身。
#[derive(Debug, Clone, PartialEq)]
pub enum ParamError {
    Unterminated,
    Invalid(String),
}

/// 将 `(` 与 `)` 之间的参数文本拆分为逐段结果。空文本返回空列表。
pub fn parse_params(text: &str) -> Vec<Result<Value, ParamError>> {
    parse_params_at(text, 0)
}

fn parse_params_at(text: &str, depth: usize) -> Vec<Result<Value, ParamError>> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    split_top_level(text)
        .into_iter()
        .map(|segment| classify(segment, depth))
        .collect()
}

/// 按顶层逗号切分；引号内与括号内的逗号不参与切分。
/// 字符串不跨行，未闭合的引号在换行处结束。
fn split_top_level(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if in_string {
            match ch {
                '\\' => {
                    if let Some(&(_, '\'')) = chars.peek() {
                        chars.next();
                    }
                }
                '\'' | '\n' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '\'' => in_string = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                segments.push(&text[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    segments.push(&text[start..]);
    segments
}

fn classify(segment: &str, depth: usize) -> Result<Value, ParamError> {
    let raw = segment.trim();
    if raw.is_empty() || raw == "$" || raw == "*" {
        return Ok(Value::Null);
    }
    if let Some(digits) = raw.strip_prefix('#') {
        return digits
            .trim()
            .parse::<u32>()
            .map(Value::Reference)
            .map_err(|_| ParamError::Invalid(format!("无效的实体引用 \"{raw}\"")));
    }
    if NUMBER.is_match(raw) {
        return raw
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| ParamError::Invalid(format!("无效的数值 \"{raw}\"")));
    }
    if raw.starts_with('\'') {
        return parse_quoted(raw).map(Value::Str);
    }
    match raw {
        ".T." | ".TRUE." => return Ok(Value::Bool(true)),
        ".F." | ".FALSE." => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Some(caps) = ENUMERATION.captures(raw) {
        return Ok(Value::Enum(caps[1].to_string()));
    }
    if raw.starts_with('(') {
        let inner = raw
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| ParamError::Invalid(format!("列表括号不匹配 \"{raw}\"")))?;
        return nested(inner, depth).map(Value::List);
    }
    if let Some(caps) = TYPED.captures(raw) {
        let name = caps[1].to_string();
        let params = nested(caps.get(2).map_or("", |m| m.as_str()), depth)?;
        return Ok(Value::Typed { name, params });
    }
    Ok(Value::Str(raw.to_string()))
}

fn nested(inner: &str, depth: usize) -> Result<Vec<Value>, ParamError> {
    if depth + 1 >= MAX_NESTING {
        return Err(ParamError::Invalid(format!("嵌套超过 {MAX_NESTING} 层")));
    }
    parse_params_at(inner, depth + 1).into_iter().collect()
}

/// 解析单引号字符串，`\'` 是唯一的转义。闭合引号之后不允许再有内容。
fn parse_quoted(raw: &str) -> Result<String, ParamError> {
    let mut content = String::new();
    let mut chars = raw.char_indices().skip(1).peekable();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' if matches!(chars.peek(), Some(&(_, '\''))) => {
                chars.next();
                content.push('\'');
            }
            '\'' => {
                let rest = raw[idx + 1..].trim();
                if rest.is_empty() {
                    return Ok(content);
                }
                return Err(ParamError::Invalid(format!(
                    "字符串后存在多余内容 \"{rest}\""
                )));
            }
            '\n' => return Err(ParamError::Unterminated),
            other => content.push(other),
        }
    }
    Err(ParamError::Unterminated)
}

/// 写出字符串字面量时使用的转义，与 [`parse_quoted`] 对应。
pub fn escape_string(value: &str) -> String {
    value.replace('\'', "\\'")
}
