//! # Display Name Module / 显示名称模块
//!
//! Canonical literal rendering of case arguments into stable, collision
//! resistant display names. Parameterized case names are generated by
//! interpolating the rendered argument list into the method name; the same
//! name is later used to look the case back up in the built tree, so the
//! rendering must be a total function over the build-time case set.
//!
//! 将用例参数按规范字面量渲染为稳定、抗冲突的显示名称。
//! 参数化用例名称通过将渲染后的参数列表插入方法名生成；
//! 同一名称随后用于在构建的树中查找用例，
//! 因此渲染必须是构建期用例集合上的全函数。

use crate::core::expansion::ArgValue;

const THREE_DOTS: &str = "...";

/// Arrays render at most this many leading elements before summarizing.
const MAX_ARRAY_ITEMS: usize = 5;

/// Default cap on rendered string literal length.
/// 渲染字符串字面量长度的默认上限。
pub const DEFAULT_STRING_MAX: usize = 250;

/// Builds the display name of one case: `method(arg1,arg2,...)`.
pub fn case_name(method_name: &str, args: &[ArgValue]) -> String {
    let rendered: Vec<String> = args
        .iter()
        .map(|arg| value_string(arg, DEFAULT_STRING_MAX))
        .collect();
    format!("{}({})", method_name, rendered.join(","))
}

/// Renders one argument as a literal.
///
/// Primitives render as literals, strings are quoted and escaped (truncated
/// with a trailing `...` beyond `string_max`), null renders as the literal
/// `null`, arrays beyond five elements are summarized with a trailing
/// ellipsis marker, and multi-dimensional arrays render as their type name.
///
/// 将一个参数渲染为字面量。
/// 基础类型渲染为字面量，字符串加引号并转义（超过 `string_max` 时以 `...`
/// 截断），null 渲染为字面量 `null`，超过五个元素的数组以尾部省略号标记
/// 概括，多维数组渲染为其类型名。
pub fn value_string(arg: &ArgValue, string_max: usize) -> String {
    match arg {
        ArgValue::Null => "null".to_string(),
        ArgValue::Bool(b) => b.to_string(),
        ArgValue::Int(i) => i.to_string(),
        ArgValue::Float(f) => float_string(*f),
        ArgValue::Char(c) => format!("'{}'", escape_char(*c)),
        ArgValue::Str(s) => quoted_string(s, string_max),
        ArgValue::Array(items) => array_string(items, string_max),
        ArgValue::Matrix { type_name } => type_name.clone(),
    }
}

fn float_string(f: f64) -> String {
    if f.is_nan() {
        return "f64::NAN".to_string();
    }
    if f == f64::INFINITY {
        return "f64::INFINITY".to_string();
    }
    if f == f64::NEG_INFINITY {
        return "f64::NEG_INFINITY".to_string();
    }
    let display = f.to_string();
    // Keep floats visually distinct from integers.
    if display.contains('.') || display.contains('e') {
        display
    } else {
        format!("{}.0", display)
    }
}

fn array_string(items: &[ArgValue], string_max: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let shown = items.len().min(MAX_ARRAY_ITEMS);
    let mut rendered: Vec<String> = items[..shown]
        .iter()
        .map(|item| value_string(item, string_max))
        .collect();
    if items.len() > MAX_ARRAY_ITEMS {
        rendered.push(THREE_DOTS.to_string());
    }
    format!("[{}]", rendered.join(", "))
}

fn quoted_string(s: &str, string_max: usize) -> String {
    let too_long = string_max > 0 && s.chars().count() > string_max;
    let limit = if too_long { string_max.saturating_sub(THREE_DOTS.len()) } else { 0 };

    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut written = 0usize;
    for c in s.chars() {
        out.push_str(&escape_char_in_string(c));
        written += 1;
        if too_long && written >= limit {
            out.push_str(THREE_DOTS);
            break;
        }
    }
    out.push('"');
    out
}

fn escape_char_in_string(c: char) -> String {
    match c {
        '"' => "\\\"".to_string(),
        other => escape_common(other),
    }
}

fn escape_char(c: char) -> String {
    match c {
        '\'' => "\\'".to_string(),
        other => escape_common(other),
    }
}

fn escape_common(c: char) -> String {
    match c {
        '\\' => "\\\\".to_string(),
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        '\0' => "\\0".to_string(),
        other => other.to_string(),
    }
}
