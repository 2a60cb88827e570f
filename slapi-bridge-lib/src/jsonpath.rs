//! Restricted JSONPath evaluation for response filtering.
//!
//! Recognized forms: `$`, dotted keys (`$.a.b`), list indexing (`$.a[0]`),
//! the wildcard `[*]` (an object becomes the list of its values), and
//! dotted keys distributed over a list (keeping only object elements that
//! carry the key). Anything the evaluator cannot navigate yields `null`.

use serde_json::Value;

#[derive(Debug, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// Applies `path` to `doc`. A malformed path or a failed navigation both
/// evaluate to `Value::Null`.
pub fn apply(doc: &Value, path: &str) -> Value {
    match parse(path) {
        Some(segments) => eval(doc.clone(), &segments),
        None => Value::Null,
    }
}

/// Serializes a filter result as ASCII JSON with `, ` between elements and
/// `: ` after keys — the exact framing the hosts on the other end of the
/// link parse. Non-ASCII characters are `\uXXXX`-escaped.
pub fn to_ascii_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ch if (' '..='\u{7e}').contains(&ch) => out.push(ch),
            ch => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
}

fn parse(path: &str) -> Option<Vec<Segment>> {
    let rest = path.strip_prefix('$')?;

    let mut segments = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
                let mut j = i + 1;
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                let content: String = chars[i + 1..j].iter().collect();
                if content == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    segments.push(Segment::Index(content.parse().ok()?));
                }
                i = j;
            }
            ch => current.push(ch),
        }
        i += 1;
    }

    if !current.is_empty() {
        segments.push(Segment::Key(current));
    }

    Some(segments)
}

fn eval(doc: Value, segments: &[Segment]) -> Value {
    let mut result = doc;

    for segment in segments {
        result = match segment {
            Segment::Wildcard => match result {
                Value::Array(_) => result,
                Value::Object(map) => Value::Array(map.into_iter().map(|(_, v)| v).collect()),
                _ => return Value::Null,
            },
            Segment::Index(i) => match result {
                Value::Array(mut items) => {
                    if *i < items.len() {
                        items.swap_remove(*i)
                    } else {
                        return Value::Null;
                    }
                }
                _ => return Value::Null,
            },
            Segment::Key(key) => match result {
                Value::Array(items) => {
                    let projected: Vec<Value> = items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::Object(mut map) => map.remove(key),
                            _ => None,
                        })
                        .collect();
                    if projected.is_empty() {
                        return Value::Null;
                    }
                    Value::Array(projected)
                }
                Value::Object(mut map) => match map.remove(key) {
                    Some(value) => value,
                    None => return Value::Null,
                },
                _ => return Value::Null,
            },
        };

        if result.is_null() {
            return Value::Null;
        }
    }

    result
}
