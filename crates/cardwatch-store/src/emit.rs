//! Block serialisation for a single top-level field.
//!
//! `serde_yaml` would happily serialise a whole card, but it cannot reproduce
//! a maintainer's indentation or sequence layout. This emitter writes just
//! one field, in the layout detected from the surrounding file.

use serde_json::{Map, Value};

/// Layout conventions of the file a block is being written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStyle {
    /// Spaces per nesting level.
    pub indent: usize,
    /// `key:\n  - item` when true, `key:\n- item` when false.
    pub indent_sequences: bool,
}

impl Default for BlockStyle {
    fn default() -> Self {
        Self {
            indent: 2,
            indent_sequences: true,
        }
    }
}

impl BlockStyle {
    /// Detect the layout from existing text, falling back to the default for
    /// whatever the file does not show.
    pub fn detect(text: &str) -> Self {
        let mut style = Self::default();
        let mut indent_seen = false;
        let mut seq_seen = false;

        let lines: Vec<&str> = text.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            if indent_seen && seq_seen {
                break;
            }
            let trimmed = line.trim_end();
            if !trimmed.ends_with(':') || trimmed.trim_start().starts_with('#') {
                continue;
            }
            let parent_indent = leading_spaces(line);
            let Some(next) = lines[i + 1..]
                .iter()
                .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
            else {
                continue;
            };
            let child_indent = leading_spaces(next);
            let child = next.trim_start();
            let is_item = child == "-" || child.starts_with("- ");

            if is_item && !seq_seen {
                style.indent_sequences = child_indent > parent_indent;
                seq_seen = true;
            } else if !is_item && !indent_seen && child_indent > parent_indent {
                style.indent = child_indent - parent_indent;
                indent_seen = true;
            }
        }
        style
    }
}

/// How an existing scalar was quoted in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Plain,
    Single,
    Double,
}

/// Render a scalar for the right-hand side of `key: `.
///
/// Only strings take the original quote style; numbers, bools and null are
/// always plain. Containers render in flow form (`[]`, `{}` when empty).
pub fn render_scalar(value: &Value, quote: QuoteStyle) -> String {
    let s = match value {
        Value::String(s) => s,
        Value::Null => return "null".to_string(),
        Value::Bool(b) => return b.to_string(),
        Value::Number(n) => return n.to_string(),
        Value::Array(items) if items.is_empty() => return "[]".to_string(),
        Value::Object(map) if map.is_empty() => return "{}".to_string(),
        other => return other.to_string(),
    };
    match quote {
        QuoteStyle::Double => double_quoted(s),
        QuoteStyle::Single if !s.contains('\n') => format!("'{}'", s.replace('\'', "''")),
        QuoteStyle::Single => double_quoted(s),
        QuoteStyle::Plain => plain_string(s),
    }
}

fn double_quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.replace('"', "\\\"")))
}

/// A string in the least-quoted form YAML will read back as the same string.
fn plain_string(s: &str) -> String {
    match serde_yaml::to_string(s) {
        Ok(out) => {
            let out = out.trim_end_matches('\n');
            if out.contains('\n') || out.starts_with('|') || out.starts_with('>') {
                double_quoted(s)
            } else {
                out.to_string()
            }
        }
        Err(_) => double_quoted(s),
    }
}

/// Serialise one top-level field as the lines of a block. `key` is written
/// verbatim so an existing key keeps its spelling and quoting.
pub fn emit_field(key: &str, value: &Value, style: &BlockStyle) -> Vec<String> {
    let mut out = Vec::new();
    emit_entry(key, value, 0, style, &mut out);
    out
}

fn emit_entry(key: &str, value: &Value, level: usize, style: &BlockStyle, out: &mut Vec<String>) {
    let pad = " ".repeat(level);
    match value {
        Value::Object(map) if !map.is_empty() => {
            out.push(format!("{pad}{key}:"));
            emit_mapping(map, level + style.indent, style, out);
        }
        Value::Array(items) if !items.is_empty() => {
            out.push(format!("{pad}{key}:"));
            let child = if style.indent_sequences {
                level + style.indent
            } else {
                level
            };
            emit_sequence(items, child, style, out);
        }
        scalar => out.push(format!(
            "{pad}{key}: {}",
            render_scalar(scalar, QuoteStyle::Plain)
        )),
    }
}

fn emit_mapping(map: &Map<String, Value>, level: usize, style: &BlockStyle, out: &mut Vec<String>) {
    for (k, v) in map {
        emit_entry(&plain_string(k), v, level, style, out);
    }
}

fn emit_sequence(items: &[Value], level: usize, style: &BlockStyle, out: &mut Vec<String>) {
    let pad = " ".repeat(level);
    for item in items {
        let mut nested = Vec::new();
        match item {
            Value::Object(map) if !map.is_empty() => emit_mapping(map, level + 2, style, &mut nested),
            Value::Array(inner) if !inner.is_empty() => {
                emit_sequence(inner, level + 2, style, &mut nested)
            }
            scalar => {
                out.push(format!("{pad}- {}", render_scalar(scalar, QuoteStyle::Plain)));
                continue;
            }
        }
        // The first nested line shares the dash's line.
        for (i, line) in nested.into_iter().enumerate() {
            if i == 0 {
                out.push(format!("{pad}- {}", &line[level + 2..]));
            } else {
                out.push(line);
            }
        }
    }
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}
