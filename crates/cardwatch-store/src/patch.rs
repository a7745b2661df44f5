//! Format-preserving patch engine.
//!
//! Changes are written as text substitutions against the file as the
//! maintainer left it, never by re-serialising the whole card. Comments, key
//! order, quoting and blank lines outside the touched region stay
//! byte-identical.
//!
//! Three strategies, picked by [`FieldShape::classify`]:
//!
//! - **Scalar**: rewrite only the value on the `key: value` line. Keeps the
//!   original quoting and any trailing `# comment`. The key must exist.
//! - **Block**: replace the key line and its indented continuation with a
//!   freshly emitted block for that one field. A missing key is appended at
//!   the end of the file.
//! - **Sub-field**: parse the parent block, set the one property, then write
//!   the parent back with the block strategy. The whole parent is rewritten.
//!
//! Every change is re-parsed and read back before it is kept. A change that
//! fails leaves the text as it was before that change.

use cardwatch_core::canonical::{assign_path, lookup_path, values_equal, FieldPath};
use cardwatch_core::{AppliedChange, ChangeProposal, Record};
use serde_json::Value;
use tracing::{debug, warn};

use crate::emit::{emit_field, render_scalar, BlockStyle, QuoteStyle};
use crate::PatchError;

/// Which strategy a change is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Scalar,
    Block,
    SubField,
}

impl FieldShape {
    pub fn classify(path: &FieldPath, new_value: &Value) -> Self {
        if path.is_nested() {
            FieldShape::SubField
        } else if new_value.is_array() || new_value.is_object() {
            FieldShape::Block
        } else {
            FieldShape::Scalar
        }
    }
}

/// A change the engine could not write, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedChange {
    pub change: ChangeProposal,
    pub reason: String,
}

/// Result of applying one record's changes.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub text: String,
    pub applied: Vec<AppliedChange>,
    pub skipped: Vec<SkippedChange>,
}

impl PatchOutcome {
    /// Only dirty records are written back.
    pub fn is_dirty(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Apply `changes` to `record.raw_text` in order. Each change sees the text
/// left by the previous one; a failed change is skipped and logged.
pub fn apply(record: &Record, changes: &[ChangeProposal]) -> PatchOutcome {
    let mut text = record.raw_text.clone();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for change in changes {
        match apply_change(&text, change) {
            Ok(next) => {
                debug!(record_id = %record.id, field_path = %change.field_path, "change applied");
                text = next;
                applied.push(AppliedChange::from(change));
            }
            Err(e) => {
                warn!(
                    record_id = %record.id,
                    field_path = %change.field_path,
                    reason = %e,
                    "skipping change"
                );
                skipped.push(SkippedChange {
                    change: change.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    PatchOutcome {
        text,
        applied,
        skipped,
    }
}

/// Apply a single change to `text`, returning the patched text.
pub fn apply_change(text: &str, change: &ChangeProposal) -> Result<String, PatchError> {
    let path = FieldPath::parse(&change.field_path)
        .ok_or_else(|| PatchError::InvalidPath(change.field_path.clone()))?;

    let patched = match FieldShape::classify(&path, &change.new_value) {
        FieldShape::Scalar => patch_scalar(text, path.top(), &change.new_value)?,
        FieldShape::Block => patch_block(text, path.top(), &change.new_value),
        FieldShape::SubField => patch_sub_field(text, &path, &change.new_value)?,
    };

    if patched == text {
        return Err(PatchError::NoEffect(change.field_path.clone()));
    }
    verify(&patched, &path, &change.new_value)?;
    Ok(patched)
}

// ── Strategies ──

fn patch_scalar(text: &str, key: &str, value: &Value) -> Result<String, PatchError> {
    let lines = split_lines(text);
    let (idx, anchor) =
        find_key(&lines, key).ok_or_else(|| PatchError::AnchorNotFound(key.to_string()))?;

    let content = lines[idx].content;
    let slot = ScalarSlot::locate(content, anchor.after_colon);
    if slot.is_empty() || slot.is_block_scalar(content) || block_end(&lines, idx, &anchor) > idx + 1
    {
        // The old value spans several lines; rewrite the region as `key: value`.
        return Ok(patch_block(text, key, value));
    }

    let rendered = render_scalar(value, slot.quote);
    let new_line = format!("{}{}{}", &content[..slot.start], rendered, &content[slot.end..]);
    Ok(splice(&lines, idx, idx + 1, &[new_line], newline_of(text)))
}

fn patch_block(text: &str, key: &str, value: &Value) -> String {
    let lines = split_lines(text);
    let style = BlockStyle::detect(text);
    let nl = newline_of(text);

    match find_key(&lines, key) {
        Some((idx, anchor)) => {
            let end = block_end(&lines, idx, &anchor);
            let key_text = &lines[idx].content[..anchor.key_len];
            let emitted = emit_field(key_text, value, &style);
            splice(&lines, idx, end, &emitted, nl)
        }
        None => {
            let key_text = render_scalar(&Value::String(key.to_string()), QuoteStyle::Plain);
            let emitted = emit_field(&key_text, value, &style);
            let mut out = text.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push_str(nl);
            }
            for line in emitted {
                out.push_str(&line);
                out.push_str(nl);
            }
            out
        }
    }
}

fn patch_sub_field(text: &str, path: &FieldPath, value: &Value) -> Result<String, PatchError> {
    let lines = split_lines(text);
    let key = path.top();

    let mut parent = match find_key(&lines, key) {
        Some((idx, anchor)) => {
            let end = block_end(&lines, idx, &anchor);
            let region = lines[idx..end]
                .iter()
                .map(|l| l.content)
                .collect::<Vec<_>>()
                .join("\n");
            let parsed: Value =
                serde_yaml::from_str(&region).map_err(|source| PatchError::BlockParse {
                    field: key.to_string(),
                    source,
                })?;
            parsed.get(key).cloned().unwrap_or(Value::Null)
        }
        None => Value::Null,
    };

    if !assign_path(&mut parent, path.rest(), value.clone()) {
        return Err(PatchError::InvalidPath(path.to_string()));
    }
    Ok(patch_block(text, key, &parent))
}

fn verify(text: &str, path: &FieldPath, expected: &Value) -> Result<(), PatchError> {
    let parsed: Value = serde_yaml::from_str(text).map_err(PatchError::Reparse)?;
    match lookup_path(&parsed, path) {
        Some(found) if values_equal(found, expected) => Ok(()),
        None if expected.is_null() => Ok(()),
        found => Err(PatchError::Readback {
            field: path.to_string(),
            found: found.map_or_else(|| "nothing".to_string(), Value::to_string),
        }),
    }
}

// ── Line handling ──

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    content: &'a str,
    ending: &'a str,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    text.split_inclusive('\n')
        .map(|raw| {
            if let Some(content) = raw.strip_suffix("\r\n") {
                Line {
                    content,
                    ending: "\r\n",
                }
            } else if let Some(content) = raw.strip_suffix('\n') {
                Line {
                    content,
                    ending: "\n",
                }
            } else {
                Line {
                    content: raw,
                    ending: "",
                }
            }
        })
        .collect()
}

fn newline_of(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}

/// Replace `lines[start..end]` with `replacement`. The last replacement line
/// inherits the ending of the last replaced line so a missing final newline
/// stays missing.
fn splice(lines: &[Line<'_>], start: usize, end: usize, replacement: &[String], nl: &str) -> String {
    let mut out = String::new();
    for line in &lines[..start] {
        out.push_str(line.content);
        out.push_str(line.ending);
    }
    let last_ending = lines[end - 1].ending;
    for (i, line) in replacement.iter().enumerate() {
        out.push_str(line);
        out.push_str(if i + 1 == replacement.len() { last_ending } else { nl });
    }
    for line in &lines[end..] {
        out.push_str(line.content);
        out.push_str(line.ending);
    }
    out
}

/// A top-level `key:` line.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    /// Bytes of the key as written, quotes included.
    key_len: usize,
    after_colon: usize,
}

fn find_key(lines: &[Line<'_>], key: &str) -> Option<(usize, Anchor)> {
    let candidates = [key.to_string(), format!("\"{key}\""), format!("'{key}'")];
    lines.iter().enumerate().find_map(|(idx, line)| {
        candidates.iter().find_map(|cand| {
            let rest = line.content.strip_prefix(cand.as_str())?;
            let after = rest.strip_prefix(':')?;
            if after.is_empty() || after.starts_with([' ', '\t']) {
                Some((
                    idx,
                    Anchor {
                        key_len: cand.len(),
                        after_colon: cand.len() + 1,
                    },
                ))
            } else {
                None
            }
        })
    })
}

/// Exclusive end of the region owned by the key on `lines[start]`: every
/// following line indented deeper than the key, plus `- ` items flush with a
/// key whose value is empty. Blank and comment-only lines only belong to the
/// region when more continuation follows them.
fn block_end(lines: &[Line<'_>], start: usize, anchor: &Anchor) -> usize {
    let inline = strip_comment(&lines[start].content[anchor.after_colon..]);
    let inline_empty = inline.trim().is_empty();

    let mut end = start + 1;
    for (j, line) in lines.iter().enumerate().skip(start + 1) {
        let c = line.content;
        let t = c.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        let indented = c.starts_with([' ', '\t']);
        let flush_item = inline_empty && (t == "-" || c.starts_with("- "));
        if indented || flush_item {
            end = j + 1;
        } else {
            break;
        }
    }
    end
}

fn strip_comment(s: &str) -> &str {
    if s.trim_start().starts_with('#') {
        return "";
    }
    match s.find(" #").or_else(|| s.find("\t#")) {
        Some(pos) => &s[..pos],
        None => s,
    }
}

/// Byte range of the value on a `key: value` line.
#[derive(Debug, Clone, Copy)]
struct ScalarSlot {
    start: usize,
    end: usize,
    quote: QuoteStyle,
}

impl ScalarSlot {
    fn locate(content: &str, after_colon: usize) -> Self {
        let rest = &content[after_colon..];
        let start = after_colon + (rest.len() - rest.trim_start().len());
        let value = &content[start..];

        if let Some(body) = value.strip_prefix('"') {
            let mut escaped = false;
            for (i, ch) in body.char_indices() {
                match ch {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => {
                        return Self {
                            start,
                            end: start + 1 + i + 1,
                            quote: QuoteStyle::Double,
                        };
                    }
                    _ => escaped = false,
                }
            }
        } else if let Some(body) = value.strip_prefix('\'') {
            let bytes = body.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    return Self {
                        start,
                        end: start + 1 + i + 1,
                        quote: QuoteStyle::Single,
                    };
                }
                i += 1;
            }
        }

        let plain = strip_comment(value).trim_end();
        Self {
            start,
            end: start + plain.len(),
            quote: QuoteStyle::Plain,
        }
    }

    fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn is_block_scalar(&self, content: &str) -> bool {
        matches!(content[self.start..].chars().next(), Some('|' | '>'))
    }
}
