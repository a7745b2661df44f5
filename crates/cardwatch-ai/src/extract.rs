//! Pull a JSON document out of a model reply.
//!
//! Models are told to answer with raw JSON, but replies still arrive wrapped
//! in code fences or with a sentence of preamble.

use serde_json::Value;

/// Extract the first JSON array or object from `response`.
///
/// Tries, in order: the whole reply, the first fenced block (```` ```json ````
/// or a bare ```` ``` ````), then the outermost `[...]` and `{...}` spans.
pub fn extract_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    if let Some(body) = fenced_body(trimmed)
        && let Ok(v) = serde_json::from_str::<Value>(body)
    {
        return Some(v);
    }

    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close))
            && end > start
            && let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end])
        {
            return Some(v);
        }
    }

    None
}

fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip an info string such as `json`.
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array() {
        assert_eq!(extract_json("[]"), Some(json!([])));
        assert_eq!(
            extract_json("  [{\"record_id\": \"a\"}]\n"),
            Some(json!([{"record_id": "a"}]))
        );
    }

    #[test]
    fn fenced_json() {
        let raw = "Here are the updates:\n```json\n[{\"record_id\": \"a\", \"changes\": []}]\n```\nDone.";
        assert_eq!(extract_json(raw), Some(json!([{"record_id": "a", "changes": []}])));
    }

    #[test]
    fn fence_without_language() {
        let raw = "```\n[1, 2]\n```";
        assert_eq!(extract_json(raw), Some(json!([1, 2])));
    }

    #[test]
    fn prose_around_array() {
        let raw = "I checked every card. [{\"record_id\": \"x\"}] Let me know.";
        assert_eq!(extract_json(raw), Some(json!([{"record_id": "x"}])));
    }

    #[test]
    fn object_fallback() {
        let raw = "Result: {\"records\": []}";
        assert_eq!(extract_json(raw), Some(json!({"records": []})));
    }

    #[test]
    fn nothing_to_extract() {
        assert_eq!(extract_json(""), None);
        assert_eq!(extract_json("No changes needed."), None);
        assert_eq!(extract_json("```json\n[{broken\n```"), None);
    }
}
