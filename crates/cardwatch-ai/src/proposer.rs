use async_trait::async_trait;
use cardwatch_core::{ChangeProposal, Confidence, Evidence, FieldPath};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::extract_json;

#[derive(Error, Debug)]
pub enum ProposerError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("proposer API returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("proposer timed out after {0}s")]
    Timeout(u64),
}

/// One card as the proposer sees it: current fields plus search evidence.
#[derive(Debug, Clone)]
pub struct ProposalInput {
    pub record_id: String,
    pub name: String,
    pub fields: Value,
    pub evidence: Vec<Evidence>,
}

/// Proposals that survived schema parsing, plus a count of dropped entries.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedResponse {
    pub proposals: Vec<ChangeProposal>,
    pub malformed: usize,
}

/// An external reasoning service that turns evidence into field corrections.
///
/// One call covers the whole selection. Implementations return an error only
/// when the service itself failed; an unusable answer is an empty
/// [`ParsedResponse`].
#[async_trait]
pub trait ChangeProposer: Send + Sync {
    async fn propose(&self, batch: &[ProposalInput]) -> Result<ParsedResponse, ProposerError>;
}

// ── Prompt templates ──

pub const SYSTEM_PROMPT: &str = "\
You maintain a public dataset of credit card facts (fees, rewards, sign-up bonuses, APRs).

For each card you are given its current data as JSON and a numbered list of web search results. \
Compare the current data against the search results and propose corrections only where a search \
result clearly shows the current value is wrong or out of date.

Respond ONLY with a JSON array. No markdown fences, no explanation, just raw JSON:
[
  {
    \"record_id\": \"the card id exactly as given\",
    \"changes\": [
      {
        \"field_path\": \"dot-separated path, e.g. annual_fee or signup_bonus.amount or rewards.0.rate\",
        \"old_value\": the current value exactly as given (null if the field is absent),
        \"new_value\": the corrected value, same type as the current value,
        \"confidence\": \"high\" | \"medium\" | \"low\",
        \"citation_url\": \"the search result URL that supports the change\"
      }
    ]
  }
]

Rules:
- Use \"high\" only when a cited search result explicitly states the new value.
- Never propose a change whose new_value equals old_value.
- Never propose two changes for the same field_path of one card.
- Omit cards that need no changes. If nothing needs changing, respond with [].
- Do not invent fields unrelated to the card's existing structure.";

pub fn build_user_prompt(batch: &[ProposalInput]) -> String {
    let mut out = format!("Review the following {} card(s).\n", batch.len());
    for input in batch {
        let fields =
            serde_json::to_string_pretty(&input.fields).unwrap_or_else(|_| input.fields.to_string());
        out.push_str(&format!(
            "\n## Card: {id}\nName: {name}\n\nCurrent data:\n{fields}\n\nSearch results:\n",
            id = input.record_id,
            name = input.name,
        ));
        if input.evidence.is_empty() {
            out.push_str("(none found; propose no changes for this card)\n");
        }
        for (i, e) in input.evidence.iter().enumerate() {
            out.push_str(&format!(
                "{n}. {title}\n   {url}\n   {snippet}\n",
                n = i + 1,
                title = e.title,
                url = e.url,
                snippet = e.snippet,
            ));
        }
    }
    out
}

// ── Response schema ──

#[derive(Deserialize)]
struct WireRecord {
    record_id: String,
    changes: Vec<Value>,
}

#[derive(Deserialize)]
struct WireChange {
    field_path: String,
    old_value: Value,
    new_value: Value,
    confidence: Confidence,
    citation_url: String,
}

/// Parse a raw model reply into typed proposals.
///
/// The reply must contain a JSON array of `{record_id, changes}` entries.
/// A record entry or change that is missing a field, has a mistyped field, an
/// unusable `field_path` or an empty citation is dropped and counted; the
/// rest of the response still counts.
pub fn parse_response(text: &str) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    let entries = match extract_json(text) {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            warn!(
                kind = json_kind(&other),
                "proposer response is not a JSON array, treating as no changes"
            );
            return parsed;
        }
        None => {
            warn!(len = text.len(), "proposer response contained no JSON, treating as no changes");
            return parsed;
        }
    };

    for entry in entries {
        let record: WireRecord = match serde_json::from_value(entry) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "dropping malformed record entry");
                parsed.malformed += 1;
                continue;
            }
        };
        for raw in record.changes {
            match to_proposal(&record.record_id, raw) {
                Ok(p) => parsed.proposals.push(p),
                Err(reason) => {
                    warn!(
                        record_id = %record.record_id,
                        reason = %reason,
                        "dropping malformed change"
                    );
                    parsed.malformed += 1;
                }
            }
        }
    }
    parsed
}

fn to_proposal(record_id: &str, raw: Value) -> Result<ChangeProposal, String> {
    let wire: WireChange = serde_json::from_value(raw).map_err(|e| e.to_string())?;
    let field_path = wire.field_path.trim();
    if FieldPath::parse(field_path).is_none() {
        return Err(format!("invalid field_path {:?}", wire.field_path));
    }
    let citation_url = wire.citation_url.trim();
    if citation_url.is_empty() {
        return Err(format!("{field_path}: missing citation_url"));
    }
    Ok(ChangeProposal {
        record_id: record_id.to_string(),
        field_path: field_path.to_string(),
        old_value: wire.old_value,
        new_value: wire.new_value,
        confidence: wire.confidence,
        citation_url: citation_url.to_string(),
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_response() {
        let reply = r#"```json
[
  {
    "record_id": "chase-sapphire-preferred",
    "changes": [
      {
        "field_path": "annual_fee",
        "old_value": 95,
        "new_value": 250,
        "confidence": "high",
        "citation_url": "https://creditcards.chase.com/sapphire"
      },
      {
        "field_path": "signup_bonus.amount",
        "old_value": 60000,
        "new_value": 75000,
        "confidence": "Medium",
        "citation_url": "https://example.com/bonus"
      }
    ]
  }
]
```"#;
        let parsed = parse_response(reply);
        assert_eq!(parsed.malformed, 0);
        assert_eq!(parsed.proposals.len(), 2);
        let first = &parsed.proposals[0];
        assert_eq!(first.record_id, "chase-sapphire-preferred");
        assert_eq!(first.field_path, "annual_fee");
        assert_eq!(first.old_value, json!(95));
        assert_eq!(first.new_value, json!(250));
        assert_eq!(first.confidence, Confidence::High);
        assert_eq!(parsed.proposals[1].confidence, Confidence::Medium);
    }

    #[test]
    fn empty_array_means_no_changes() {
        assert_eq!(parse_response("[]"), ParsedResponse::default());
    }

    #[test]
    fn unparseable_or_wrong_shape_is_zero_proposals() {
        assert_eq!(parse_response("I could not find anything."), ParsedResponse::default());
        assert_eq!(
            parse_response(r#"{"record_id": "a", "changes": []}"#),
            ParsedResponse::default()
        );
    }

    #[test]
    fn malformed_entries_dropped_individually() {
        let reply = json!([
            {"changes": []},
            {"record_id": "a", "changes": "none"},
            {
                "record_id": "b",
                "changes": [
                    {"field_path": "annual_fee", "old_value": 95, "new_value": 0,
                     "confidence": "high", "citation_url": "https://x.test/a"},
                    {"field_path": "annual_fee", "old_value": 95, "new_value": 0,
                     "confidence": "certain", "citation_url": "https://x.test/a"},
                    {"field_path": "apr", "new_value": "20%",
                     "confidence": "high", "citation_url": "https://x.test/a"},
                    {"field_path": "apr", "old_value": "19%", "new_value": "20%",
                     "confidence": "high", "citation_url": "  "},
                    {"field_path": "rewards..rate", "old_value": 1, "new_value": 2,
                     "confidence": "high", "citation_url": "https://x.test/a"},
                    {"field_path": "foreign_tx_fee", "old_value": null, "new_value": 0,
                     "confidence": "high", "citation_url": " https://x.test/b "}
                ]
            }
        ])
        .to_string();
        let parsed = parse_response(&reply);
        assert_eq!(parsed.malformed, 6);
        assert_eq!(parsed.proposals.len(), 2);
        assert_eq!(parsed.proposals[0].field_path, "annual_fee");
        assert_eq!(parsed.proposals[1].field_path, "foreign_tx_fee");
        assert_eq!(parsed.proposals[1].old_value, Value::Null);
        assert_eq!(parsed.proposals[1].citation_url, "https://x.test/b");
    }

    #[test]
    fn prompt_lists_cards_and_evidence() {
        let batch = vec![
            ProposalInput {
                record_id: "amex-gold".into(),
                name: "American Express Gold Card".into(),
                fields: json!({"annual_fee": 250}),
                evidence: vec![Evidence {
                    title: "Gold Card".into(),
                    url: "https://americanexpress.com/gold".into(),
                    snippet: "$325 annual fee".into(),
                }],
            },
            ProposalInput {
                record_id: "old-card".into(),
                name: "Old Card".into(),
                fields: json!({"discontinued": true}),
                evidence: vec![],
            },
        ];
        let prompt = build_user_prompt(&batch);
        assert!(prompt.starts_with("Review the following 2 card(s)."));
        assert!(prompt.contains("## Card: amex-gold"));
        assert!(prompt.contains("\"annual_fee\": 250"));
        assert!(prompt.contains("1. Gold Card\n   https://americanexpress.com/gold\n   $325 annual fee"));
        assert!(prompt.contains("## Card: old-card"));
        assert!(prompt.contains("(none found; propose no changes for this card)"));
    }
}
