//! Anthropic Messages API proposer.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::proposer::{build_user_prompt, parse_response, SYSTEM_PROMPT};
use crate::{ChangeProposer, ParsedResponse, ProposalInput, ProposerError};

const API_VERSION: &str = "2023-06-01";

/// HTTP client for `POST /v1/messages`.
pub struct ClaudeProposer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ClaudeProposer {
    /// `base_url` is the API root (e.g. `https://api.anthropic.com`).
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, ProposerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cardwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_tokens,
        })
    }
}

#[async_trait]
impl ChangeProposer for ClaudeProposer {
    async fn propose(&self, batch: &[ProposalInput]) -> Result<ParsedResponse, ProposerError> {
        if batch.is_empty() {
            return Ok(ParsedResponse::default());
        }

        let prompt = build_user_prompt(batch);
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };
        debug!(records = batch.len(), prompt_len = prompt.len(), model = %self.model, "calling proposer");

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProposerError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed = proposals_from_body(&body)?;
        info!(
            proposals = parsed.proposals.len(),
            malformed = parsed.malformed,
            "proposer responded"
        );
        Ok(parsed)
    }
}

/// Parse a Messages API body into proposals. A reply with no text is a
/// quiet answer, not a failure.
fn proposals_from_body(body: &str) -> Result<ParsedResponse, ProposerError> {
    let text = response_text(body)?;
    if text.trim().is_empty() {
        warn!("proposer returned no text content, treating as no changes");
        return Ok(ParsedResponse::default());
    }
    Ok(parse_response(&text))
}

/// Concatenate the text blocks of a Messages API response.
fn response_text(body: &str) -> Result<String, ProposerError> {
    let parsed: MessagesResponse = serde_json::from_str(body)?;
    if parsed.stop_reason.as_deref() == Some("max_tokens") {
        warn!("proposer output was truncated at max_tokens");
    }
    Ok(parsed
        .content
        .into_iter()
        .filter(|b| b.kind == "text")
        .map(|b| b.text)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks() {
        let body = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "[{\"record_id\": \"a\", "},
                {"type": "text", "text": "\"changes\": []}]"}
            ],
            "stop_reason": "end_turn"
        }"#;
        let text = response_text(body).unwrap();
        assert_eq!(text, r#"[{"record_id": "a", "changes": []}]"#);
        assert!(parse_response(&text).proposals.is_empty());
    }

    #[test]
    fn empty_content_is_no_changes() {
        let body = r#"{"content": [], "stop_reason": "end_turn"}"#;
        assert_eq!(proposals_from_body(body).unwrap(), ParsedResponse::default());

        let body = r#"{"content": [{"type": "text", "text": "  \n"}]}"#;
        assert_eq!(proposals_from_body(body).unwrap(), ParsedResponse::default());
    }

    #[test]
    fn body_with_proposals() {
        let body = r#"{"content": [{"type": "text", "text": "[{\"record_id\": \"a\", \"changes\": [{\"field_path\": \"annual_fee\", \"old_value\": 95, \"new_value\": 250, \"confidence\": \"high\", \"citation_url\": \"https://example.com\"}]}]"}]}"#;
        let parsed = proposals_from_body(body).unwrap();
        assert_eq!(parsed.proposals.len(), 1);
        assert_eq!(parsed.proposals[0].field_path, "annual_fee");
    }

    #[test]
    fn non_json_body_is_an_error() {
        assert!(matches!(proposals_from_body("upstream error"), Err(ProposerError::Json(_))));
    }

    #[test]
    fn request_shape() {
        let prompt = "hello";
        let req = MessagesRequest {
            model: "claude-sonnet-4-5-20250929",
            max_tokens: 8192,
            temperature: 0.0,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "claude-sonnet-4-5-20250929");
        assert_eq!(v["max_tokens"], 8192);
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "hello");
    }

    #[tokio::test]
    async fn empty_batch_makes_no_call() {
        let p = ClaudeProposer::new(
            "http://127.0.0.1:1/".into(),
            "key".into(),
            "model".into(),
            100,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(p.base_url, "http://127.0.0.1:1");
        assert_eq!(p.propose(&[]).await.unwrap(), ParsedResponse::default());
    }
}
