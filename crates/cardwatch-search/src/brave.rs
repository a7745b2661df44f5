//! Brave Search web API client.

use std::time::Duration;

use async_trait::async_trait;
use cardwatch_core::Evidence;
use serde::Deserialize;
use tracing::debug;

use crate::{SearchError, SearchProvider};

/// HTTP client for `GET /res/v1/web/search`.
pub struct BraveSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Deserialize)]
struct WebResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveSearch {
    /// `endpoint` is the full web-search URL; `timeout` bounds each request.
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cardwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Evidence>, SearchError> {
        debug!(query = %query, "brave search");
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", &max_results.to_string())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        parse_results(&body, max_results)
    }
}

/// Turn a search response body into evidence, dropping hits without a URL.
fn parse_results(body: &str, max_results: usize) -> Result<Vec<Evidence>, SearchError> {
    let parsed: SearchResponse = serde_json::from_str(body)?;
    let results = parsed.web.map(|w| w.results).unwrap_or_default();
    Ok(results
        .into_iter()
        .filter(|r| !r.url.trim().is_empty())
        .take(max_results)
        .map(|r| Evidence {
            title: strip_tags(&r.title),
            url: r.url.trim().to_string(),
            snippet: strip_tags(&r.description),
        })
        .collect())
}

/// Remove the `<strong>` highlighting Brave puts around matched terms.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}
