use async_trait::async_trait;
use cardwatch_core::Evidence;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search API returned {status}: {body}")]
    Server { status: u16, body: String },
    #[cfg(feature = "http")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("search timed out after {0}s")]
    Timeout(u64),
}

/// An external web search API.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ranked hits for `query`, at most `max_results` of them.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Evidence>, SearchError>;
}
