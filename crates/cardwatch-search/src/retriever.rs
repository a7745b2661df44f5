//! Best-effort evidence retrieval for the selected cards.
//!
//! A failed lookup never aborts the run: the card goes to the proposer with
//! no evidence, and a well-behaved proposer proposes nothing for it.

use std::time::Duration;

use cardwatch_core::{Evidence, Record};
use tracing::{info, warn};

use crate::{SearchError, SearchProvider};

/// Evidence for each record, aligned with the input order.
#[derive(Debug, Default)]
pub struct RetrievalReport {
    pub evidence: Vec<Vec<Evidence>>,
    pub failures: usize,
}

/// Query string for a card: name, issuer, and the current year to bias toward
/// fresh results.
pub fn query_for(record: &Record, year: i32) -> String {
    match record.issuer() {
        Some(issuer) if !record.display_name().contains(issuer) => {
            format!("{} {} credit card {year}", record.display_name(), issuer)
        }
        _ => format!("{} credit card {year}", record.display_name()),
    }
}

pub struct EvidenceRetriever<P> {
    provider: P,
    max_results: usize,
    delay: Duration,
    timeout: Duration,
    year: i32,
}

impl<P: SearchProvider> EvidenceRetriever<P> {
    pub fn new(
        provider: P,
        max_results: usize,
        delay: Duration,
        timeout: Duration,
        year: i32,
    ) -> Self {
        Self {
            provider,
            max_results,
            delay,
            timeout,
            year,
        }
    }

    /// Evidence for one card. Errors and timeouts degrade to an empty list.
    pub async fn fetch_evidence(&self, record: &Record) -> Vec<Evidence> {
        self.try_fetch(record).await.unwrap_or_default()
    }

    async fn try_fetch(&self, record: &Record) -> Result<Vec<Evidence>, SearchError> {
        let query = query_for(record, self.year);
        let search = self.provider.search(&query, self.max_results);
        let result = tokio::time::timeout(self.timeout, search)
            .await
            .unwrap_or(Err(SearchError::Timeout(self.timeout.as_secs())));

        match result {
            Ok(mut hits) => {
                hits.truncate(self.max_results);
                info!(
                    record_id = %record.id,
                    query = %query,
                    hits = hits.len(),
                    "evidence retrieved"
                );
                Ok(hits)
            }
            Err(e) => {
                warn!(
                    record_id = %record.id,
                    query = %query,
                    error = %e,
                    "evidence lookup failed, continuing without evidence"
                );
                Err(e)
            }
        }
    }

    /// Look up every card in order, pausing between calls to stay under the
    /// search API's rate limit.
    pub async fn fetch_all(&self, records: &[Record]) -> RetrievalReport {
        let mut report = RetrievalReport::default();
        for (i, record) in records.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.try_fetch(record).await {
                Ok(hits) => report.evidence.push(hits),
                Err(_) => {
                    report.failures += 1;
                    report.evidence.push(Vec::new());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn record(id: &str, fields: serde_json::Value) -> Record {
        Record {
            id: id.into(),
            location: PathBuf::from(format!("{id}.yaml")),
            fields,
            raw_text: String::new(),
        }
    }

    fn hit(n: usize) -> Evidence {
        Evidence {
            title: format!("result {n}"),
            url: format!("https://example.com/{n}"),
            snippet: "annual fee".into(),
        }
    }

    /// Fails for queries mentioning "broken", sleeps for "slow", otherwise
    /// returns more hits than asked for.
    struct FakeSearch {
        queries: Mutex<Vec<String>>,
    }

    impl FakeSearch {
        fn new() -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        async fn search(&self, query: &str, _max: usize) -> Result<Vec<Evidence>, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            if query.contains("broken") {
                return Err(SearchError::Server {
                    status: 429,
                    body: "rate limited".into(),
                });
            }
            if query.contains("slow") {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Ok((0..10).map(hit).collect())
        }
    }

    fn retriever() -> EvidenceRetriever<FakeSearch> {
        EvidenceRetriever::new(
            FakeSearch::new(),
            3,
            Duration::ZERO,
            Duration::from_millis(50),
            2026,
        )
    }

    #[test]
    fn query_includes_issuer_and_year() {
        let r = record("csp", json!({"name": "Sapphire Preferred", "issuer": "Chase"}));
        assert_eq!(query_for(&r, 2026), "Sapphire Preferred Chase credit card 2026");
    }

    #[test]
    fn query_skips_issuer_already_in_name() {
        let r = record("csp", json!({"name": "Chase Sapphire Preferred", "issuer": "Chase"}));
        assert_eq!(query_for(&r, 2026), "Chase Sapphire Preferred credit card 2026");
        let r = record("mystery-card", json!({}));
        assert_eq!(query_for(&r, 2025), "mystery-card credit card 2025");
    }

    #[tokio::test]
    async fn results_capped_at_max() {
        let hits = retriever()
            .fetch_evidence(&record("a", json!({"name": "A"})))
            .await;
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], hit(0));
    }

    #[tokio::test]
    async fn failure_degrades_to_empty() {
        let hits = retriever()
            .fetch_evidence(&record("b", json!({"name": "broken card"})))
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn timeout_degrades_to_empty() {
        let hits = retriever()
            .fetch_evidence(&record("s", json!({"name": "slow card"})))
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn fetch_all_keeps_order_and_counts_failures() {
        let r = retriever();
        let records = vec![
            record("a", json!({"name": "A"})),
            record("b", json!({"name": "broken card"})),
            record("c", json!({"name": "C"})),
        ];
        let report = r.fetch_all(&records).await;
        assert_eq!(report.failures, 1);
        assert_eq!(report.evidence.len(), 3);
        assert_eq!(report.evidence[0].len(), 3);
        assert!(report.evidence[1].is_empty());
        assert_eq!(report.evidence[2].len(), 3);
        assert_eq!(r.provider.queries.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn fetch_all_empty_selection() {
        let report = retriever().fetch_all(&[]).await;
        assert!(report.evidence.is_empty());
        assert_eq!(report.failures, 0);
    }
}
