//! Per-PIR collection: generated queries drive the search backend, validated
//! feeds and issuer filings fill the other half of the budget, and the merge
//! dedupes by URL with first occurrence winning.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use farwatch_common::{CollectionParams, Document, Pir, Strategy, ValidatedSource};

use crate::backends::FetchBackends;
use crate::queries::fallback_query;
use crate::stats::CampaignStats;
use crate::traits::QueryGenerator;

/// Pause between search calls for the same PIR; the upstream rate limit is
/// per key and unforgiving.
const SEARCH_PACING: Duration = Duration::from_millis(100);

/// At most this many generated queries are spent per PIR.
const MAX_QUERIES: usize = 3;

const FEED_CONCURRENCY: usize = 5;
const FILING_CONCURRENCY: usize = 3;

/// Deduplicate by URL, first occurrence wins, then cap the total.
pub fn merge_documents(documents: Vec<Document>, max_total: usize) -> Vec<Document> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Document> = documents
        .into_iter()
        .filter(|doc| seen.insert(doc.url.clone()))
        .collect();
    merged.truncate(max_total);
    merged
}

pub struct PirCollector {
    backends: Arc<dyn FetchBackends>,
    query_gen: Arc<dyn QueryGenerator>,
    stats: Arc<CampaignStats>,
    window_days: i64,
}

impl PirCollector {
    pub fn new(
        backends: Arc<dyn FetchBackends>,
        query_gen: Arc<dyn QueryGenerator>,
        stats: Arc<CampaignStats>,
        window_days: i64,
    ) -> Self {
        Self {
            backends,
            query_gen,
            stats,
            window_days,
        }
    }

    /// Collect up to `params.max_docs_per_pir` documents for one PIR.
    pub async fn collect(
        &self,
        pir: &Pir,
        strategy: &Strategy,
        params: &CollectionParams,
        sources: &[ValidatedSource],
        companies: &[String],
        cancel: &CancellationToken,
    ) -> Vec<Document> {
        let half_budget = (params.max_docs_per_pir / 2).max(1);
        let mut collected: Vec<Document> = Vec::new();

        // 1. Search half: AI queries, falling back to the PIR text itself.
        if self.backends.search_enabled() {
            let queries = match self.query_gen.queries(pir, strategy).await {
                Ok(queries) => queries.into_iter().take(MAX_QUERIES).collect::<Vec<_>>(),
                Err(e) => {
                    warn!(pir = pir.id.as_str(), error = %e, "Query generation failed, using PIR text");
                    vec![fallback_query(pir)]
                }
            };

            let per_query = (half_budget / queries.len()).max(1);
            for (i, query) in queries.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                if i > 0 {
                    tokio::time::sleep(SEARCH_PACING).await;
                }
                match self
                    .backends
                    .search(query, self.window_days, per_query, cancel)
                    .await
                {
                    Ok(documents) => collected.extend(documents),
                    Err(e) => {
                        warn!(pir = pir.id.as_str(), query, error = %e, "Search fetch failed");
                        self.stats.record_fetch_error();
                    }
                }
            }
        }

        // 2. Feed half: pull validated sources in parallel.
        let feed_futures: Vec<_> = sources
            .iter()
            .map(|source| async move {
                self.backends
                    .poll_feed(source, self.window_days, half_budget, cancel)
                    .await
                    .map_err(|e| (source.url.clone(), e))
            })
            .collect();
        let feed_results: Vec<_> = stream::iter(feed_futures)
            .buffer_unordered(FEED_CONCURRENCY)
            .collect()
            .await;

        let mut secondary: Vec<Document> = Vec::new();
        for result in feed_results {
            match result {
                Ok(documents) => secondary.extend(documents),
                Err((url, e)) => {
                    warn!(feed = url.as_str(), error = %e, "Feed fetch failed");
                    self.stats.record_fetch_error();
                }
            }
        }

        // 3. Filings share the secondary budget.
        if !companies.is_empty() {
            let filing_futures: Vec<_> = companies
                .iter()
                .map(|company| async move {
                    self.backends
                        .filings(company, self.window_days, half_budget, cancel)
                        .await
                        .map_err(|e| (company.clone(), e))
                })
                .collect();
            let filing_results: Vec<_> = stream::iter(filing_futures)
                .buffer_unordered(FILING_CONCURRENCY)
                .collect()
                .await;

            for result in filing_results {
                match result {
                    Ok(documents) => secondary.extend(documents),
                    Err((company, e)) => {
                        warn!(company = company.as_str(), error = %e, "Filing fetch failed");
                        self.stats.record_fetch_error();
                    }
                }
            }
        }

        secondary.truncate(half_budget);
        collected.extend(secondary);

        let merged = merge_documents(collected, params.max_docs_per_pir);
        self.stats.add_documents(merged.len() as u32);

        info!(
            pir = pir.id.as_str(),
            documents = merged.len(),
            "PIR collection complete"
        );

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farwatch_common::BackendKind;

    fn doc(url: &str) -> Document {
        Document {
            title: url.to_string(),
            body: String::new(),
            url: url.to_string(),
            source: "src".to_string(),
            published_at: None,
            backend: BackendKind::Search,
            backend_meta: serde_json::Value::Null,
        }
    }

    #[test]
    fn merge_dedupes_first_wins() {
        let mut first = doc("https://a.com/1");
        first.title = "first".to_string();
        let mut dup = doc("https://a.com/1");
        dup.title = "second".to_string();

        let merged = merge_documents(vec![first, doc("https://a.com/2"), dup], 10);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "first");
    }

    #[test]
    fn merge_truncates_to_budget() {
        let documents = (0..10).map(|i| doc(&format!("https://a.com/{i}"))).collect();
        assert_eq!(merge_documents(documents, 4).len(), 4);
    }
}
