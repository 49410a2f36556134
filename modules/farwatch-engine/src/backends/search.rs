//! Keyword-query search backend.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use farwatch_common::{BackendKind, Document, FarwatchError};

const SEARCH_API_URL: &str = "https://newsapi.org/v2/everything";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream caps page size at 100 regardless of what we ask for.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<SearchArticle>,
}

#[derive(Debug, Deserialize)]
struct SearchArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: Option<SearchSource>,
}

#[derive(Debug, Deserialize)]
struct SearchSource {
    name: Option<String>,
}

/// Strip vendor prefixes some aggregators prepend to provider names.
pub fn clean_source_name(raw: &str) -> &str {
    raw.strip_prefix("NewsAPI - ").unwrap_or(raw).trim()
}

pub struct SearchBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SearchBackend {
    pub fn new(http: reqwest::Client, api_key: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            base_url: SEARCH_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// One search call covering the collection window. Results map to
    /// Documents; records without a URL are dropped.
    pub async fn fetch(
        &self,
        query: &str,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        let now = Utc::now();
        let from = now - chrono::Duration::days(window_days);
        let page_size = max_results.min(MAX_PAGE_SIZE);

        debug!(query, page_size, "Search backend request");

        let params = [
            ("q", query.to_string()),
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", now.format("%Y-%m-%d").to_string()),
            ("sortBy", "relevancy".to_string()),
            ("pageSize", page_size.to_string()),
            ("language", "en".to_string()),
            ("apiKey", self.api_key.clone()),
        ];

        let request = self
            .http
            .get(&self.base_url)
            .timeout(SEARCH_TIMEOUT)
            .query(&params)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FarwatchError::fetch("search", "cancelled")),
            result = request => result.map_err(|e| FarwatchError::fetch("search", e))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FarwatchError::fetch(
                "search",
                format!("HTTP {status}: {body}"),
            ));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| FarwatchError::fetch("search", e))?;

        let documents = parsed
            .articles
            .into_iter()
            .filter_map(|article| {
                let url = article.url?;
                let source = article
                    .source
                    .and_then(|s| s.name)
                    .map(|name| clean_source_name(&name).to_string())
                    .unwrap_or_else(|| "Unknown Source".to_string());
                Some(Document {
                    title: article.title.unwrap_or_default(),
                    body: article.description.unwrap_or_default(),
                    url,
                    source,
                    published_at: parse_published(article.published_at.as_deref()),
                    backend: BackendKind::Search,
                    backend_meta: serde_json::Value::Null,
                })
            })
            .take(page_size)
            .collect();

        Ok(documents)
    }
}

/// Parse an upstream timestamp as UTC. Unparseable input yields None; the
/// field stays null rather than being invented.
fn parse_published(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
