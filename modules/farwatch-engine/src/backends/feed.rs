//! Feed backend: pull Atom/RSS entries from validated sources.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use farwatch_common::{BackendKind, Document, FarwatchError, ValidatedSource};

const FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// Fingerprint set bounds: prune to the most recent `KEEP` once `LIMIT`
/// is exceeded.
const FINGERPRINT_LIMIT: usize = 10_000;
const FINGERPRINT_KEEP: usize = 5_000;

/// Campaign-scoped set of entry fingerprints with insertion-order pruning.
#[derive(Debug, Default)]
pub struct FingerprintSet {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl FingerprintSet {
    /// Insert a fingerprint; false means it was already present.
    pub fn insert(&mut self, fingerprint: String) -> bool {
        if !self.seen.insert(fingerprint.clone()) {
            return false;
        }
        self.order.push_back(fingerprint);
        if self.order.len() > FINGERPRINT_LIMIT {
            while self.order.len() > FINGERPRINT_KEEP {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// MD5 over the normalized title+link pair.
pub fn entry_fingerprint(title: &str, link: &str) -> String {
    let normalized = format!(
        "{}|{}",
        title.trim().to_lowercase(),
        link.trim().to_lowercase()
    );
    format!("{:x}", md5::compute(normalized.as_bytes()))
}

pub struct FeedBackend {
    http: reqwest::Client,
    seen: Mutex<FingerprintSet>,
}

impl FeedBackend {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            seen: Mutex::new(FingerprintSet::default()),
        }
    }

    /// Fetch and parse one feed. Entries already fingerprinted in this
    /// campaign, or older than the window, are rejected.
    pub async fn fetch(
        &self,
        source: &ValidatedSource,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        let request = self
            .http
            .get(&source.url)
            .timeout(FEED_TIMEOUT)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FarwatchError::fetch("feed", "cancelled")),
            result = request => result.map_err(|e| FarwatchError::fetch("feed", e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FarwatchError::fetch("feed", format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FarwatchError::fetch("feed", e))?;

        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| FarwatchError::fetch("feed", format!("parse: {e}")))?;

        let documents = {
            let mut seen = self.seen.lock().expect("fingerprint lock poisoned");
            map_entries(feed, source, window_days, max_results, &mut seen)
        };

        debug!(
            feed = source.url.as_str(),
            entries = documents.len(),
            "Feed pull complete"
        );

        Ok(documents)
    }
}

/// Map parsed feed entries to Documents. Entries without a resolvable link,
/// outside the window, or already fingerprinted are rejected.
fn map_entries(
    feed: feed_rs::model::Feed,
    source: &ValidatedSource,
    window_days: i64,
    max_results: usize,
    seen: &mut FingerprintSet,
) -> Vec<Document> {
    let cutoff = Utc::now() - chrono::Duration::days(window_days);
    let mut documents = Vec::new();

    for entry in feed.entries {
        if documents.len() >= max_results {
            break;
        }

        let Some(link) = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
        else {
            continue;
        };

        let title = entry.title.map(|t| t.content).unwrap_or_default();

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        if let Some(date) = published_at {
            if date < cutoff {
                continue;
            }
        }

        if !seen.insert(entry_fingerprint(&title, &link)) {
            continue;
        }

        let body = entry.summary.map(|t| t.content).unwrap_or_default();

        let authors: Vec<String> = entry.authors.iter().map(|a| a.name.clone()).collect();
        let tags: Vec<String> = entry.categories.iter().map(|c| c.term.clone()).collect();

        documents.push(Document {
            title,
            body,
            url: link,
            source: source.title.clone(),
            published_at,
            backend: BackendKind::Feed,
            backend_meta: serde_json::json!({
                "feed_url": source.url,
                "authors": authors,
                "tags": tags,
            }),
        });
    }

    documents
}
