pub mod feed;
pub mod filing;
pub mod search;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use farwatch_common::{Document, FarwatchError, ValidatedSource};

pub use feed::FeedBackend;
pub use filing::FilingBackend;
pub use search::SearchBackend;

/// The three document backends behind one seam, so collection logic can be
/// driven in tests without a socket.
#[async_trait]
pub trait FetchBackends: Send + Sync {
    /// Keyword search over the news API. Errors when the backend is
    /// disabled (no key configured).
    async fn search(
        &self,
        query: &str,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError>;

    /// Pull entries from one validated feed.
    async fn poll_feed(
        &self,
        source: &ValidatedSource,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError>;

    /// Pull regulatory filings for one issuer name or ticker.
    async fn filings(
        &self,
        company: &str,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError>;

    fn search_enabled(&self) -> bool;
}

/// Production wiring: all three backends over the shared HTTP pool.
pub struct Backends {
    pub search: Option<SearchBackend>,
    pub feed: FeedBackend,
    pub filing: FilingBackend,
}

#[async_trait]
impl FetchBackends for Backends {
    async fn search(
        &self,
        query: &str,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        match &self.search {
            Some(backend) => backend.fetch(query, window_days, max_results, cancel).await,
            None => Err(FarwatchError::fetch("search", "search backend disabled")),
        }
    }

    async fn poll_feed(
        &self,
        source: &ValidatedSource,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        self.feed
            .fetch(source, window_days, max_results, cancel)
            .await
    }

    async fn filings(
        &self,
        company: &str,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        self.filing
            .fetch(company, window_days, max_results, cancel)
            .await
    }

    fn search_enabled(&self) -> bool {
        self.search.is_some()
    }
}
