//! Feed validation: probe a URL, read a small prefix, decide whether it
//! serves an Atom/RSS-family feed.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use farwatch_common::{extract_host, ValidatedSource};

/// Overall budget for one probe, connect included.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(6);

/// How much of the body is enough to classify.
pub const PREFIX_BYTES: usize = 2048;

/// Substrings (lower-cased) that mark a feed body or feed MIME type.
const FEED_MARKERS: &[&str] = &[
    "<rss",
    "<feed",
    "<channel>",
    "<item>",
    "<entry>",
    "application/rss+xml",
    "application/atom+xml",
];

/// Outcome of classifying a body prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedProbe {
    Feed { title: Option<String> },
    NotAFeed,
}

/// Classify the first bytes of a response body. Pure so the marker and
/// title rules are testable without a socket.
pub fn classify_prefix(prefix: &[u8]) -> FeedProbe {
    let text = String::from_utf8_lossy(prefix).to_lowercase();

    if !FEED_MARKERS.iter().any(|marker| text.contains(marker)) {
        return FeedProbe::NotAFeed;
    }

    FeedProbe::Feed {
        title: extract_title(&text),
    }
}

/// First `<title>…</title>` in the prefix, capped at 100 chars.
fn extract_title(lowered: &str) -> Option<String> {
    let start = lowered.find("<title>")? + "<title>".len();
    let end = lowered[start..].find("</title>")? + start;
    let title: String = lowered[start..end].trim().chars().take(100).collect();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Probes URLs against the feed markers. Cheap to clone; shares the
/// process-wide connection pool.
#[derive(Clone)]
pub struct SourceValidator {
    http: reqwest::Client,
}

impl SourceValidator {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Probe one URL. `Err` carries a short reason string; no reason is
    /// fatal to the batch.
    pub async fn validate(
        &self,
        url: &str,
        discovery_method: &str,
        confidence: f64,
        cancel: &CancellationToken,
    ) -> Result<ValidatedSource, String> {
        let request = self
            .http
            .get(url)
            .timeout(PROBE_TIMEOUT)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err("cancelled".to_string()),
            result = request => result.map_err(|e| {
                if e.is_timeout() {
                    "timeout".to_string()
                } else {
                    format!("connect: {e}")
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let prefix = read_prefix(response, cancel).await?;

        match classify_prefix(&prefix) {
            FeedProbe::Feed { title } => {
                let host = extract_host(url);
                debug!(url, host, "Feed validated");
                Ok(ValidatedSource {
                    url: url.to_string(),
                    title: title.unwrap_or_else(|| host.clone()),
                    host,
                    discovery_method: discovery_method.to_string(),
                    confidence,
                })
            }
            FeedProbe::NotAFeed => Err("no feed markers in prefix".to_string()),
        }
    }
}

/// Read at most PREFIX_BYTES of the body, then stop. The rest of the
/// response is dropped along with the connection.
async fn read_prefix(
    mut response: reqwest::Response,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, String> {
    let mut prefix: Vec<u8> = Vec::with_capacity(PREFIX_BYTES);
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err("cancelled".to_string()),
            chunk = response.chunk() => chunk.map_err(|e| format!("read: {e}"))?,
        };
        let Some(chunk) = chunk else { break };
        prefix.extend_from_slice(&chunk);
        if prefix.len() >= PREFIX_BYTES {
            prefix.truncate(PREFIX_BYTES);
            break;
        }
    }
    Ok(prefix)
}
