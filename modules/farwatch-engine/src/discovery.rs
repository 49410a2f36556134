//! Source discovery: fast validation of recommended feeds. Direct URLs are
//! probed first; an endpoint sweep over well-known feed paths only runs when
//! too few direct probes succeed. No HTML crawling, no link-rel discovery.

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use farwatch_common::{extract_host, SourceCandidate, ValidatedSource};

use crate::validator::SourceValidator;

/// Canonical feed paths, in probe order. These are the endpoints that
/// resolve in practice; anything fancier costs minutes and finds nothing.
pub const FEED_ENDPOINTS: &[&str] = &[
    "/rss",
    "/rss.xml",
    "/feed",
    "/feed.xml",
    "/feeds/all.xml",
    "/news/rss",
    "/news/feed",
    "/news/rss.xml",
    "/api/rss",
    "/feeds/news.xml",
    "/atom.xml",
    "/feeds.xml",
];

const MAX_PARALLEL_HOSTS: usize = 10;
const MAX_PARALLEL_ENDPOINTS: usize = 5;
const HOST_BUDGET: Duration = Duration::from_secs(25);
const DIRECT_PROBE_CONCURRENCY: usize = 10;

/// What a discovery pass produced: every confirmed feed, plus the names of
/// candidates for which every attempt failed (surfaced for reporting).
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub validated: Vec<ValidatedSource>,
    pub failed_names: Vec<String>,
}

/// Recommendation lists sometimes arrive nested one level deep. Flatten a
/// raw JSON array into candidates, dropping anything that doesn't parse.
pub fn flatten_candidates(raw: Vec<serde_json::Value>) -> Vec<SourceCandidate> {
    let mut out = Vec::new();
    for value in raw {
        match value {
            serde_json::Value::Array(inner) => {
                for item in inner {
                    if let Ok(candidate) = serde_json::from_value::<SourceCandidate>(item) {
                        out.push(candidate);
                    }
                }
            }
            other => {
                if let Ok(candidate) = serde_json::from_value::<SourceCandidate>(other) {
                    out.push(candidate);
                }
            }
        }
    }
    out
}

#[derive(Clone)]
pub struct SourceDiscovery {
    validator: SourceValidator,
}

impl SourceDiscovery {
    pub fn new(validator: SourceValidator) -> Self {
        Self { validator }
    }

    /// Validate recommended candidates. Phase 1 probes every supplied feed
    /// URL in parallel; phase 2 sweeps well-known endpoints on the
    /// candidates' hosts, but only when phase 1 confirmed fewer than half.
    pub async fn discover(
        &self,
        candidates: &[SourceCandidate],
        cancel: &CancellationToken,
    ) -> DiscoveryOutcome {
        let mut validated: Vec<ValidatedSource> = Vec::new();

        // Phase 1: direct URLs.
        let direct: Vec<&SourceCandidate> = candidates
            .iter()
            .filter(|c| {
                c.feed_url
                    .as_deref()
                    .is_some_and(|u| u.starts_with("http"))
            })
            .collect();

        info!(
            candidates = candidates.len(),
            direct_urls = direct.len(),
            "Source discovery starting"
        );

        let direct_futures: Vec<_> = direct
            .iter()
            .map(|candidate| {
                let url = candidate.feed_url.clone().unwrap_or_default();
                let confidence = candidate.confidence;
                async move {
                    self.validator
                        .validate(&url, "direct_url", confidence, cancel)
                        .await
                }
            })
            .collect();
        let probes: Vec<_> = stream::iter(direct_futures)
            .buffer_unordered(DIRECT_PROBE_CONCURRENCY)
            .collect()
            .await;

        for probe in probes {
            match probe {
                Ok(source) => validated.push(source),
                Err(reason) => {
                    warn!(reason, "Direct feed probe failed");
                }
            }
        }

        // Phase 2: endpoint sweep, only on a weak phase-1 showing.
        if validated.len() * 2 < candidates.len() {
            let hosts = hosts_to_sweep(candidates, &validated);
            if !hosts.is_empty() {
                info!(hosts = hosts.len(), "Endpoint sweep starting");
                let sweep_futures: Vec<_> = hosts
                    .iter()
                    .map(|host| self.sweep_host(host.clone(), cancel))
                    .collect();
                let swept: Vec<_> = stream::iter(sweep_futures)
                    .buffer_unordered(MAX_PARALLEL_HOSTS)
                    .collect()
                    .await;
                validated.extend(swept.into_iter().flatten());
            }
        }

        // Union, deduplicated by URL; first occurrence wins.
        let mut seen = HashSet::new();
        validated.retain(|source| seen.insert(source.url.clone()));

        let failed_names = failed_candidate_names(candidates, &validated);

        info!(
            validated = validated.len(),
            failed = failed_names.len(),
            "Source discovery complete"
        );

        DiscoveryOutcome {
            validated,
            failed_names,
        }
    }

    /// Probe the canonical endpoints of one host, up to five at a time,
    /// stopping at the first confirmed feed. One wall-clock budget covers
    /// the whole host; an overrun is recorded, never retried.
    async fn sweep_host(
        &self,
        host: String,
        cancel: &CancellationToken,
    ) -> Option<ValidatedSource> {
        let base = if host.starts_with("http") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };

        let sweep = async {
            for batch in FEED_ENDPOINTS.chunks(MAX_PARALLEL_ENDPOINTS) {
                let endpoint_futures: Vec<_> = batch
                    .iter()
                    .map(|endpoint| {
                        let url = format!("{base}{endpoint}");
                        async move {
                            self.validator
                                .validate(&url, "endpoint_sweep", 0.5, cancel)
                                .await
                        }
                    })
                    .collect();
                let probes: Vec<_> = stream::iter(endpoint_futures)
                    .buffer_unordered(MAX_PARALLEL_ENDPOINTS)
                    .collect()
                    .await;

                if let Some(source) = probes.into_iter().flatten().next() {
                    return Some(source);
                }
            }
            None
        };

        match tokio::time::timeout(HOST_BUDGET, sweep).await {
            Ok(found) => {
                if let Some(ref source) = found {
                    info!(host = source.host.as_str(), url = source.url.as_str(), "Endpoint sweep hit");
                }
                found
            }
            Err(_) => {
                warn!(host, "Endpoint sweep exceeded host budget");
                None
            }
        }
    }
}

/// Hosts worth sweeping: candidates whose supplied URL (if any) did not
/// validate, keyed by their domain or the host of their feed URL.
fn hosts_to_sweep(candidates: &[SourceCandidate], validated: &[ValidatedSource]) -> Vec<String> {
    let validated_urls: HashSet<&str> = validated.iter().map(|s| s.url.as_str()).collect();
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();

    for candidate in candidates {
        if candidate
            .feed_url
            .as_deref()
            .is_some_and(|u| validated_urls.contains(u))
        {
            continue;
        }
        let host = if !candidate.domain.is_empty() {
            candidate.domain.clone()
        } else if let Some(url) = candidate.feed_url.as_deref() {
            extract_host(url)
        } else {
            continue;
        };
        if !host.is_empty() && seen.insert(host.clone()) {
            hosts.push(host);
        }
    }
    hosts
}

/// Candidate names with no validated URL on their host or direct URL.
fn failed_candidate_names(
    candidates: &[SourceCandidate],
    validated: &[ValidatedSource],
) -> Vec<String> {
    let validated_urls: HashSet<&str> = validated.iter().map(|s| s.url.as_str()).collect();
    let validated_hosts: HashSet<&str> = validated.iter().map(|s| s.host.as_str()).collect();

    candidates
        .iter()
        .filter(|candidate| {
            let direct_ok = candidate
                .feed_url
                .as_deref()
                .is_some_and(|u| validated_urls.contains(u));
            let host = if candidate.domain.is_empty() {
                candidate.feed_url.as_deref().map(extract_host)
            } else {
                Some(extract_host(&candidate.domain))
            };
            let swept_ok = host
                .as_deref()
                .is_some_and(|h| validated_hosts.contains(h));
            !direct_ok && !swept_ok
        })
        .map(|candidate| candidate.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_handles_one_level_of_nesting() {
        let raw = vec![
            json!({"domain": "a.com", "name": "A", "rss_url": "https://a.com/rss"}),
            json!([
                {"domain": "b.com", "name": "B"},
                {"domain": "c.com", "name": "C"}
            ]),
        ];
        let candidates = flatten_candidates(raw);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[1].name, "B");
    }

    #[test]
    fn flatten_drops_garbage() {
        let raw = vec![json!(42), json!({"name": "D", "domain": "d.com"})];
        let candidates = flatten_candidates(raw);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "D");
    }

    fn candidate(name: &str, domain: &str, url: Option<&str>) -> SourceCandidate {
        SourceCandidate {
            domain: domain.to_string(),
            name: name.to_string(),
            feed_url: url.map(String::from),
            source_type: None,
            confidence: 0.8,
        }
    }

    fn validated(url: &str, host: &str) -> ValidatedSource {
        ValidatedSource {
            url: url.to_string(),
            title: host.to_string(),
            host: host.to_string(),
            discovery_method: "direct_url".to_string(),
            confidence: 0.8,
        }
    }

    #[test]
    fn failed_names_excludes_validated_candidates() {
        let candidates = vec![
            candidate("Good", "good.com", Some("https://good.com/rss")),
            candidate("Bad", "bad.com", Some("https://bad.com/rss")),
        ];
        let confirmed = vec![validated("https://good.com/rss", "good.com")];
        let failed = failed_candidate_names(&candidates, &confirmed);
        assert_eq!(failed, vec!["Bad".to_string()]);
    }

    #[test]
    fn swept_host_counts_as_success() {
        let candidates = vec![candidate("Swept", "swept.com", None)];
        let confirmed = vec![validated("https://swept.com/feed", "swept.com")];
        assert!(failed_candidate_names(&candidates, &confirmed).is_empty());
    }

    #[test]
    fn hosts_to_sweep_skips_validated_and_dedupes() {
        let candidates = vec![
            candidate("A", "a.com", Some("https://a.com/rss")),
            candidate("B", "b.com", None),
            candidate("B2", "b.com", None),
        ];
        let confirmed = vec![validated("https://a.com/rss", "a.com")];
        let hosts = hosts_to_sweep(&candidates, &confirmed);
        assert_eq!(hosts, vec!["b.com".to_string()]);
    }
}
