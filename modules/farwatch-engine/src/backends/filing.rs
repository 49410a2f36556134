//! Regulatory-filing backend: resolve an issuer to its 10-digit identifier,
//! pull the host's issuer-scoped Atom listing, and map filings to Documents.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use farwatch_common::{BackendKind, Document, FarwatchError};

const FILING_HOST: &str = "https://www.sec.gov";
const TICKER_DIRECTORY_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const FILING_TIMEOUT: Duration = Duration::from_secs(30);

/// Filing body cap for evaluation.
const BODY_MAX_CHARS: usize = 5_000;

/// Known form types, in match order. Longer/rarer forms come before their
/// prefixes would shadow them.
const KNOWN_FORMS: &[&str] = &[
    "10-K", "10-Q", "8-K", "DEF 14A", "13F-HR", "SC 13G", "SC 13D", "424B", "S-1",
];

/// Extract the form type from a filing title; unrecognized forms tag OTHER.
pub fn extract_form_type(title: &str) -> String {
    let upper = title.to_uppercase();
    for form in KNOWN_FORMS {
        if upper.contains(form) {
            return (*form).to_string();
        }
    }
    "OTHER".to_string()
}

/// Pull ticker-looking symbols and suffixed company names out of free text.
/// This is the issuer seed list for filing collection.
pub fn extract_companies(text: &str) -> Vec<String> {
    let patterns = [
        r"\b[A-Z][A-Za-z]+ (?:Inc|Corp|Co|LLC)(?:\.|\b)",
        r"\b[A-Z]{2,5}\b",
    ];

    let mut companies = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for pattern in patterns {
        let re = Regex::new(pattern).expect("static company regex");
        for m in re.find_iter(text) {
            let name = m.as_str().trim().to_string();
            if seen.insert(name.to_uppercase()) {
                companies.push(name);
            }
        }
    }
    companies
}

/// Strip markup and collapse whitespace; cap at the evaluation body limit.
pub fn strip_markup(content: &str) -> String {
    let tag_re = Regex::new(r"<[^>]+>").expect("static tag regex");
    let without_tags = tag_re.replace_all(content, " ");
    let collapsed = without_tags.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = collapsed.len().min(BODY_MAX_CHARS);
    while !collapsed.is_char_boundary(end) {
        end -= 1;
    }
    collapsed[..end].to_string()
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    cik_str: u64,
    ticker: String,
    title: String,
}

pub struct FilingBackend {
    http: reqwest::Client,
    contact: String,
    base_url: String,
    directory_url: String,
    fetch_bodies: bool,
}

impl FilingBackend {
    pub fn new(http: reqwest::Client, contact: &str) -> Self {
        Self {
            http,
            contact: contact.to_string(),
            base_url: FILING_HOST.to_string(),
            directory_url: TICKER_DIRECTORY_URL.to_string(),
            fetch_bodies: false,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_directory_url(mut self, url: &str) -> Self {
        self.directory_url = url.to_string();
        self
    }

    /// Fetch each filing's primary document as the Document body instead of
    /// the listing summary.
    pub fn with_body_fetch(mut self, enabled: bool) -> Self {
        self.fetch_bodies = enabled;
        self
    }

    fn user_agent(&self) -> String {
        format!("farwatch/0.1 ({})", self.contact)
    }

    /// Filings for one issuer within the window, newest first as listed.
    pub async fn fetch(
        &self,
        company: &str,
        window_days: i64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        let Some(cik) = self.resolve_issuer(company, cancel).await? else {
            debug!(company, "No issuer identifier found");
            return Ok(Vec::new());
        };

        let listing_url = format!(
            "{}/cgi-bin/browse-edgar?action=getcompany&CIK={}&dateb={}&count=100&output=atom",
            self.base_url,
            cik,
            Utc::now().format("%Y%m%d"),
        );

        let request = self
            .http
            .get(&listing_url)
            .header("User-Agent", self.user_agent())
            .timeout(FILING_TIMEOUT)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FarwatchError::fetch("filing", "cancelled")),
            result = request => result.map_err(|e| FarwatchError::fetch("filing", e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FarwatchError::fetch("filing", format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FarwatchError::fetch("filing", e))?;

        let listing = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| FarwatchError::fetch("filing", format!("listing parse: {e}")))?;

        let cutoff = Utc::now() - chrono::Duration::days(window_days);
        let mut documents = Vec::new();

        for entry in listing.entries {
            if documents.len() >= max_results {
                break;
            }

            let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
                continue;
            };
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let updated = entry.updated.map(|dt| dt.with_timezone(&Utc));

            // Filings older than the window never reach evaluation.
            match updated {
                Some(date) if date < cutoff => continue,
                _ => {}
            }

            let summary = entry.summary.map(|t| t.content).unwrap_or_default();
            let form_type = extract_form_type(&title);

            let body = if self.fetch_bodies {
                match self.fetch_primary_document(&link, cancel).await {
                    Ok(Some(text)) => text,
                    Ok(None) => strip_markup(&summary),
                    Err(e) => {
                        warn!(company, error = %e, "Filing body fetch failed, using summary");
                        strip_markup(&summary)
                    }
                }
            } else {
                strip_markup(&summary)
            };

            documents.push(Document {
                title: format!("{company} - {form_type}: {title}"),
                body,
                url: link,
                source: format!("EDGAR - {company}"),
                published_at: updated,
                backend: BackendKind::Filing,
                backend_meta: serde_json::json!({
                    "cik": cik.as_str(),
                    "form_type": form_type,
                }),
            });
        }

        debug!(company, cik, filings = documents.len(), "Filing pull complete");

        Ok(documents)
    }

    /// Resolve a name or ticker against the vendor directory. Returns the
    /// identifier zero-padded to 10 digits.
    async fn resolve_issuer(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, FarwatchError> {
        let request = self
            .http
            .get(&self.directory_url)
            .header("User-Agent", self.user_agent())
            .timeout(FILING_TIMEOUT)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FarwatchError::fetch("filing", "cancelled")),
            result = request => result.map_err(|e| FarwatchError::fetch("filing", e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FarwatchError::fetch(
                "filing",
                format!("directory HTTP {status}"),
            ));
        }

        let directory: HashMap<String, DirectoryEntry> = response
            .json()
            .await
            .map_err(|e| FarwatchError::fetch("filing", format!("directory decode: {e}")))?;

        Ok(match_issuer(&directory, identifier))
    }

    /// Fetch the filing page, follow the first `.htm`/`.txt` document link,
    /// and return its cleaned text.
    async fn fetch_primary_document(
        &self,
        filing_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, FarwatchError> {
        let page = self.get_text(filing_url, cancel).await?;

        let link_re = Regex::new(r#"href="([^"]*\.(?:htm|txt))""#).expect("static link regex");
        let Some(doc_path) = link_re
            .captures(&page)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            return Ok(None);
        };

        let doc_url = if doc_path.starts_with("http") {
            doc_path
        } else {
            format!("{}{}", self.base_url, doc_path)
        };

        let content = self.get_text(&doc_url, cancel).await?;
        Ok(Some(strip_markup(&content)))
    }

    async fn get_text(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FarwatchError> {
        let request = self
            .http
            .get(url)
            .header("User-Agent", self.user_agent())
            .timeout(FILING_TIMEOUT)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FarwatchError::fetch("filing", "cancelled")),
            result = request => result.map_err(|e| FarwatchError::fetch("filing", e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FarwatchError::fetch("filing", format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| FarwatchError::fetch("filing", e))
    }
}

fn match_issuer(
    directory: &HashMap<String, DirectoryEntry>,
    identifier: &str,
) -> Option<String> {
    let wanted = identifier.trim();
    let wanted_upper = wanted.to_uppercase();

    let hit = directory
        .values()
        .find(|entry| entry.ticker == wanted_upper)
        .or_else(|| {
            directory
                .values()
                .find(|entry| entry.title.to_uppercase().contains(&wanted_upper))
        })?;

    Some(format!("{:010}", hit.cik_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_types_match_in_order() {
        assert_eq!(extract_form_type("8-K - Current report"), "8-K");
        assert_eq!(extract_form_type("DEF 14A Proxy Statement"), "DEF 14A");
        assert_eq!(extract_form_type("Annual report (10-K)"), "10-K");
        assert_eq!(extract_form_type("Mystery filing"), "OTHER");
    }

    #[test]
    fn markup_is_stripped_and_collapsed() {
        let html = "<html><body><p>Quarterly   results</p>\n<p>improved</p></body></html>";
        assert_eq!(strip_markup(html), "Quarterly results improved");
    }

    #[test]
    fn stripped_body_is_capped() {
        let html = format!("<p>{}</p>", "word ".repeat(3000));
        assert!(strip_markup(&html).len() <= BODY_MAX_CHARS);
    }

    #[test]
    fn companies_are_extracted_from_text() {
        let text = "Monitor Danfoss Inc. and rival PMP for pump efficiency claims";
        let companies = extract_companies(text);
        assert!(companies.iter().any(|c| c == "Danfoss Inc."));
        assert!(companies.iter().any(|c| c == "PMP"));
    }

    #[test]
    fn issuer_matching_prefers_ticker() {
        let mut directory = HashMap::new();
        directory.insert(
            "0".to_string(),
            DirectoryEntry {
                cik_str: 320193,
                ticker: "AAPL".to_string(),
                title: "Apple Inc.".to_string(),
            },
        );
        assert_eq!(match_issuer(&directory, "AAPL"), Some("0000320193".to_string()));
        assert_eq!(match_issuer(&directory, "apple"), Some("0000320193".to_string()));
        assert_eq!(match_issuer(&directory, "Microsoft"), None);
    }
}
