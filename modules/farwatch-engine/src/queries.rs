//! Search-query generation for one PIR, with the single graceful-degradation
//! path in the system: on any failure, collection proceeds with the PIR text
//! itself as the query.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use ai_client::{truncate_to_char_boundary, LlmClient};
use farwatch_common::{Pir, Strategy};

use crate::traits::QueryGenerator;

const QUERY_GEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum length of the fallback query.
const FALLBACK_QUERY_LEN: usize = 100;

/// The fallback when query generation fails or returns nothing.
pub fn fallback_query(pir: &Pir) -> String {
    truncate_to_char_boundary(&pir.text, FALLBACK_QUERY_LEN).to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryResponse {
    #[serde(default)]
    queries: Vec<String>,
}

pub struct LlmQueryGenerator {
    client: LlmClient,
}

impl LlmQueryGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueryGenerator for LlmQueryGenerator {
    async fn queries(&self, pir: &Pir, strategy: &Strategy) -> anyhow::Result<Vec<String>> {
        let prompt = format!(
            "Generate 3-5 optimal search queries for collecting intelligence about this \
             requirement.\n\n\
             STRATEGIC APPROACH: {}\n\
             INTELLIGENCE DOMAINS: {}\n\n\
             REQUIREMENT: {}\n\n\
             Queries should cover the core concepts and entities, related domain terms, \
             and the different ways this intelligence might be phrased in news coverage. \
             Specific enough to find relevant content, broad enough to capture different \
             perspectives.\n\n\
             Respond in JSON format:\n\
             {{\"queries\": [\"query1\", \"query2\", \"query3\"]}}",
            strategy.approach,
            strategy.domains.join(", "),
            pir.text,
        );

        let response: QueryResponse = self
            .client
            .extract(
                "You generate focused news search queries. You respond only with JSON.",
                &prompt,
                QUERY_GEN_TIMEOUT,
            )
            .await?;

        if response.queries.is_empty() {
            anyhow::bail!("query generation returned no queries");
        }

        debug!(pir = pir.id.as_str(), count = response.queries.len(), "Queries generated");
        Ok(response.queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_truncates_long_pir_text() {
        let pir = Pir {
            id: "p1".to_string(),
            text: "x".repeat(300),
            priority: None,
            session_id: "s".to_string(),
        };
        assert_eq!(fallback_query(&pir).len(), 100);
    }

    #[test]
    fn fallback_keeps_short_text_intact() {
        let pir = Pir {
            id: "p1".to_string(),
            text: "Monitor pump efficiency ratings".to_string(),
            priority: None,
            session_id: "s".to_string(),
        };
        assert_eq!(fallback_query(&pir), "Monitor pump efficiency ratings");
    }
}
