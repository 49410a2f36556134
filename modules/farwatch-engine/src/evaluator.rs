//! Evaluation and signal writing: every collected document is judged against
//! its PIR by the LLM, and judged-relevant documents become persisted signals
//! with the original article fields kept separate from the AI reasoning.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ai_client::{truncate_to_char_boundary, LlmClient};
use farwatch_common::{
    extract_host, BackendKind, CollectionParams, Document, Evaluation, Pir, Strategy,
};
use farwatch_store::NewSignal;

use crate::stats::CampaignStats;
use crate::traits::{DocumentEvaluator, SignalSink};

const EVALUATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How much of the document body the evaluation prompt carries.
const BODY_PROMPT_CHARS: usize = 500;

/// Status written on every fresh signal row.
const SIGNAL_STATUS: &str = "ai_evaluated";

// ---------------------------------------------------------------------------
// LLM evaluator
// ---------------------------------------------------------------------------

pub struct LlmEvaluator {
    client: LlmClient,
}

impl LlmEvaluator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentEvaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        document: &Document,
        pir: &Pir,
        strategy: &Strategy,
        threshold: f64,
    ) -> anyhow::Result<Evaluation> {
        let prompt = build_evaluation_prompt(document, pir, strategy, threshold);
        self.client
            .extract(
                "You evaluate news content for strategic intelligence value. \
                 You respond only with JSON.",
                &prompt,
                EVALUATION_TIMEOUT,
            )
            .await
    }
}

fn build_evaluation_prompt(
    document: &Document,
    pir: &Pir,
    strategy: &Strategy,
    threshold: f64,
) -> String {
    format!(
        "Evaluate whether this news content provides strategic intelligence value for \
         decision-making.\n\n\
         STRATEGIC CONTEXT:\n\
         - Strategic Approach: {}\n\
         - Intelligence Domains: {}\n\
         - Urgency Level: {}\n\
         - Cross-PIR Context: {}\n\n\
         SPECIFIC INTELLIGENCE REQUIREMENT:\n{}\n\n\
         CONTENT TO EVALUATE:\n\
         Title: {}\n\
         Description: {}\n\
         Source: {}\n\
         URL: {}\n\n\
         Weigh strategic relevance, alignment with the requirement, decision value, \
         timeliness for the urgency level, and value to other requirements.\n\n\
         THRESHOLD FOR INCLUSION: {:.3}\n\n\
         Respond in JSON format:\n\
         {{\n\
           \"relevance_score\": 0.0,\n\
           \"recommendation\": \"include|exclude|uncertain\",\n\
           \"reasoning\": \"Brief explanation of the evaluation decision\",\n\
           \"strategic_connections\": [\"connection1\"],\n\
           \"decision_support_value\": \"high|medium|low\",\n\
           \"intelligence_type\": \"competitive|market|regulatory|technology|financial|operational\",\n\
           \"urgency_match\": \"immediate|strategic|long_term\"\n\
         }}\n\n\
         Only recommend inclusion when the content provides genuine strategic \
         intelligence value.",
        strategy.approach,
        strategy.domains.join(", "),
        strategy.urgency,
        strategy.cross_pir_analysis,
        pir.text,
        document.title,
        truncate_to_char_boundary(&document.body, BODY_PROMPT_CHARS),
        document.source,
        document.url,
        threshold,
    )
}

// ---------------------------------------------------------------------------
// Signal writer
// ---------------------------------------------------------------------------

/// Serialize the evaluation metadata blob. The reasoning text deliberately
/// stays out of it; reasoning has its own column.
pub fn raw_signal_text(evaluation: &Evaluation) -> String {
    serde_json::json!({
        "strategic_connections": evaluation.connections,
        "decision_support_value": evaluation.decision_support_value,
        "intelligence_type": evaluation.intelligence_type,
        "urgency_match": evaluation.urgency_match,
        "evaluation_timestamp": Utc::now().to_rfc3339(),
    })
    .to_string()
}

/// The URL a source row is keyed by: the feed for feed documents, the
/// publisher host otherwise. Keeps one row per publisher, not per article.
pub fn source_row_url(document: &Document) -> String {
    if document.backend == BackendKind::Feed {
        if let Some(feed_url) = document
            .backend_meta
            .get("feed_url")
            .and_then(|v| v.as_str())
        {
            return feed_url.to_string();
        }
    }
    format!("https://{}", extract_host(&document.url))
}

/// Runs evaluations for one PIR and writes the resulting signals.
pub struct SignalPipeline {
    judge: Arc<dyn DocumentEvaluator>,
    sink: Arc<dyn SignalSink>,
    stats: Arc<CampaignStats>,
    /// Campaign-local (pir id, document url) pairs already written.
    written: Mutex<HashSet<(String, String)>>,
}

impl SignalPipeline {
    pub fn new(
        judge: Arc<dyn DocumentEvaluator>,
        sink: Arc<dyn SignalSink>,
        stats: Arc<CampaignStats>,
    ) -> Self {
        Self {
            judge,
            sink,
            stats,
            written: Mutex::new(HashSet::new()),
        }
    }

    /// Evaluate documents for one PIR in sequential batches of
    /// `eval_batch_size`, members of a batch in parallel. Returns the number
    /// of signals created. One member's failure never aborts its peers.
    pub async fn evaluate_pir(
        &self,
        documents: &[Document],
        pir: &Pir,
        strategy: &Strategy,
        params: &CollectionParams,
        cancel: &CancellationToken,
    ) -> u32 {
        let mut created: u32 = 0;

        for batch in documents.chunks(params.eval_batch_size.max(1)) {
            if created >= params.max_signals_per_pir as u32 || cancel.is_cancelled() {
                break;
            }

            let evaluations = tokio::select! {
                _ = cancel.cancelled() => break,
                results = join_all(batch.iter().map(|document| async move {
                    self.judge
                        .evaluate(document, pir, strategy, params.threshold)
                        .await
                })) => results,
            };

            for (document, result) in batch.iter().zip(evaluations) {
                self.stats.record_evaluation();
                match result {
                    Ok(evaluation) => {
                        if !evaluation.should_create_signal(params.threshold) {
                            continue;
                        }
                        // Evaluations that finish after the cap are dropped.
                        if created >= params.max_signals_per_pir as u32 {
                            debug!(pir = pir.id.as_str(), "Signal cap reached, dropping");
                            continue;
                        }
                        if self.write_signal(document, pir, &evaluation).await {
                            created += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            pir = pir.id.as_str(),
                            url = document.url.as_str(),
                            error = %e,
                            "Evaluation failed"
                        );
                        self.stats.record_evaluation_error();
                    }
                }
            }
        }

        created
    }

    /// Resolve the source row and insert the signal. Returns false on a
    /// duplicate (pir, url) pair or a persistence failure.
    async fn write_signal(&self, document: &Document, pir: &Pir, evaluation: &Evaluation) -> bool {
        {
            let mut written = self.written.lock().expect("dedupe lock poisoned");
            if !written.insert((pir.id.clone(), document.url.clone())) {
                return false;
            }
        }

        let source_id = match self
            .sink
            .resolve_source(
                &document.source,
                &source_row_url(document),
                &document.backend.to_string(),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(source = document.source.as_str(), error = %e, "Source resolve failed");
                self.stats.record_persistence_error();
                return false;
            }
        };

        let signal = NewSignal {
            indicator_id: pir.id.clone(),
            source_id,
            article_title: document.title.clone(),
            article_content: document.body.clone(),
            article_url: document.url.clone(),
            published_date: document.published_at,
            match_score: evaluation.score.clamp(0.0, 1.0),
            ai_reasoning: evaluation.reasoning.clone(),
            raw_signal_text: raw_signal_text(evaluation),
            session_id: Some(pir.session_id.clone()),
            status: SIGNAL_STATUS.to_string(),
        };

        match self.sink.write_signal(signal).await {
            Ok(id) => {
                debug!(
                    signal = id.as_str(),
                    pir = pir.id.as_str(),
                    score = evaluation.score,
                    "Signal created"
                );
                self.stats.record_signal();
                true
            }
            Err(e) => {
                warn!(pir = pir.id.as_str(), error = %e, "Signal write failed");
                self.stats.record_persistence_error();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farwatch_common::EvaluationDecision;

    fn evaluation() -> Evaluation {
        Evaluation {
            score: 0.74,
            decision: EvaluationDecision::Include,
            reasoning: "Directly addresses pump efficiency benchmarks".to_string(),
            connections: vec!["efficiency standards".to_string()],
            decision_support_value: "high".to_string(),
            intelligence_type: "technology".to_string(),
            urgency_match: "strategic".to_string(),
        }
    }

    #[test]
    fn raw_text_is_json_without_reasoning() {
        let raw = raw_signal_text(&evaluation());
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("raw text is JSON");
        assert!(parsed.get("reasoning").is_none());
        assert_eq!(parsed["decision_support_value"], "high");
        assert_eq!(parsed["strategic_connections"][0], "efficiency standards");
    }

    #[test]
    fn source_url_prefers_the_feed() {
        let doc = Document {
            title: "t".into(),
            body: "b".into(),
            url: "https://pub.example.com/story/1".into(),
            source: "Example Trade Weekly".into(),
            published_at: None,
            backend: BackendKind::Feed,
            backend_meta: serde_json::json!({"feed_url": "https://pub.example.com/rss"}),
        };
        assert_eq!(source_row_url(&doc), "https://pub.example.com/rss");
    }

    #[test]
    fn source_url_falls_back_to_host() {
        let doc = Document {
            title: "t".into(),
            body: "b".into(),
            url: "https://www.pub.example.com/story/1".into(),
            source: "Example Wire".into(),
            published_at: None,
            backend: BackendKind::Search,
            backend_meta: serde_json::Value::Null,
        };
        assert_eq!(source_row_url(&doc), "https://pub.example.com");
    }
}
