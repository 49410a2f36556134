// Trait abstractions for the LLM and persistence seams.
//
// The campaign orchestrator only sees these traits; production wires them to
// the chat-completion client and the Postgres store, tests wire them to
// in-memory stand-ins. No network, no database, `cargo test` in seconds.

use async_trait::async_trait;
use anyhow::Result;

use farwatch_common::{
    Document, Evaluation, FarwatchError, Pir, SourceCandidate, StrategicContext, Strategy,
};
use farwatch_store::{NewSignal, SignalStore};

// ---------------------------------------------------------------------------
// StrategyPlanner — the one fatal LLM call
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StrategyPlanner: Send + Sync {
    /// Turn context + PIRs into a Strategy. Any missing field, bad JSON, or
    /// timeout is a PlanningError and fails the campaign.
    async fn plan(
        &self,
        context: &StrategicContext,
        pirs: &[Pir],
    ) -> Result<Strategy, FarwatchError>;
}

// ---------------------------------------------------------------------------
// SourceRecommender — feeds candidates into discovery
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SourceRecommender: Send + Sync {
    /// Recommend 8-12 sources for the strategy. Failure is soft.
    async fn recommend(
        &self,
        context: &StrategicContext,
        strategy: &Strategy,
    ) -> Result<Vec<SourceCandidate>>;
}

// ---------------------------------------------------------------------------
// QueryGenerator — per-PIR search queries
// ---------------------------------------------------------------------------

#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// 3-5 search queries for one PIR. Callers fall back to the truncated
    /// PIR text when this fails.
    async fn queries(&self, pir: &Pir, strategy: &Strategy) -> Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// DocumentEvaluator — one call per (document, PIR) pair
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DocumentEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        document: &Document,
        pir: &Pir,
        strategy: &Strategy,
        threshold: f64,
    ) -> Result<Evaluation>;
}

// ---------------------------------------------------------------------------
// CrossPirAnalyst — post-collection connection summary
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CrossPirAnalyst: Send + Sync {
    /// Summarize strategic connections across the campaign's signals.
    /// Failure is soft; the summary field just stays empty.
    async fn analyze(
        &self,
        signal_titles: &[String],
        pirs: &[Pir],
        strategy: &Strategy,
    ) -> Result<String>;
}

// ---------------------------------------------------------------------------
// SignalSink — persistence seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Resolve a source row id by (name, url), creating it when absent.
    async fn resolve_source(&self, name: &str, url: &str, source_type: &str) -> Result<String>;

    /// Persist one signal row; returns its id.
    async fn write_signal(&self, signal: NewSignal) -> Result<String>;
}

#[async_trait]
impl SignalSink for SignalStore {
    async fn resolve_source(&self, name: &str, url: &str, source_type: &str) -> Result<String> {
        Ok(self.create_or_get_source(name, url, source_type).await?)
    }

    async fn write_signal(&self, signal: NewSignal) -> Result<String> {
        Ok(self.create_signal(signal).await?)
    }
}
