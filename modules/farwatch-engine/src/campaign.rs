//! Campaign orchestration: one end-to-end run of planning, discovery,
//! collection, evaluation, and summary. Hard errors (no context, no usable
//! PIRs, planning failure) abort the run; everything else is reported and
//! recovered locally.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use farwatch_common::{
    CollectionParams, Document, FarwatchError, Pir, StrategicContext, Strategy, ValidatedSource,
};

use crate::backends::{filing::extract_companies, FetchBackends};
use crate::collector::PirCollector;
use crate::discovery::SourceDiscovery;
use crate::evaluator::SignalPipeline;
use crate::stats::CampaignStats;
use crate::traits::{
    CrossPirAnalyst, DocumentEvaluator, QueryGenerator, SignalSink, SourceRecommender,
    StrategyPlanner,
};

/// Collection window in days, matching the historical-collection default.
pub const DEFAULT_WINDOW_DAYS: i64 = 90;

/// How many document titles per PIR feed the cross-PIR analysis.
const ANALYSIS_TITLE_SAMPLE: usize = 10;

/// Linear campaign lifecycle. Failures jump straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignState {
    Init,
    ContextLoaded,
    PlanReady,
    SourcesReady,
    Collecting,
    Evaluating,
    Summarized,
    Done,
    Failed,
}

/// Everything the orchestrator needs, injected. Tests swap the trait
/// objects for in-memory stand-ins.
pub struct CampaignDeps {
    pub planner: Arc<dyn StrategyPlanner>,
    pub recommender: Arc<dyn SourceRecommender>,
    pub query_gen: Arc<dyn QueryGenerator>,
    pub judge: Arc<dyn DocumentEvaluator>,
    pub analyst: Arc<dyn CrossPirAnalyst>,
    pub sink: Arc<dyn SignalSink>,
    pub backends: Arc<dyn FetchBackends>,
    pub discovery: SourceDiscovery,
    pub window_days: i64,
}

/// Outcome for one PIR.
#[derive(Debug, Clone)]
pub struct PirOutcome {
    pub pir_id: String,
    pub documents: u32,
    pub signals: u32,
}

/// What a campaign run produced, partial or not.
#[derive(Debug)]
pub struct CampaignSummary {
    pub run_id: Uuid,
    pub strategy: Strategy,
    pub params: CollectionParams,
    pub sources_validated: usize,
    pub failed_source_names: Vec<String>,
    pub per_pir: Vec<PirOutcome>,
    pub pirs_skipped: u32,
    pub cross_pir_analysis: Option<String>,
    /// True when the deadline or an external cancel cut the run short.
    pub partial: bool,
    pub documents_collected: u32,
    pub evaluations_issued: u32,
    pub signals_created: u32,
    pub discovery_errors: u32,
    pub fetch_errors: u32,
    pub evaluation_errors: u32,
    pub persistence_errors: u32,
}

pub struct Campaign {
    deps: CampaignDeps,
    stats: Arc<CampaignStats>,
    cancel: CancellationToken,
}

impl Campaign {
    pub fn new(deps: CampaignDeps) -> Self {
        Self::with_token(deps, CancellationToken::new())
    }

    /// Build a campaign whose outstanding work aborts when `cancel` fires.
    pub fn with_token(deps: CampaignDeps, cancel: CancellationToken) -> Self {
        Self {
            deps,
            stats: Arc::new(CampaignStats::default()),
            cancel,
        }
    }

    /// The handle that aborts every outstanding request when cancelled.
    /// Wire it to SIGINT/SIGTERM in the entrypoint.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one campaign over the given context and PIRs.
    pub async fn run(
        &self,
        context: &StrategicContext,
        pirs: &[Pir],
    ) -> Result<CampaignSummary, FarwatchError> {
        let run_id = Uuid::new_v4();
        let mut state = CampaignState::Init;

        if context.objective.trim().is_empty() {
            return Err(FarwatchError::Planning(
                "no strategic context to plan from".to_string(),
            ));
        }
        advance(&mut state, CampaignState::ContextLoaded);

        // Drop PIRs too short to mean anything.
        let mut pirs_skipped = 0u32;
        let active: Vec<Pir> = pirs
            .iter()
            .filter(|pir| {
                if pir.is_actionable() {
                    true
                } else {
                    warn!(pir = pir.id.as_str(), "Skipping PIR with text under 10 chars");
                    pirs_skipped += 1;
                    false
                }
            })
            .cloned()
            .collect();

        if active.is_empty() {
            return Err(FarwatchError::Planning("no actionable PIRs".to_string()));
        }

        info!(run = %run_id, pirs = active.len(), "Campaign starting");

        // Plan. The one stage allowed to kill the campaign.
        let strategy = self.deps.planner.plan(context, &active).await?;
        let params = crate::planner::derive_params(&strategy, active.len());
        advance(&mut state, CampaignState::PlanReady);

        info!(
            max_docs = params.max_docs_per_pir,
            threshold = params.threshold,
            timeout_s = params.timeout_seconds,
            "Collection parameters derived"
        );

        // Discover sources. Empty is a soft downgrade, not a failure.
        let (sources, failed_source_names) = self.discover_sources(context, &strategy).await;
        if sources.is_empty() {
            warn!("No sources validated; continuing with search and filing backends");
        }
        advance(&mut state, CampaignState::SourcesReady);

        let companies = issuer_seeds(context, &active);

        // Collect and evaluate, bounded by the campaign deadline.
        advance(&mut state, CampaignState::Collecting);
        let (outcomes, titles, partial) = self
            .collect_and_evaluate(&active, &strategy, &params, &sources, &companies)
            .await;
        advance(&mut state, CampaignState::Evaluating);

        // Cross-PIR connections, soft.
        let cross_pir_analysis = if titles.is_empty() || partial {
            None
        } else {
            match self.deps.analyst.analyze(&titles, &active, &strategy).await {
                Ok(analysis) if !analysis.is_empty() => Some(analysis),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "Cross-PIR analysis failed");
                    None
                }
            }
        };
        advance(&mut state, CampaignState::Summarized);

        let summary = CampaignSummary {
            run_id,
            strategy,
            params,
            sources_validated: sources.len(),
            failed_source_names,
            per_pir: outcomes,
            pirs_skipped,
            cross_pir_analysis,
            partial,
            documents_collected: self.stats.documents(),
            evaluations_issued: self.stats.evaluations(),
            signals_created: self.stats.signals(),
            discovery_errors: self
                .stats
                .discovery_errors
                .load(std::sync::atomic::Ordering::Relaxed),
            fetch_errors: self
                .stats
                .fetch_errors
                .load(std::sync::atomic::Ordering::Relaxed),
            evaluation_errors: self
                .stats
                .evaluation_errors
                .load(std::sync::atomic::Ordering::Relaxed),
            persistence_errors: self
                .stats
                .persistence_errors
                .load(std::sync::atomic::Ordering::Relaxed),
        };

        advance(
            &mut state,
            if partial { CampaignState::Failed } else { CampaignState::Done },
        );

        info!(
            run = %run_id,
            signals = summary.signals_created,
            partial = summary.partial,
            "Campaign finished"
        );
        info!("{}", self.stats);

        Ok(summary)
    }

    async fn discover_sources(
        &self,
        context: &StrategicContext,
        strategy: &Strategy,
    ) -> (Vec<ValidatedSource>, Vec<String>) {
        let candidates = match self.deps.recommender.recommend(context, strategy).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Source recommendation failed");
                self.stats.record_discovery_error();
                return (Vec::new(), Vec::new());
            }
        };

        if candidates.is_empty() {
            self.stats.record_discovery_error();
            return (Vec::new(), Vec::new());
        }

        let outcome = self
            .deps
            .discovery
            .discover(&candidates, &self.cancel)
            .await;

        if outcome.validated.is_empty() {
            self.stats.record_discovery_error();
        }

        (outcome.validated, outcome.failed_names)
    }

    /// Fan out over PIRs, each task collecting then evaluating, under one
    /// deadline. Completed outcomes survive a deadline cut; in-flight work
    /// is aborted through the cancellation handle.
    async fn collect_and_evaluate(
        &self,
        pirs: &[Pir],
        strategy: &Strategy,
        params: &CollectionParams,
        sources: &[ValidatedSource],
        companies: &[String],
    ) -> (Vec<PirOutcome>, Vec<String>, bool) {
        let collector = PirCollector::new(
            self.deps.backends.clone(),
            self.deps.query_gen.clone(),
            self.stats.clone(),
            self.deps.window_days,
        );
        let pipeline = SignalPipeline::new(
            self.deps.judge.clone(),
            self.deps.sink.clone(),
            self.stats.clone(),
        );

        let completed: Arc<Mutex<Vec<(PirOutcome, Vec<String>)>>> =
            Arc::new(Mutex::new(Vec::new()));

        let work = join_all(pirs.iter().map(|pir| {
            let collector = &collector;
            let pipeline = &pipeline;
            let completed = completed.clone();
            let cancel = self.cancel.clone();
            async move {
                let documents: Vec<Document> = collector
                    .collect(pir, strategy, params, sources, companies, &cancel)
                    .await;

                let titles: Vec<String> = documents
                    .iter()
                    .take(ANALYSIS_TITLE_SAMPLE)
                    .map(|d| d.title.clone())
                    .collect();

                let signals = pipeline
                    .evaluate_pir(&documents, pir, strategy, params, &cancel)
                    .await;

                let outcome = PirOutcome {
                    pir_id: pir.id.clone(),
                    documents: documents.len() as u32,
                    signals,
                };
                completed
                    .lock()
                    .expect("outcome lock poisoned")
                    .push((outcome, titles));
            }
        }));

        let deadline = Duration::from_secs(params.timeout_seconds);
        let partial = tokio::select! {
            _ = work => false,
            _ = tokio::time::sleep(deadline) => {
                warn!(seconds = params.timeout_seconds, "Campaign deadline exceeded, cancelling");
                self.cancel.cancel();
                true
            }
            _ = self.cancel.cancelled() => {
                warn!("Campaign cancelled");
                true
            }
        };

        let mut outcomes = Vec::new();
        let mut titles = Vec::new();
        for (outcome, pir_titles) in completed
            .lock()
            .expect("outcome lock poisoned")
            .drain(..)
        {
            outcomes.push(outcome);
            titles.extend(pir_titles);
        }
        (outcomes, titles, partial)
    }
}

fn advance(state: &mut CampaignState, next: CampaignState) {
    tracing::debug!(from = ?state, to = ?next, "Campaign state");
    *state = next;
}

/// Issuer names and tickers worth watching, pulled from the context and the
/// PIR texts.
fn issuer_seeds(context: &StrategicContext, pirs: &[Pir]) -> Vec<String> {
    let mut text = format!("{} {}", context.objective, context.background);
    for pir in pirs {
        text.push(' ');
        text.push_str(&pir.text);
    }
    extract_companies(&text)
}

impl std::fmt::Display for CampaignSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Campaign {}{}", self.run_id, if self.partial { " (partial)" } else { "" })?;
        writeln!(
            f,
            "  sources: {} validated, {} failed",
            self.sources_validated,
            self.failed_source_names.len()
        )?;
        for outcome in &self.per_pir {
            writeln!(
                f,
                "  PIR {}: {} documents -> {} signals",
                outcome.pir_id, outcome.documents, outcome.signals
            )?;
        }
        if self.pirs_skipped > 0 {
            writeln!(f, "  PIRs skipped: {}", self.pirs_skipped)?;
        }
        writeln!(
            f,
            "  totals: {} documents, {} evaluations, {} signals",
            self.documents_collected, self.evaluations_issued, self.signals_created
        )?;
        writeln!(
            f,
            "  errors: discovery={} fetch={} evaluation={} persistence={}",
            self.discovery_errors, self.fetch_errors, self.evaluation_errors, self.persistence_errors
        )?;
        if let Some(analysis) = &self.cross_pir_analysis {
            writeln!(f, "  cross-PIR: {analysis}")?;
        }
        Ok(())
    }
}
