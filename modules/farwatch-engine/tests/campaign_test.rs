//! End-to-end campaign runs against in-memory seams: no network, no
//! database. Covers the fallback query path, partial evaluation failure,
//! signal field separation, per-PIR dedup, PIR filtering, and cancellation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use farwatch_common::{
    BackendKind, CollectionIntensity, Document, Evaluation, EvaluationDecision, FarwatchError,
    Pir, SelectivityTier, SourceCandidate, StrategicContext, Strategy, UrgencyLevel,
    ValidatedSource,
};
use farwatch_store::NewSignal;

use farwatch_engine::backends::FetchBackends;
use farwatch_engine::campaign::{Campaign, CampaignDeps, DEFAULT_WINDOW_DAYS};
use farwatch_engine::discovery::SourceDiscovery;
use farwatch_engine::traits::{
    CrossPirAnalyst, DocumentEvaluator, QueryGenerator, SignalSink, SourceRecommender,
    StrategyPlanner,
};
use farwatch_engine::validator::SourceValidator;

// ---------------------------------------------------------------------------
// Stand-ins
// ---------------------------------------------------------------------------

fn test_strategy() -> Strategy {
    Strategy {
        approach: "competitive tech".to_string(),
        domains: vec!["hydraulics".to_string()],
        urgency: UrgencyLevel::Strategic,
        cross_pir_analysis: "pump efficiency links the requirements".to_string(),
        intensity: CollectionIntensity::Standard,
        selectivity: SelectivityTier::Balanced,
        source_priorities: vec!["trade".to_string()],
        confidence: 0.8,
        reasoning: "tech watch".to_string(),
    }
}

struct FixedPlanner;

#[async_trait]
impl StrategyPlanner for FixedPlanner {
    async fn plan(&self, _: &StrategicContext, _: &[Pir]) -> Result<Strategy, FarwatchError> {
        Ok(test_strategy())
    }
}

struct NoSources;

#[async_trait]
impl SourceRecommender for NoSources {
    async fn recommend(
        &self,
        _: &StrategicContext,
        _: &Strategy,
    ) -> anyhow::Result<Vec<SourceCandidate>> {
        Ok(Vec::new())
    }
}

struct SilentAnalyst;

#[async_trait]
impl CrossPirAnalyst for SilentAnalyst {
    async fn analyze(&self, _: &[String], _: &[Pir], _: &Strategy) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// Query generator that either returns fixed queries or always fails.
struct StubQueries {
    fail: bool,
}

#[async_trait]
impl QueryGenerator for StubQueries {
    async fn queries(&self, _: &Pir, _: &Strategy) -> anyhow::Result<Vec<String>> {
        if self.fail {
            anyhow::bail!("query generation timed out");
        }
        Ok(vec!["pump efficiency benchmark".to_string()])
    }
}

/// Search-only backend serving a canned document list; records the queries
/// it was asked to run.
struct CannedSearch {
    documents: Vec<Document>,
    queries_seen: Mutex<Vec<String>>,
}

impl CannedSearch {
    fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            queries_seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FetchBackends for CannedSearch {
    async fn search(
        &self,
        query: &str,
        _window_days: i64,
        max_results: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        self.queries_seen.lock().unwrap().push(query.to_string());
        Ok(self.documents.iter().take(max_results).cloned().collect())
    }

    async fn poll_feed(
        &self,
        _source: &ValidatedSource,
        _window_days: i64,
        _max_results: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        Ok(Vec::new())
    }

    async fn filings(
        &self,
        _company: &str,
        _window_days: i64,
        _max_results: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Document>, FarwatchError> {
        Ok(Vec::new())
    }

    fn search_enabled(&self) -> bool {
        true
    }
}

/// Judge that includes everything, fails every second document, or sleeps
/// until cancelled.
enum JudgeMode {
    IncludeAll,
    FailEveryOther,
    Hang,
}

struct StubJudge {
    mode: JudgeMode,
    calls: Mutex<u32>,
}

impl StubJudge {
    fn new(mode: JudgeMode) -> Self {
        Self {
            mode,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl DocumentEvaluator for StubJudge {
    async fn evaluate(
        &self,
        document: &Document,
        _pir: &Pir,
        _strategy: &Strategy,
        _threshold: f64,
    ) -> anyhow::Result<Evaluation> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        match self.mode {
            JudgeMode::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(300)).await;
                anyhow::bail!("never reached")
            }
            JudgeMode::FailEveryOther if call % 2 == 0 => {
                anyhow::bail!("HTTP 500 from evaluation endpoint")
            }
            _ => Ok(Evaluation {
                score: 0.9,
                decision: EvaluationDecision::Include,
                reasoning: format!("relevant to the requirement: {}", document.title),
                connections: vec!["pump market".to_string()],
                decision_support_value: "high".to_string(),
                intelligence_type: "technology".to_string(),
                urgency_match: "strategic".to_string(),
            }),
        }
    }
}

/// In-memory sink capturing written signals.
#[derive(Default)]
struct MemorySink {
    signals: Mutex<Vec<NewSignal>>,
}

#[async_trait]
impl SignalSink for MemorySink {
    async fn resolve_source(&self, name: &str, _url: &str, _kind: &str) -> anyhow::Result<String> {
        Ok(format!("source-{name}"))
    }

    async fn write_signal(&self, signal: NewSignal) -> anyhow::Result<String> {
        let mut signals = self.signals.lock().unwrap();
        signals.push(signal);
        Ok(format!("signal-{}", signals.len()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn context() -> StrategicContext {
    StrategicContext {
        objective: "watch hydraulic pump tech".to_string(),
        background: "OEM supplier evaluation".to_string(),
        decisions: vec!["renew supplier contract".to_string()],
        session_id: "session-1".to_string(),
    }
}

fn pir(id: &str, text: &str) -> Pir {
    Pir {
        id: id.to_string(),
        text: text.to_string(),
        priority: None,
        session_id: "session-1".to_string(),
    }
}

fn doc(url: &str, title: &str) -> Document {
    Document {
        title: title.to_string(),
        body: "Pump efficiency improved by four percent in the latest benchmark.".to_string(),
        url: url.to_string(),
        source: "Trade Weekly".to_string(),
        published_at: None,
        backend: BackendKind::Search,
        backend_meta: serde_json::Value::Null,
    }
}

fn deps(
    backends: Arc<CannedSearch>,
    judge: Arc<StubJudge>,
    sink: Arc<MemorySink>,
    fail_queries: bool,
) -> CampaignDeps {
    CampaignDeps {
        planner: Arc::new(FixedPlanner),
        recommender: Arc::new(NoSources),
        query_gen: Arc::new(StubQueries { fail: fail_queries }),
        judge,
        analyst: Arc::new(SilentAnalyst),
        sink,
        backends,
        discovery: SourceDiscovery::new(SourceValidator::new(reqwest::Client::new())),
        window_days: DEFAULT_WINDOW_DAYS,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fallback_query_is_the_truncated_pir_text() {
    let long_text = "Monitor pump efficiency ratings ".repeat(10);
    let backends = Arc::new(CannedSearch::new(vec![doc("https://t.example/1", "a")]));
    let judge = Arc::new(StubJudge::new(JudgeMode::IncludeAll));
    let sink = Arc::new(MemorySink::default());

    let campaign = Campaign::new(deps(backends.clone(), judge, sink, true));
    campaign
        .run(&context(), &[pir("p1", &long_text)])
        .await
        .unwrap();

    let queries = backends.queries_seen.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].len(), 100);
    assert!(long_text.starts_with(&queries[0]));
}

#[tokio::test]
async fn half_failed_evaluations_still_produce_the_other_half() {
    let documents: Vec<Document> = (0..30)
        .map(|i| doc(&format!("https://t.example/{i}"), &format!("story {i}")))
        .collect();
    let backends = Arc::new(CannedSearch::new(documents));
    let judge = Arc::new(StubJudge::new(JudgeMode::FailEveryOther));
    let sink = Arc::new(MemorySink::default());

    let campaign = Campaign::new(deps(backends, judge, sink.clone(), false));
    let summary = campaign
        .run(&context(), &[pir("p1", "Monitor pump efficiency ratings")])
        .await
        .unwrap();

    assert_eq!(summary.signals_created, 15);
    assert_eq!(summary.evaluation_errors, 15);
    assert_eq!(sink.signals.lock().unwrap().len(), 15);
    assert!(!summary.partial);
}

#[tokio::test]
async fn signal_fields_stay_separate() {
    let backends = Arc::new(CannedSearch::new(vec![doc(
        "https://t.example/story",
        "Benchmark results",
    )]));
    let judge = Arc::new(StubJudge::new(JudgeMode::IncludeAll));
    let sink = Arc::new(MemorySink::default());

    let campaign = Campaign::new(deps(backends, judge, sink.clone(), false));
    campaign
        .run(&context(), &[pir("p1", "Monitor pump efficiency ratings")])
        .await
        .unwrap();

    let signals = sink.signals.lock().unwrap();
    assert_eq!(signals.len(), 1);
    let signal = &signals[0];

    assert_eq!(signal.article_title, "Benchmark results");
    assert!(!signal.article_content.is_empty());
    assert!(signal.ai_reasoning.contains("Benchmark results"));
    assert!((signal.match_score - 0.9).abs() < 1e-9);
    assert_eq!(signal.status, "ai_evaluated");
    assert_eq!(signal.session_id.as_deref(), Some("session-1"));

    // The metadata blob is JSON and does not duplicate the reasoning.
    let raw: serde_json::Value = serde_json::from_str(&signal.raw_signal_text).unwrap();
    assert!(raw.get("reasoning").is_none());
    assert_eq!(raw["intelligence_type"], "technology");
}

#[tokio::test]
async fn one_signal_per_pir_and_url() {
    // The same URL twice from search; a second PIR sees it independently.
    let backends = Arc::new(CannedSearch::new(vec![
        doc("https://t.example/same", "first copy"),
        doc("https://t.example/same", "second copy"),
    ]));
    let judge = Arc::new(StubJudge::new(JudgeMode::IncludeAll));
    let sink = Arc::new(MemorySink::default());

    let campaign = Campaign::new(deps(backends, judge, sink.clone(), false));
    let summary = campaign
        .run(
            &context(),
            &[
                pir("p1", "Monitor pump efficiency ratings"),
                pir("p2", "Track hydraulic component pricing"),
            ],
        )
        .await
        .unwrap();

    let signals = sink.signals.lock().unwrap();
    for p in ["p1", "p2"] {
        let per_pair = signals
            .iter()
            .filter(|s| s.indicator_id == p && s.article_url == "https://t.example/same")
            .count();
        assert_eq!(per_pair, 1, "one signal per (pir, url) for {p}");
    }
    assert_eq!(summary.signals_created, 2);
}

#[tokio::test]
async fn short_pirs_are_skipped_with_a_warning() {
    let backends = Arc::new(CannedSearch::new(vec![doc("https://t.example/1", "a")]));
    let judge = Arc::new(StubJudge::new(JudgeMode::IncludeAll));
    let sink = Arc::new(MemorySink::default());

    let campaign = Campaign::new(deps(backends, judge, sink, false));
    let summary = campaign
        .run(
            &context(),
            &[pir("short", "too short"), pir("p1", "Monitor pump efficiency ratings")],
        )
        .await
        .unwrap();

    assert_eq!(summary.pirs_skipped, 1);
    assert_eq!(summary.per_pir.len(), 1);
    assert_eq!(summary.per_pir[0].pir_id, "p1");
}

#[tokio::test]
async fn no_actionable_pirs_fails_the_campaign() {
    let backends = Arc::new(CannedSearch::new(vec![]));
    let judge = Arc::new(StubJudge::new(JudgeMode::IncludeAll));
    let sink = Arc::new(MemorySink::default());

    let campaign = Campaign::new(deps(backends, judge, sink, false));
    let result = campaign.run(&context(), &[pir("short", "nope")]).await;

    assert!(matches!(result, Err(FarwatchError::Planning(_))));
}

#[tokio::test]
async fn empty_context_fails_the_campaign() {
    let backends = Arc::new(CannedSearch::new(vec![]));
    let judge = Arc::new(StubJudge::new(JudgeMode::IncludeAll));
    let sink = Arc::new(MemorySink::default());

    let campaign = Campaign::new(deps(backends, judge, sink, false));
    let empty = StrategicContext {
        objective: "  ".to_string(),
        background: String::new(),
        decisions: vec![],
        session_id: "session-1".to_string(),
    };
    let result = campaign
        .run(&empty, &[pir("p1", "Monitor pump efficiency ratings")])
        .await;

    assert!(matches!(result, Err(FarwatchError::Planning(_))));
}

#[tokio::test]
async fn cancellation_cuts_the_run_short() {
    let backends = Arc::new(CannedSearch::new(vec![doc("https://t.example/1", "a")]));
    let judge = Arc::new(StubJudge::new(JudgeMode::Hang));
    let sink = Arc::new(MemorySink::default());

    let campaign = Campaign::new(deps(backends, judge, sink.clone(), false));
    let cancel = campaign.cancellation_token();

    let run = tokio::spawn(async move {
        campaign
            .run(&context(), &[pir("p1", "Monitor pump efficiency ratings")])
            .await
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();

    // The hung evaluation must abort promptly once the handle fires.
    let summary = tokio::time::timeout(std::time::Duration::from_secs(1), run)
        .await
        .expect("run aborted within a second")
        .unwrap()
        .unwrap();

    assert!(summary.partial);
    assert!(sink.signals.lock().unwrap().is_empty());
}
