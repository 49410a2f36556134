use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::LlmClient;
use farwatch_common::Config;
use farwatch_store::SignalStore;

use farwatch_engine::backends::{Backends, FeedBackend, FilingBackend, SearchBackend};
use farwatch_engine::campaign::{Campaign, CampaignDeps, DEFAULT_WINDOW_DAYS};
use farwatch_engine::discovery::SourceDiscovery;
use farwatch_engine::evaluator::LlmEvaluator;
use farwatch_engine::planner::LlmPlanner;
use farwatch_engine::queries::LlmQueryGenerator;
use farwatch_engine::validator::SourceValidator;

#[derive(Parser, Debug)]
#[command(name = "farwatch", about = "Strategic intelligence collection engine")]
struct Args {
    /// Run offline sanity checks and exit.
    #[arg(long)]
    self_test: bool,

    /// Minutes between campaign runs.
    #[arg(long, default_value_t = 60)]
    interval_minutes: u64,

    /// Run a single campaign and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("farwatch_engine=info".parse()?))
        .init();

    let args = Args::parse();

    if args.self_test {
        self_test();
        return Ok(());
    }

    info!("Farwatch engine starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let store = SignalStore::connect(&config.database_url).await?;
    store.migrate().await?;

    if config.signal_retention_days > 0 {
        if let Err(e) = store
            .delete_signals_older_than(config.signal_retention_days)
            .await
        {
            warn!(error = %e, "Retention sweep failed, continuing");
        }
    }

    // One shutdown handle; every outstanding request aborts through it.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            warn!("Shutdown signal received, cancelling in-flight work");
            shutdown.cancel();
        });
    }

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match run_once(&config, &store, shutdown.child_token()).await {
            Ok(()) => {}
            Err(e) => error!(error = %e, "Campaign failed"),
        }

        if args.once || shutdown.is_cancelled() {
            break;
        }

        info!(minutes = args.interval_minutes, "Sleeping until next campaign");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(args.interval_minutes * 60)) => {}
        }
    }

    info!("Farwatch engine stopped");
    Ok(())
}

async fn run_once(config: &Config, store: &SignalStore, cancel: CancellationToken) -> Result<()> {
    let session = config.session_id.as_deref();

    let Some(context) = store.strategic_context(session).await? else {
        anyhow::bail!("no strategic context found");
    };

    let pirs: Vec<_> = store
        .active_indicators(session)
        .await?
        .into_iter()
        .map(|row| row.into_pir())
        .collect();

    // One pool shared by every backend, the validator, and the LLM client.
    let http = reqwest::Client::builder()
        .user_agent(format!("farwatch/0.1 ({})", config.filing_contact))
        .build()?;

    let llm = LlmClient::new(&config.llm_api_key, &config.llm_model, http.clone());
    let planner = Arc::new(LlmPlanner::new(llm.clone()));

    let deps = CampaignDeps {
        planner: planner.clone(),
        recommender: planner.clone(),
        analyst: planner,
        query_gen: Arc::new(LlmQueryGenerator::new(llm.clone())),
        judge: Arc::new(LlmEvaluator::new(llm)),
        sink: Arc::new(store.clone()),
        backends: Arc::new(Backends {
            search: config
                .news_api_key
                .as_deref()
                .map(|key| SearchBackend::new(http.clone(), key)),
            feed: FeedBackend::new(http.clone()),
            filing: FilingBackend::new(http.clone(), &config.filing_contact),
        }),
        discovery: SourceDiscovery::new(SourceValidator::new(http)),
        window_days: DEFAULT_WINDOW_DAYS,
    };

    let campaign = Campaign::with_token(deps, cancel);
    let summary = campaign.run(&context, &pirs).await?;
    info!("{summary}");

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Offline sanity checks for the pure pieces: parameter derivation and feed
/// classification. No network, no database.
fn self_test() {
    use farwatch_common::{
        CollectionIntensity, SelectivityTier, Strategy, UrgencyLevel,
    };
    use farwatch_engine::planner::derive_params;
    use farwatch_engine::validator::{classify_prefix, FeedProbe};

    let strategy = Strategy {
        approach: "self test".to_string(),
        domains: vec!["testing".to_string()],
        urgency: UrgencyLevel::Strategic,
        cross_pir_analysis: String::new(),
        intensity: CollectionIntensity::Standard,
        selectivity: SelectivityTier::Balanced,
        source_priorities: vec![],
        confidence: 1.0,
        reasoning: String::new(),
    };

    let params = derive_params(&strategy, 1);
    assert_eq!(params.max_docs_per_pir, 500);
    assert_eq!(params.timeout_seconds, 300);
    println!("derive_params: ok ({params:?})");

    assert!(matches!(
        classify_prefix(b"<rss version=\"2.0\">"),
        FeedProbe::Feed { .. }
    ));
    assert_eq!(classify_prefix(b"<html>"), FeedProbe::NotAFeed);
    println!("classify_prefix: ok");

    println!("self-test passed");
}
