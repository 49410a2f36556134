//! Strategic planning: one LLM call interprets context + PIRs as a Strategy,
//! one pure derivation turns the Strategy's tiers into numeric parameters.

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use ai_client::LlmClient;
use farwatch_common::{
    CollectionIntensity, CollectionParams, FarwatchError, Pir, SelectivityTier, SourceCandidate,
    StrategicContext, Strategy, UrgencyLevel,
};

use crate::discovery::flatten_candidates;
use crate::traits::{CrossPirAnalyst, SourceRecommender, StrategyPlanner};

const PLANNER_TIMEOUT: Duration = Duration::from_secs(60);
const RECOMMEND_TIMEOUT: Duration = Duration::from_secs(45);
const CROSS_PIR_TIMEOUT: Duration = Duration::from_secs(30);

const PLANNER_SYSTEM: &str =
    "You are an expert strategic intelligence analyst. You respond only with JSON.";

/// Derive numeric collection parameters from a strategy and the PIR count.
/// Pure and deterministic: identical inputs give bit-identical outputs.
pub fn derive_params(strategy: &Strategy, pir_count: usize) -> CollectionParams {
    let base_docs: usize = match strategy.intensity {
        CollectionIntensity::Light => 200,
        CollectionIntensity::Standard => 500,
        CollectionIntensity::Intensive => 1000,
        CollectionIntensity::Comprehensive => 2000,
    };

    // Scale down for many PIRs to bound total volume.
    let max_docs_per_pir = if pir_count > 5 {
        let scale = (1.0 - 0.1 * (pir_count - 5) as f64).max(0.5);
        (base_docs as f64 * scale).round() as usize
    } else {
        base_docs
    };

    let mut threshold: f64 = match strategy.selectivity {
        SelectivityTier::VerySelective => 0.7,
        SelectivityTier::Selective => 0.5,
        SelectivityTier::Balanced => 0.3,
        SelectivityTier::Inclusive => 0.15,
    };
    match strategy.urgency {
        UrgencyLevel::Crisis => threshold *= 0.7,
        UrgencyLevel::LongTerm => threshold *= 1.2,
        UrgencyLevel::Strategic => {}
    }
    let threshold = threshold.clamp(0.10, 0.80);

    let base_timeout: f64 = match strategy.urgency {
        UrgencyLevel::Crisis => 180.0,
        UrgencyLevel::Strategic => 300.0,
        UrgencyLevel::LongTerm => 450.0,
    };
    let timeout_seconds = match strategy.intensity {
        CollectionIntensity::Comprehensive => (base_timeout * 1.5).round() as u64,
        CollectionIntensity::Light => (base_timeout * 0.7).round() as u64,
        _ => base_timeout as u64,
    };

    let eval_batch_size = match strategy.intensity {
        CollectionIntensity::Light => 20,
        CollectionIntensity::Standard => 30,
        CollectionIntensity::Intensive => 50,
        CollectionIntensity::Comprehensive => 100,
    };

    let max_signals_per_pir = match strategy.intensity {
        CollectionIntensity::Light => 15,
        CollectionIntensity::Standard => 25,
        CollectionIntensity::Intensive => 50,
        CollectionIntensity::Comprehensive => 100,
    };

    CollectionParams {
        max_docs_per_pir,
        threshold,
        timeout_seconds,
        eval_batch_size,
        max_signals_per_pir,
    }
}

/// What the source-recommendation call returns.
#[derive(Debug, Deserialize, JsonSchema)]
struct RecommendationResponse {
    #[serde(default, deserialize_with = "deserialize_candidates")]
    recommended_sources: Vec<SourceCandidate>,
}

/// Handle recommendation lists that arrive nested one level deep.
fn deserialize_candidates<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<SourceCandidate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(flatten_candidates(raw))
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CrossPirResponse {
    #[serde(default)]
    analysis: String,
}

/// Production planner over the chat-completion client.
pub struct LlmPlanner {
    client: LlmClient,
}

impl LlmPlanner {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StrategyPlanner for LlmPlanner {
    async fn plan(
        &self,
        context: &StrategicContext,
        pirs: &[Pir],
    ) -> Result<Strategy, FarwatchError> {
        let prompt = build_strategy_prompt(context, pirs);

        let strategy: Strategy = self
            .client
            .extract(PLANNER_SYSTEM, &prompt, PLANNER_TIMEOUT)
            .await
            .map_err(|e| FarwatchError::Planning(e.to_string()))?;

        info!(
            approach = strategy.approach.as_str(),
            urgency = %strategy.urgency,
            intensity = %strategy.intensity,
            selectivity = %strategy.selectivity,
            confidence = strategy.confidence,
            "Strategy ready"
        );

        Ok(strategy)
    }
}

#[async_trait]
impl SourceRecommender for LlmPlanner {
    async fn recommend(
        &self,
        context: &StrategicContext,
        strategy: &Strategy,
    ) -> anyhow::Result<Vec<SourceCandidate>> {
        let prompt = build_recommendation_prompt(context, strategy);

        let response: RecommendationResponse = self
            .client
            .extract(PLANNER_SYSTEM, &prompt, RECOMMEND_TIMEOUT)
            .await?;

        let candidates = response.recommended_sources;
        info!(candidates = candidates.len(), "Sources recommended");
        Ok(candidates)
    }
}

#[async_trait]
impl CrossPirAnalyst for LlmPlanner {
    async fn analyze(
        &self,
        signal_titles: &[String],
        pirs: &[Pir],
        strategy: &Strategy,
    ) -> anyhow::Result<String> {
        // Sample for prompt size; the connections matter, not the tail.
        let titles: Vec<&str> = signal_titles.iter().take(50).map(String::as_str).collect();
        let pir_lines: Vec<String> = pirs.iter().map(|p| format!("- {}", p.text)).collect();

        let prompt = format!(
            "Identify strategic intelligence connections across these collected signals.\n\n\
             STRATEGIC APPROACH: {}\n\n\
             PRIORITY INTELLIGENCE REQUIREMENTS:\n{}\n\n\
             SIGNAL HEADLINES:\n{}\n\n\
             Respond in JSON format:\n\
             {{\"analysis\": \"How the signals connect across requirements and what that implies\"}}",
            strategy.approach,
            pir_lines.join("\n"),
            titles.join("\n"),
        );

        let response: CrossPirResponse = self
            .client
            .extract(PLANNER_SYSTEM, &prompt, CROSS_PIR_TIMEOUT)
            .await?;

        Ok(response.analysis)
    }
}

fn build_strategy_prompt(context: &StrategicContext, pirs: &[Pir]) -> String {
    let decision_lines: Vec<String> =
        context.decisions.iter().map(|d| format!("- {d}")).collect();
    let pir_lines: Vec<String> = pirs.iter().map(|p| format!("- {}", p.text)).collect();

    format!(
        "Analyze this complete strategic context and generate a unified intelligence \
         collection strategy.\n\n\
         STRATEGIC OBJECTIVE:\n{}\n\n\
         STRATEGIC CONTEXT:\n{}\n\n\
         CRITICAL DECISIONS TO INFORM:\n{}\n\n\
         PRIORITY INTELLIGENCE REQUIREMENTS:\n{}\n\n\
         Determine:\n\
         1. STRATEGIC APPROACH: the core intelligence challenge (competitive intelligence, \
         market analysis, regulatory monitoring, technology assessment, crisis management, ...)\n\
         2. INTELLIGENCE DOMAINS: the specific domains/industries/sectors to monitor, \
         discovered from the context itself\n\
         3. URGENCY LEVEL: crisis (immediate decisions), strategic (weeks), long_term (months)\n\
         4. CROSS-PIR CONNECTIONS: how the requirements relate and what serves several at once\n\
         5. COLLECTION INTENSITY: light | standard | intensive | comprehensive\n\
         6. RELEVANCE THRESHOLD: very_selective | selective | balanced | inclusive\n\
         7. SOURCE PRIORITIES: the most valuable source types for this strategy\n\n\
         Respond in JSON format:\n\
         {{\n\
           \"strategic_approach\": \"Brief description of the core intelligence challenge\",\n\
           \"intelligence_domains\": [\"domain1\", \"domain2\"],\n\
           \"urgency_level\": \"crisis|strategic|long_term\",\n\
           \"cross_pir_analysis\": \"How the requirements connect and support each other\",\n\
           \"collection_intensity\": \"light|standard|intensive|comprehensive\",\n\
           \"relevance_threshold\": \"very_selective|selective|balanced|inclusive\",\n\
           \"source_priorities\": [\"priority1\", \"priority2\"],\n\
           \"confidence_score\": 0.0,\n\
           \"reasoning\": \"Brief explanation of the strategic analysis\"\n\
         }}\n\n\
         Focus on what intelligence is actually needed to answer the decisions and \
         requirements. Every field is required.",
        context.objective,
        context.background,
        decision_lines.join("\n"),
        pir_lines.join("\n"),
    )
}

fn build_recommendation_prompt(context: &StrategicContext, strategy: &Strategy) -> String {
    format!(
        "Identify the authoritative publications professionals in this domain actually \
         read, and their feed URLs where known.\n\n\
         STRATEGIC OBJECTIVE: {}\n\n\
         STRATEGIC CONTEXT: {}\n\n\
         STRATEGY: {}\n\
         INTELLIGENCE DOMAINS: {}\n\n\
         Find 8-12 sources. Prioritize specialized trade publications, professional \
         journals, industry associations, and the relevant regulatory bodies. Avoid \
         generic business outlets unless the objective is itself about general business.\n\n\
         Respond in JSON format:\n\
         {{\n\
           \"recommended_sources\": [\n\
             {{\n\
               \"domain\": \"example.com\",\n\
               \"name\": \"Publication Name\",\n\
               \"rss_url\": \"https://example.com/rss.xml\",\n\
               \"source_type\": \"trade_publication|professional_journal|regulatory|industry_association\",\n\
               \"confidence\": 0.0\n\
             }}\n\
           ]\n\
         }}",
        context.objective,
        context.background,
        strategy.approach,
        strategy.domains.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(
        urgency: UrgencyLevel,
        intensity: CollectionIntensity,
        selectivity: SelectivityTier,
    ) -> Strategy {
        Strategy {
            approach: "competitive tech".to_string(),
            domains: vec!["hydraulics".to_string()],
            urgency,
            cross_pir_analysis: String::new(),
            intensity,
            selectivity,
            source_priorities: vec!["trade".to_string()],
            confidence: 0.8,
            reasoning: String::new(),
        }
    }

    #[test]
    fn standard_balanced_strategic_baseline() {
        let params = derive_params(
            &strategy(
                UrgencyLevel::Strategic,
                CollectionIntensity::Standard,
                SelectivityTier::Balanced,
            ),
            1,
        );
        assert_eq!(params.max_docs_per_pir, 500);
        assert!((params.threshold - 0.30).abs() < 1e-9);
        assert_eq!(params.timeout_seconds, 300);
        assert_eq!(params.eval_batch_size, 30);
        assert_eq!(params.max_signals_per_pir, 25);
    }

    #[test]
    fn crisis_lowers_threshold_and_timeout() {
        let params = derive_params(
            &strategy(
                UrgencyLevel::Crisis,
                CollectionIntensity::Standard,
                SelectivityTier::Balanced,
            ),
            1,
        );
        assert!((params.threshold - 0.21).abs() < 1e-9);
        assert_eq!(params.timeout_seconds, 180);
    }

    #[test]
    fn many_pirs_scale_volume_down() {
        let params = derive_params(
            &strategy(
                UrgencyLevel::Strategic,
                CollectionIntensity::Standard,
                SelectivityTier::Balanced,
            ),
            7,
        );
        // 500 * max(0.5, 1 - 0.2) = 400
        assert_eq!(params.max_docs_per_pir, 400);
    }

    #[test]
    fn scaling_floors_at_half() {
        let params = derive_params(
            &strategy(
                UrgencyLevel::Strategic,
                CollectionIntensity::Intensive,
                SelectivityTier::Balanced,
            ),
            20,
        );
        assert_eq!(params.max_docs_per_pir, 500);
    }

    #[test]
    fn threshold_is_clamped() {
        // inclusive * crisis = 0.105, above the floor
        let low = derive_params(
            &strategy(
                UrgencyLevel::Crisis,
                CollectionIntensity::Light,
                SelectivityTier::Inclusive,
            ),
            1,
        );
        assert!(low.threshold >= 0.10);

        // very_selective * long_term = 0.84, clamped to the ceiling
        let high = derive_params(
            &strategy(
                UrgencyLevel::LongTerm,
                CollectionIntensity::Light,
                SelectivityTier::VerySelective,
            ),
            1,
        );
        assert!((high.threshold - 0.80).abs() < 1e-9);
    }

    #[test]
    fn comprehensive_extends_timeout() {
        let params = derive_params(
            &strategy(
                UrgencyLevel::LongTerm,
                CollectionIntensity::Comprehensive,
                SelectivityTier::Balanced,
            ),
            1,
        );
        assert_eq!(params.timeout_seconds, 675);
        assert_eq!(params.eval_batch_size, 100);
        assert_eq!(params.max_signals_per_pir, 100);
    }

    #[test]
    fn light_shortens_timeout() {
        let params = derive_params(
            &strategy(
                UrgencyLevel::Strategic,
                CollectionIntensity::Light,
                SelectivityTier::Balanced,
            ),
            1,
        );
        assert_eq!(params.timeout_seconds, 210);
    }

    #[test]
    fn derivation_is_deterministic() {
        let s = strategy(
            UrgencyLevel::Crisis,
            CollectionIntensity::Intensive,
            SelectivityTier::Selective,
        );
        assert_eq!(derive_params(&s, 3), derive_params(&s, 3));
    }
}
