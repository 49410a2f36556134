use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Campaign inputs ---

/// Human-authored strategic framing for a campaign. Read once, immutable
/// for the rest of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicContext {
    pub objective: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub decisions: Vec<String>,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Priority Intelligence Requirement: one thing to monitor, in prose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pir {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub session_id: String,
}

impl Pir {
    /// PIRs shorter than this are skipped with a warning.
    pub const MIN_TEXT_LEN: usize = 10;

    pub fn is_actionable(&self) -> bool {
        self.text.trim().len() >= Self::MIN_TEXT_LEN
    }
}

// --- Strategy tiers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Crisis,
    Strategic,
    LongTerm,
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrgencyLevel::Crisis => write!(f, "crisis"),
            UrgencyLevel::Strategic => write!(f, "strategic"),
            UrgencyLevel::LongTerm => write!(f, "long_term"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CollectionIntensity {
    Light,
    Standard,
    Intensive,
    Comprehensive,
}

impl std::fmt::Display for CollectionIntensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionIntensity::Light => write!(f, "light"),
            CollectionIntensity::Standard => write!(f, "standard"),
            CollectionIntensity::Intensive => write!(f, "intensive"),
            CollectionIntensity::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectivityTier {
    VerySelective,
    Selective,
    Balanced,
    Inclusive,
}

impl std::fmt::Display for SelectivityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectivityTier::VerySelective => write!(f, "very_selective"),
            SelectivityTier::Selective => write!(f, "selective"),
            SelectivityTier::Balanced => write!(f, "balanced"),
            SelectivityTier::Inclusive => write!(f, "inclusive"),
        }
    }
}

/// The planner's structured interpretation of context + PIRs. Every field
/// is required; a response missing any of them fails planning.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Strategy {
    #[serde(rename = "strategic_approach")]
    pub approach: String,
    #[serde(rename = "intelligence_domains")]
    pub domains: Vec<String>,
    #[serde(rename = "urgency_level")]
    pub urgency: UrgencyLevel,
    #[serde(rename = "cross_pir_analysis")]
    pub cross_pir_analysis: String,
    #[serde(rename = "collection_intensity")]
    pub intensity: CollectionIntensity,
    #[serde(rename = "relevance_threshold")]
    pub selectivity: SelectivityTier,
    #[serde(rename = "source_priorities")]
    pub source_priorities: Vec<String>,
    #[serde(rename = "confidence_score")]
    pub confidence: f64,
    pub reasoning: String,
}

/// Numeric collection parameters derived from a Strategy and the PIR count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionParams {
    pub max_docs_per_pir: usize,
    pub threshold: f64,
    pub timeout_seconds: u64,
    pub eval_batch_size: usize,
    pub max_signals_per_pir: usize,
}

// --- Sources ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Feed,
    Trade,
    Government,
    Other,
}

impl SourceKind {
    /// Map the discovery model's free-form source_type labels onto the
    /// four kinds we track.
    pub fn from_label(label: &str) -> Self {
        match label {
            "rss" | "feed" => Self::Feed,
            "trade_publication" | "professional_journal" | "industry_association" => Self::Trade,
            "regulatory" | "government" => Self::Government,
            _ => Self::Other,
        }
    }
}

/// An LLM-recommended source, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceCandidate {
    #[serde(default)]
    pub domain: String,
    pub name: String,
    #[serde(default, rename = "rss_url")]
    pub feed_url: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

impl SourceCandidate {
    pub fn kind(&self) -> SourceKind {
        self.source_type
            .as_deref()
            .map(SourceKind::from_label)
            .unwrap_or(SourceKind::Other)
    }
}

/// A probed-and-confirmed feed. Only these flow into collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedSource {
    pub url: String,
    pub title: String,
    pub host: String,
    pub discovery_method: String,
    pub confidence: f64,
}

// --- Documents ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Search,
    Feed,
    Filing,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Search => write!(f, "search"),
            BackendKind::Feed => write!(f, "feed"),
            BackendKind::Filing => write!(f, "filing"),
        }
    }
}

/// Normalized candidate document from any backend. Ephemeral: documents are
/// never persisted, only the signals derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub body: String,
    pub url: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub backend: BackendKind,
    #[serde(default)]
    pub backend_meta: serde_json::Value,
}

// --- Evaluation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationDecision {
    Include,
    Exclude,
    Uncertain,
}

/// What the evaluation model returns for one (document, PIR) pair.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    #[serde(rename = "relevance_score")]
    pub score: f64,
    #[serde(rename = "recommendation")]
    pub decision: EvaluationDecision,
    pub reasoning: String,
    #[serde(default, rename = "strategic_connections")]
    pub connections: Vec<String>,
    #[serde(default = "default_support_value")]
    pub decision_support_value: String,
    #[serde(default = "default_intelligence_type")]
    pub intelligence_type: String,
    #[serde(default = "default_urgency_match")]
    pub urgency_match: String,
}

fn default_support_value() -> String {
    "medium".to_string()
}

fn default_intelligence_type() -> String {
    "general".to_string()
}

fn default_urgency_match() -> String {
    "strategic".to_string()
}

impl Evaluation {
    /// Whether a signal should be written for this evaluation under the
    /// given threshold: an explicit include always wins, otherwise the
    /// score must clear the threshold without an explicit exclude.
    pub fn should_create_signal(&self, threshold: f64) -> bool {
        self.decision == EvaluationDecision::Include
            || (self.score > threshold && self.decision != EvaluationDecision::Exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_pir_is_not_actionable() {
        let pir = Pir {
            id: "p1".into(),
            text: "too short".into(),
            priority: None,
            session_id: "s".into(),
        };
        // 9 chars, below the minimum
        assert!(!pir.is_actionable());
    }

    #[test]
    fn strategy_requires_every_field() {
        let err = serde_json::from_str::<Strategy>(
            r#"{"strategic_approach": "x", "intelligence_domains": []}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn inclusion_rule() {
        let mut eval = Evaluation {
            score: 0.2,
            decision: EvaluationDecision::Include,
            reasoning: "r".into(),
            connections: vec![],
            decision_support_value: "medium".into(),
            intelligence_type: "general".into(),
            urgency_match: "strategic".into(),
        };
        // include overrides a sub-threshold score
        assert!(eval.should_create_signal(0.5));

        eval.decision = EvaluationDecision::Uncertain;
        assert!(!eval.should_create_signal(0.5));
        eval.score = 0.6;
        assert!(eval.should_create_signal(0.5));

        eval.decision = EvaluationDecision::Exclude;
        assert!(!eval.should_create_signal(0.5));
    }

    #[test]
    fn source_kind_labels() {
        assert_eq!(SourceKind::from_label("trade_publication"), SourceKind::Trade);
        assert_eq!(SourceKind::from_label("regulatory"), SourceKind::Government);
        assert_eq!(SourceKind::from_label("rss"), SourceKind::Feed);
        assert_eq!(SourceKind::from_label("blog"), SourceKind::Other);
    }
}
