use std::env;

use tracing::info;

use crate::error::FarwatchError;

/// Application configuration loaded once from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Persistence
    pub database_url: String,

    // LLM endpoint
    pub llm_api_key: String,
    pub llm_model: String,

    /// Search backend key. Absent key disables only the search backend.
    pub news_api_key: Option<String>,

    /// Contact address sent to the regulatory filing host (it requires an
    /// identifying User-Agent). Read from `SEC_CONTACT_EMAIL`.
    pub filing_contact: String,

    /// Scope campaigns to this session when set.
    pub session_id: Option<String>,

    /// Delete signals older than this many days before each run. 0 = keep.
    pub signal_retention_days: u32,
}

impl Config {
    /// Load configuration from environment variables. A missing LLM key or
    /// database URL is a startup failure; a missing search key only
    /// disables that backend.
    pub fn from_env() -> Result<Self, FarwatchError> {
        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            llm_api_key: required_env("OPENAI_API_KEY")?,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            news_api_key: env::var("NEWS_API_KEY").ok().filter(|k| !k.is_empty()),
            filing_contact: env::var("SEC_CONTACT_EMAIL")
                .unwrap_or_else(|_| "ops@farwatch.invalid".to_string()),
            session_id: env::var("SESSION_ID").ok().filter(|s| !s.is_empty()),
            signal_retention_days: env::var("SIGNAL_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    /// Log the configuration without credential values.
    pub fn log_redacted(&self) {
        info!(
            model = %self.llm_model,
            search_backend = self.news_api_key.is_some(),
            session = self.session_id.as_deref().unwrap_or("latest"),
            retention_days = self.signal_retention_days,
            "Config loaded"
        );
    }
}

fn required_env(name: &str) -> Result<String, FarwatchError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| FarwatchError::Config(format!("{name} must be set")))
}
