use thiserror::Error;

/// Campaign-level error kinds. Only `Config` and `Planning` abort a run;
/// every other kind is logged, counted, and recovered locally.
#[derive(Error, Debug)]
pub enum FarwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Fetch error ({backend}): {message}")]
    Fetch { backend: String, message: String },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Campaign deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl FarwatchError {
    pub fn fetch(backend: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Fetch {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error aborts the campaign.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Planning(_))
    }
}
