//! Collector error types.

use aucyber_llm::LlmError;

/// Errors from source collectors. Auth and config failures disable a
/// source for the run; the rest are per-item and logged.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Whether the whole source should be disabled for this run rather
    /// than retried.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, SourceError::Config(_) | SourceError::Auth(_))
    }
}
