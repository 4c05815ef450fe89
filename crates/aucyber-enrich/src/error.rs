//! Enrichment error types.

use aucyber_llm::LlmError;
use aucyber_persist::StorageError;

/// Errors from the enrichment pipeline. Stage-specific failures mostly do
/// not surface here: content failure short-circuits to a REJECT decision,
/// extraction failure becomes a sentinel, fact-check failure becomes an
/// unverified check. These variants cover the genuinely exceptional paths.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("PDF extraction error: {0}")]
    Pdf(String),

    #[error("Browser rendering unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
