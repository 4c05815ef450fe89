//! The collector contract.

use async_trait::async_trait;

use aucyber_core::{DateRange, RawEventDraft, SourceType};

use crate::error::SourceError;

/// Static descriptor for a source, surfaced in logs and the CLI.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub update_frequency: &'static str,
    pub coverage: &'static str,
}

/// A source adapter. Implementations declare their [`SourceType`] and
/// rate-limit key and normalise whatever they find to
/// [`RawEventDraft`] records; the store applies the duplicate gate at
/// insert time.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn source_type(&self) -> SourceType;

    /// Key into the shared [`aucyber_llm::ServiceRateLimiter`].
    fn rate_limit_key(&self) -> &'static str;

    /// Cheap startup check: credentials present, endpoints plausible. A
    /// failed check disables the source for the run; the run continues.
    fn validate_config(&self) -> bool;

    async fn collect(&self, range: &DateRange) -> Result<Vec<RawEventDraft>, SourceError>;

    fn source_info(&self) -> SourceInfo;
}
