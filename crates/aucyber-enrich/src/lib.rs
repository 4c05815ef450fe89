//! # aucyber-enrich
//!
//! The high-quality enrichment pipeline. One raw event goes through five
//! stages in strict order; different events run in parallel under the
//! orchestrator's worker bound.
//!
//! 1. [`content`]: fetch and clean full article text (cascading extractors)
//! 2. [`extract`]: one constrained LLM call populating the incident record
//! 3. [`factcheck`]: search-grounded verification of the extracted facts
//! 4. [`validate`]: rule-based sensibility checks and specificity overrides
//! 5. [`confidence`]: weighted aggregation, penalties, and the decision
//!
//! [`pipeline`] wires the stages together, persists accepted events, and
//! writes exactly one audit row per run. [`records`] holds the
//! records-affected rule shared by stages 2 and 4.

pub mod confidence;
pub mod content;
pub mod error;
pub mod extract;
pub mod factcheck;
pub mod pipeline;
pub mod records;
pub mod validate;

pub use confidence::{aggregate_confidence, AppliedPenalty, Decision, FinalDecision, StageConfidences};
pub use content::{AcquiredContent, BrowserFetch, ContentAcquisition, DisabledBrowser, ExtractionMethod};
pub use error::EnrichError;
pub use extract::{Extraction, ExtractionMetadata, PrimaryExtractor};
pub use factcheck::{CheckResult, CheckType, FactCheckResult, FactChecker};
pub use pipeline::{EnrichmentPipeline, PipelineOutcome};
pub use records::validate_records_affected;
pub use validate::{SpecificityOverride, ValidationResult, Validator};
