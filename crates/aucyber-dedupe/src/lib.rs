//! # aucyber-dedupe
//!
//! Entity-anchored deduplication. Input is every Active enriched event
//! joined with its owning raw event; output is one canonical record per
//! distinct real-world incident, with full traceability.
//!
//! The pairwise judgment is layered:
//!
//! 1. [`entity`]: hard gate on the primary entity (title regexes, suffix
//!    normalisation, acronyms, alias table)
//! 2. [`similarity`]: weighted content score with date, type, and
//!    strong-indicator factors
//! 3. [`arbiter`]: search-grounded or LLM judgment for borderline pairs
//! 4. [`engine`]: group formation sweep and the merge rules
//!
//! [`text`] holds the sequence-similarity primitive everything above
//! shares.

pub mod arbiter;
pub mod engine;
pub mod entity;
pub mod similarity;
pub mod text;

pub use arbiter::{ArbiterVerdict, DuplicateArbiter, LlmArbiter, SearchArbiter};
pub use engine::{DedupeEngine, DedupeStats};
pub use entity::{entity_similarity, extract_entity_from_title};
pub use similarity::{content_similarity, ScoreBreakdown};
pub use text::sequence_ratio;
