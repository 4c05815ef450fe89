//! # aucyber-core
//!
//! Canonical data model for the Australian cyber incident corpus.
//!
//! The persistence model has three tiers, each tracing back to the one
//! above it:
//!
//! | Tier | Type | Produced by |
//! |------|------|-------------|
//! | Raw | [`RawEvent`] | source collectors |
//! | Enriched | [`EnrichedEvent`] | the enrichment pipeline |
//! | Deduplicated | [`DeduplicatedEvent`] | the deduplication engine |
//!
//! Everything here is plain data: no I/O, no provider bindings. The
//! collectors, pipeline, and engine live in their own crates and exchange
//! these types.

pub mod config;
pub mod events;

pub use config::{CollectionConfig, DataSourceConfig, DateRange, EnvConfig};
pub use events::{
    ContributionType, CyberEventType, DeduplicatedEvent, EnrichedEvent, EnrichedWithRaw,
    EntityKind, EntityRecord, EventSeverity, EventSource, EventStatus, RawEvent, RawEventDraft,
    SourceType,
};
