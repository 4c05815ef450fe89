//! # aucyber-runtime
//!
//! Phase orchestration. The [`Orchestrator`] drives `discover`, `scrape`,
//! `enrich`, `dedupe`, and the month-by-month `backfill`, bounding
//! concurrency per phase and surfacing progress counters. The repair jobs
//! live in [`repair`]; the search-grounded verification backfill in
//! [`backfill`].

pub mod backfill;
pub mod orchestrator;
pub mod repair;

pub use backfill::{backfill_verifications, BackfillReport};
pub use orchestrator::{Orchestrator, OrchestratorError, PhaseStats};
pub use repair::{fix_records, RepairReport};
