//! # aucyber-persist
//!
//! SQLite persistence for the three-tier event model. A single
//! [`EventStore`] owns the connection pool; per-tier operations live in
//! their own modules as additional `impl` blocks:
//!
//! - [`raw_store`]: discovery records and the duplicate gate
//! - [`enriched_store`]: pipeline output, entity links, backfill updates
//! - [`dedup_store`]: canonical events, mapping rows, sources, clusters
//! - [`audit_store`]: per-run enrichment audit trail
//! - [`ledger`]: month-processing ledger for idempotent backfills
//!
//! The database is the system of record; there is no in-memory event cache.
//! Writes are serialized through the pool (single connection is enough at
//! the expected < 10 events/s) and WAL mode keeps readers concurrent.

pub mod audit_store;
pub mod dedup_store;
pub mod enriched_store;
pub mod error;
pub mod ledger;
pub mod raw_store;
pub mod store;

pub use audit_store::AuditRecord;
pub use dedup_store::{CanonicalExportRow, CanonicalWrite, MappingRow};
pub use enriched_store::NewEnrichedEvent;
pub use error::StorageError;
pub use store::{EventStore, SqliteConfig};
