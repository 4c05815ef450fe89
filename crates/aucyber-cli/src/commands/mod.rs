pub mod backfill;
pub mod dedupe;
pub mod discover;
pub mod enrich;
pub mod export;
pub mod fix_records;
pub mod scrape;
pub mod verify;
