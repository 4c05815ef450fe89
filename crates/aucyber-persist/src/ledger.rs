//! Month-processing ledger for idempotent backfills.

use chrono::Utc;
use sqlx::Row;

use crate::error::StorageError;
use crate::store::EventStore;

impl EventStore {
    /// Whether a month has already been marked complete.
    pub async fn is_month_processed(&self, year: i32, month: u32) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT is_processed FROM MonthProcessed WHERE year = ? AND month = ?",
        )
        .bind(year)
        .bind(month as i64)
        .fetch_optional(self.pool())
        .await?;

        Ok(match row {
            Some(row) => row.try_get("is_processed")?,
            None => false,
        })
    }

    /// Mark a month complete with its run stats. Re-running a forced month
    /// overwrites the stats in place, so repeated runs stay idempotent.
    pub async fn mark_month_processed(
        &self,
        year: i32,
        month: u32,
        stats: &serde_json::Value,
    ) -> Result<(), StorageError> {
        let stats_json = serde_json::to_string(stats)?;
        sqlx::query(
            "INSERT INTO MonthProcessed (year, month, is_processed, stats, processed_at)
             VALUES (?, ?, TRUE, ?, ?)
             ON CONFLICT(year, month) DO UPDATE SET
                is_processed = TRUE, stats = excluded.stats, processed_at = excluded.processed_at",
        )
        .bind(year)
        .bind(month as i64)
        .bind(stats_json)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Stats recorded for a month, if it was processed.
    pub async fn month_stats(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let row = sqlx::query("SELECT stats FROM MonthProcessed WHERE year = ? AND month = ?")
            .bind(year)
            .bind(month as i64)
            .fetch_optional(self.pool())
            .await?;

        Ok(row
            .and_then(|row| row.try_get::<Option<String>, _>("stats").ok().flatten())
            .and_then(|s| serde_json::from_str(&s).ok()))
    }
}
