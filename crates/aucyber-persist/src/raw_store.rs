//! Raw event tier: discovery records and the duplicate gate.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use uuid::Uuid;

use aucyber_core::{RawEvent, RawEventDraft, SourceType};

use crate::error::StorageError;
use crate::store::EventStore;

fn parse_uuid(s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|e| StorageError::Serialization(format!("bad uuid {s}: {e}")))
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn row_to_raw_event(row: &sqlx::sqlite::SqliteRow) -> Result<RawEvent, StorageError> {
    let id: String = row.try_get("raw_event_id")?;
    let source_type: String = row.try_get("source_type")?;
    let metadata: Option<String> = row.try_get("source_metadata")?;
    let discovered_at: String = row.try_get("discovered_at")?;
    let attempted: Option<String> = row.try_get("processing_attempted_at")?;
    let event_date: Option<String> = row.try_get("event_date")?;

    Ok(RawEvent {
        raw_event_id: parse_uuid(&id)?,
        source_type: SourceType::parse(&source_type)
            .ok_or_else(|| StorageError::Serialization(format!("bad source_type {source_type}")))?,
        source_event_id: row.try_get("source_event_id")?,
        title: row.try_get("raw_title")?,
        description: row
            .try_get::<Option<String>, _>("raw_description")?
            .unwrap_or_default(),
        content: row.try_get("raw_content")?,
        event_date: event_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        source_url: row.try_get("source_url")?,
        source_metadata: metadata
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or(serde_json::Value::Null),
        discovered_at: parse_timestamp(&discovered_at),
        is_processed: row.try_get("is_processed")?,
        processing_attempted_at: attempted.map(|t| parse_timestamp(&t)),
        processing_error: row.try_get("processing_error")?,
    })
}

impl EventStore {
    /// Insert a discovery record unless its `(source_type, source_url,
    /// title)` key already exists. Returns the new id, or `None` when the
    /// duplicate gate skipped the draft.
    pub async fn add_raw_event(
        &self,
        draft: &RawEventDraft,
    ) -> Result<Option<Uuid>, StorageError> {
        if self
            .find_existing_raw_event(
                draft.source_type,
                draft.source_url.as_deref(),
                &draft.title,
            )
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let raw_event_id = Uuid::new_v4();
        let metadata = serde_json::to_string(&draft.metadata)?;
        let result = sqlx::query(
            "INSERT INTO RawEvents (
                raw_event_id, source_type, source_event_id, raw_title,
                raw_description, raw_content, event_date, source_url,
                source_metadata, discovered_at, is_processed
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE)",
        )
        .bind(raw_event_id.to_string())
        .bind(draft.source_type.as_str())
        .bind(&draft.source_event_id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.content)
        .bind(draft.event_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&draft.source_url)
        .bind(metadata)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(Some(raw_event_id)),
            // A concurrent insert can still hit the unique index; the gate
            // treats that as an ordinary skip.
            Err(e) => match StorageError::from(e) {
                StorageError::Constraint(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    /// Look up a raw event by its duplicate-suppression key.
    pub async fn find_existing_raw_event(
        &self,
        source_type: SourceType,
        source_url: Option<&str>,
        title: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let row = sqlx::query(
            "SELECT raw_event_id FROM RawEvents
             WHERE source_type = ? AND IFNULL(source_url, '') = ? AND raw_title = ?",
        )
        .bind(source_type.as_str())
        .bind(source_url.unwrap_or(""))
        .bind(title)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => {
                let id: String = row.try_get("raw_event_id")?;
                Ok(Some(parse_uuid(&id)?))
            }
            None => Ok(None),
        }
    }

    /// Raw events that have not yet been enriched, oldest first.
    pub async fn unprocessed_raw_events(&self, limit: i64) -> Result<Vec<RawEvent>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM RawEvents
             WHERE is_processed = FALSE
             ORDER BY discovered_at ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_raw_event).collect()
    }

    pub async fn get_raw_event(&self, raw_event_id: Uuid) -> Result<RawEvent, StorageError> {
        let row = sqlx::query("SELECT * FROM RawEvents WHERE raw_event_id = ?")
            .bind(raw_event_id.to_string())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("raw event {raw_event_id}")))?;
        row_to_raw_event(&row)
    }

    /// Mark a raw event processed; a populated `error` records a permanent
    /// failure, `None` a success.
    pub async fn mark_raw_processed(
        &self,
        raw_event_id: Uuid,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE RawEvents
             SET is_processed = TRUE, processing_attempted_at = ?, processing_error = ?
             WHERE raw_event_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(error)
        .bind(raw_event_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Record an attempt without consuming the event, leaving it eligible
    /// for retry (transient failures, e.g. a database write that rolled
    /// back).
    pub async fn mark_raw_attempted(&self, raw_event_id: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE RawEvents SET processing_attempted_at = ? WHERE raw_event_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(raw_event_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Attach late-fetched full content to a raw event.
    pub async fn set_raw_content(
        &self,
        raw_event_id: Uuid,
        content: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE RawEvents SET raw_content = ? WHERE raw_event_id = ?")
            .bind(content)
            .bind(raw_event_id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Append a processing-log row for one stage of one raw event.
    pub async fn log_processing(
        &self,
        raw_event_id: Uuid,
        stage: &str,
        status: &str,
        result_data: Option<&serde_json::Value>,
        error_message: Option<&str>,
        duration_ms: i64,
    ) -> Result<(), StorageError> {
        let result_json = match result_data {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };
        sqlx::query(
            "INSERT INTO ProcessingLog (
                log_id, raw_event_id, processing_stage, status,
                result_data, error_message, duration_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(raw_event_id.to_string())
        .bind(stage)
        .bind(status)
        .bind(result_json)
        .bind(error_message)
        .bind(duration_ms)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Count of raw events per processed flag, for phase stats.
    pub async fn raw_event_counts(&self) -> Result<(i64, i64), StorageError> {
        let row = sqlx::query(
            "SELECT
                SUM(CASE WHEN is_processed THEN 1 ELSE 0 END) AS processed,
                SUM(CASE WHEN is_processed THEN 0 ELSE 1 END) AS pending
             FROM RawEvents",
        )
        .fetch_one(self.pool())
        .await?;
        let processed: Option<i64> = row.try_get("processed")?;
        let pending: Option<i64> = row.try_get("pending")?;
        Ok((processed.unwrap_or(0), pending.unwrap_or(0)))
    }
}
