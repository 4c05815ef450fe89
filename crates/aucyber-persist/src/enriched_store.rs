//! Enriched event tier: pipeline output, entity links, backfill updates.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use uuid::Uuid;

use aucyber_core::{
    CyberEventType, EnrichedWithRaw, EntityKind, EventSeverity, EventStatus, SourceType,
};

use crate::error::StorageError;
use crate::store::EventStore;

/// Insert payload for a freshly enriched event.
#[derive(Debug, Clone)]
pub struct NewEnrichedEvent {
    pub raw_event_id: Uuid,
    pub title: String,
    pub description: String,
    pub summary: Option<String>,
    pub event_type: CyberEventType,
    pub severity: EventSeverity,
    pub event_date: Option<NaiveDate>,
    pub records_affected: Option<i64>,
    pub victim_organization_name: Option<String>,
    pub victim_organization_industry: Option<String>,
    pub attacking_entity_name: Option<String>,
    pub attack_method: Option<String>,
    pub is_australian_event: bool,
    pub is_specific_event: bool,
    pub confidence_score: f64,
    pub australian_relevance_score: f64,
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl EventStore {
    /// Persist an enriched event. Standard inserts require the event to be
    /// both Australian and specific; `manual_override` bypasses the flag
    /// guard for operator-curated records.
    pub async fn insert_enriched(
        &self,
        event: &NewEnrichedEvent,
        manual_override: bool,
    ) -> Result<Uuid, StorageError> {
        if !manual_override && !(event.is_australian_event && event.is_specific_event) {
            return Err(StorageError::Constraint(
                "enriched insert requires is_australian_event and is_specific_event".to_string(),
            ));
        }

        let enriched_event_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO EnrichedEvents (
                enriched_event_id, raw_event_id, title, description, summary,
                event_type, severity, event_date, records_affected,
                victim_organization_name, victim_organization_industry,
                attacking_entity_name, attack_method,
                is_australian_event, is_specific_event,
                confidence_score, australian_relevance_score,
                status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'Active', ?, ?)",
        )
        .bind(enriched_event_id.to_string())
        .bind(event.raw_event_id.to_string())
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.summary)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(event.event_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(event.records_affected)
        .bind(&event.victim_organization_name)
        .bind(&event.victim_organization_industry)
        .bind(&event.attacking_entity_name)
        .bind(&event.attack_method)
        .bind(event.is_australian_event)
        .bind(event.is_specific_event)
        .bind(event.confidence_score)
        .bind(event.australian_relevance_score)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?;

        Ok(enriched_event_id)
    }

    /// Active enriched events with the same victim and date (the
    /// validator's duplicate check).
    pub async fn find_active_by_victim_and_date(
        &self,
        victim: &str,
        event_date: NaiveDate,
    ) -> Result<Vec<(Uuid, String)>, StorageError> {
        let rows = sqlx::query(
            "SELECT enriched_event_id, title FROM EnrichedEvents
             WHERE victim_organization_name = ? AND event_date = ? AND status = 'Active'
             LIMIT 5",
        )
        .bind(victim)
        .bind(event_date.format("%Y-%m-%d").to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("enriched_event_id")?;
                let title: String = row.try_get("title")?;
                let id = Uuid::parse_str(&id)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok((id, title))
            })
            .collect()
    }

    /// All Active enriched events joined with their owning raw event,
    /// ordered by creation time so deduplication grouping is deterministic.
    pub async fn active_enriched_with_raw(&self) -> Result<Vec<EnrichedWithRaw>, StorageError> {
        let rows = sqlx::query(
            "SELECT
                ee.enriched_event_id, ee.raw_event_id, ee.title, ee.description,
                ee.summary, ee.event_type, ee.severity, ee.event_date,
                ee.records_affected, ee.victim_organization_name,
                ee.victim_organization_industry, ee.attacking_entity_name,
                ee.attack_method, ee.is_australian_event, ee.is_specific_event,
                ee.confidence_score, ee.australian_relevance_score, ee.created_at,
                re.source_url, re.source_type, re.discovered_at
             FROM EnrichedEvents ee
             JOIN RawEvents re ON ee.raw_event_id = re.raw_event_id
             WHERE ee.status = 'Active'
             ORDER BY ee.created_at ASC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let enriched_id: String = row.try_get("enriched_event_id")?;
                let raw_id: String = row.try_get("raw_event_id")?;
                let event_type: Option<String> = row.try_get("event_type")?;
                let severity: Option<String> = row.try_get("severity")?;
                let event_date: Option<String> = row.try_get("event_date")?;
                let source_type: String = row.try_get("source_type")?;
                let created_at: String = row.try_get("created_at")?;
                let discovered_at: String = row.try_get("discovered_at")?;

                Ok(EnrichedWithRaw {
                    enriched_event_id: Uuid::parse_str(&enriched_id)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    raw_event_id: Uuid::parse_str(&raw_id)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    title: row.try_get("title")?,
                    description: row
                        .try_get::<Option<String>, _>("description")?
                        .unwrap_or_default(),
                    summary: row.try_get("summary")?,
                    event_type: CyberEventType::parse(event_type.as_deref().unwrap_or("Other")),
                    severity: EventSeverity::parse(severity.as_deref().unwrap_or("Unknown")),
                    event_date: event_date
                        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                    records_affected: row.try_get("records_affected")?,
                    victim_organization_name: row.try_get("victim_organization_name")?,
                    victim_organization_industry: row.try_get("victim_organization_industry")?,
                    attacking_entity_name: row.try_get("attacking_entity_name")?,
                    attack_method: row.try_get("attack_method")?,
                    is_australian_event: row.try_get("is_australian_event")?,
                    is_specific_event: row.try_get("is_specific_event")?,
                    confidence_score: row
                        .try_get::<Option<f64>, _>("confidence_score")?
                        .unwrap_or(0.0),
                    australian_relevance_score: row
                        .try_get::<Option<f64>, _>("australian_relevance_score")?
                        .unwrap_or(0.0),
                    created_at: parse_timestamp(&created_at),
                    source_url: row.try_get("source_url")?,
                    source_type: SourceType::parse(&source_type)
                        .unwrap_or(SourceType::ResearchQuery),
                    discovered_at: parse_timestamp(&discovered_at),
                })
            })
            .collect()
    }

    /// Mark enriched events as superseded once merged into a canonical
    /// record.
    pub async fn mark_enriched_status(
        &self,
        enriched_event_ids: &[Uuid],
        status: EventStatus,
    ) -> Result<(), StorageError> {
        for id in enriched_event_ids {
            sqlx::query(
                "UPDATE EnrichedEvents SET status = ?, updated_at = ? WHERE enriched_event_id = ?",
            )
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        }
        Ok(())
    }

    /// Active events that have not been through the search-grounded
    /// backfill yet.
    pub async fn enriched_pending_backfill(
        &self,
        limit: i64,
    ) -> Result<Vec<(Uuid, String, Option<NaiveDate>)>, StorageError> {
        let rows = sqlx::query(
            "SELECT enriched_event_id, title, event_date FROM EnrichedEvents
             WHERE status = 'Active' AND perplexity_validated = FALSE
             ORDER BY created_at ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("enriched_event_id")?;
                let title: String = row.try_get("title")?;
                let date: Option<String> = row.try_get("event_date")?;
                Ok((
                    Uuid::parse_str(&id)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    title,
                    date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                ))
            })
            .collect()
    }

    /// Apply a backfill verification blob, optionally correcting the event
    /// date and records count when the verification supplied better values.
    pub async fn apply_backfill(
        &self,
        enriched_event_id: Uuid,
        enrichment_data: &serde_json::Value,
        corrected_date: Option<NaiveDate>,
        corrected_records: Option<i64>,
    ) -> Result<(), StorageError> {
        let blob = serde_json::to_string(enrichment_data)?;
        sqlx::query(
            "UPDATE EnrichedEvents SET
                perplexity_validated = TRUE,
                perplexity_enrichment_data = ?,
                event_date = COALESCE(?, event_date),
                records_affected = COALESCE(?, records_affected),
                updated_at = ?
             WHERE enriched_event_id = ?",
        )
        .bind(blob)
        .bind(corrected_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(corrected_records)
        .bind(Utc::now().to_rfc3339())
        .bind(enriched_event_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Insert or fetch an entity by name, then link it to an enriched event
    /// with the given relationship.
    pub async fn link_entity(
        &self,
        enriched_event_id: Uuid,
        entity_name: &str,
        entity_type: EntityKind,
        industry: Option<&str>,
        is_australian: bool,
        relationship_type: &str,
        confidence: f64,
    ) -> Result<Uuid, StorageError> {
        let existing = sqlx::query("SELECT entity_id FROM Entities WHERE entity_name = ?")
            .bind(entity_name)
            .fetch_optional(self.pool())
            .await?;

        let entity_id = match existing {
            Some(row) => {
                let id: String = row.try_get("entity_id")?;
                Uuid::parse_str(&id).map_err(|e| StorageError::Serialization(e.to_string()))?
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO Entities (
                        entity_id, entity_name, entity_type, industry,
                        is_australian, confidence_score
                    ) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(id.to_string())
                .bind(entity_name)
                .bind(entity_type.as_str())
                .bind(industry)
                .bind(is_australian)
                .bind(confidence)
                .execute(self.pool())
                .await?;
                id
            }
        };

        sqlx::query(
            "INSERT OR IGNORE INTO EnrichedEventEntities (
                enriched_event_id, entity_id, relationship_type, confidence
            ) VALUES (?, ?, ?, ?)",
        )
        .bind(enriched_event_id.to_string())
        .bind(entity_id.to_string())
        .bind(relationship_type)
        .bind(confidence)
        .execute(self.pool())
        .await?;

        Ok(entity_id)
    }

    /// Enriched events carrying a records_affected value, for the repair
    /// job.
    pub async fn enriched_with_records(
        &self,
    ) -> Result<Vec<(Uuid, String, i64)>, StorageError> {
        let rows = sqlx::query(
            "SELECT enriched_event_id, title, records_affected FROM EnrichedEvents
             WHERE records_affected IS NOT NULL",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("enriched_event_id")?;
                let title: String = row.try_get("title")?;
                let records: i64 = row.try_get("records_affected")?;
                Ok((
                    Uuid::parse_str(&id)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    title,
                    records,
                ))
            })
            .collect()
    }

    /// Null out an out-of-policy records count (repair job, apply mode).
    pub async fn clear_enriched_records(&self, enriched_event_id: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE EnrichedEvents SET records_affected = NULL, updated_at = ?
             WHERE enriched_event_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(enriched_event_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
