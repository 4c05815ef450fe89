//! Deduplicated tier: canonical events, mapping rows, consolidated
//! sources, and cluster descriptors, written together in one transaction.

use chrono::{NaiveDate, Utc};
use sqlx::Row;
use uuid::Uuid;

use aucyber_core::{ContributionType, CyberEventType, EventSeverity, EventSource};

use crate::error::StorageError;
use crate::store::EventStore;

/// One contributor's mapping row.
#[derive(Debug, Clone)]
pub struct MappingRow {
    pub raw_event_id: Uuid,
    pub enriched_event_id: Uuid,
    pub contribution_type: ContributionType,
    pub similarity_to_master: f64,
    pub weight: f64,
}

/// Everything the engine produced for one canonical event.
#[derive(Debug, Clone)]
pub struct CanonicalWrite {
    pub master_enriched_event_id: Uuid,
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
    pub similarity_score: f64,
    pub deduplication_method: String,
    pub mappings: Vec<MappingRow>,
    pub sources: Vec<EventSource>,
    pub algorithm_version: String,
}

impl EventStore {
    /// Persist one canonical event with its mapping rows, URL-deduped
    /// sources, and cluster descriptor. All rows commit or none do.
    pub async fn insert_canonical(&self, write: &CanonicalWrite) -> Result<Uuid, StorageError> {
        let deduplicated_event_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        let distinct_urls: std::collections::HashSet<&str> =
            write.sources.iter().map(|s| s.source_url.as_str()).collect();
        let total_data_sources = distinct_urls.len() as i64;
        let contributing_raw: std::collections::HashSet<Uuid> =
            write.mappings.iter().map(|m| m.raw_event_id).collect();

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO DeduplicatedEvents (
                deduplicated_event_id, master_enriched_event_id, title, description,
                summary, event_type, severity, event_date, records_affected,
                victim_organization_name, victim_organization_industry,
                attacking_entity_name, attack_method,
                is_australian_event, is_specific_event,
                confidence_score, australian_relevance_score,
                total_data_sources, contributing_raw_events, contributing_enriched_events,
                similarity_score, deduplication_method, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'Active', ?, ?)",
        )
        .bind(deduplicated_event_id.to_string())
        .bind(write.master_enriched_event_id.to_string())
        .bind(&write.title)
        .bind(&write.description)
        .bind(&write.summary)
        .bind(write.event_type.as_str())
        .bind(write.severity.as_str())
        .bind(write.event_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(write.records_affected)
        .bind(&write.victim_organization_name)
        .bind(&write.victim_organization_industry)
        .bind(&write.attacking_entity_name)
        .bind(&write.attack_method)
        .bind(write.is_australian_event)
        .bind(write.is_specific_event)
        .bind(write.confidence_score)
        .bind(write.australian_relevance_score)
        .bind(total_data_sources)
        .bind(contributing_raw.len() as i64)
        .bind(write.mappings.len() as i64)
        .bind(write.similarity_score)
        .bind(&write.deduplication_method)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for mapping in &write.mappings {
            sqlx::query(
                "INSERT INTO EventDeduplicationMap (
                    map_id, raw_event_id, enriched_event_id, deduplicated_event_id,
                    contribution_type, similarity_score, data_source_weight
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(mapping.raw_event_id.to_string())
            .bind(mapping.enriched_event_id.to_string())
            .bind(deduplicated_event_id.to_string())
            .bind(mapping.contribution_type.as_str())
            .bind(mapping.similarity_to_master)
            .bind(mapping.weight)
            .execute(&mut *tx)
            .await?;
        }

        for source in &write.sources {
            sqlx::query(
                "INSERT OR IGNORE INTO DeduplicatedEventSources (
                    deduplicated_event_id, source_url, source_type,
                    credibility_score, content_snippet, discovered_at
                ) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(deduplicated_event_id.to_string())
            .bind(&source.source_url)
            .bind(source.source_type.as_str())
            .bind(source.credibility_score)
            .bind(&source.content_snippet)
            .bind(source.discovered_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO DeduplicationClusters (
                cluster_id, deduplicated_event_id, cluster_size,
                average_similarity, deduplication_timestamp, algorithm_version
            ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(deduplicated_event_id.to_string())
        .bind(write.mappings.len() as i64)
        .bind(write.similarity_score)
        .bind(&now)
        .bind(&write.algorithm_version)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(deduplicated_event_id)
    }

    /// Drop all canonical rows so a deduplication run can rebuild them from
    /// a stable enriched set.
    pub async fn clear_canonical(&self) -> Result<u64, StorageError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM EventDeduplicationMap").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM DeduplicatedEventSources").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM DeduplicationClusters").execute(&mut *tx).await?;
        let result = sqlx::query("DELETE FROM DeduplicatedEvents").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Distinct source URLs recorded for a canonical event (invariant
    /// checks and stats).
    pub async fn canonical_source_count(
        &self,
        deduplicated_event_id: Uuid,
    ) -> Result<i64, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT source_url) AS n FROM DeduplicatedEventSources
             WHERE deduplicated_event_id = ?",
        )
        .bind(deduplicated_event_id.to_string())
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("n")?)
    }

    /// Export rows: every Active canonical event, newest first.
    pub async fn list_canonical(
        &self,
    ) -> Result<Vec<CanonicalExportRow>, StorageError> {
        let rows = sqlx::query(
            "SELECT deduplicated_event_id, title, victim_organization_name,
                    victim_organization_industry, event_type, severity, event_date,
                    records_affected, attacking_entity_name, attack_method,
                    total_data_sources, confidence_score
             FROM DeduplicatedEvents
             WHERE status = 'Active'
             ORDER BY event_date DESC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("deduplicated_event_id")?;
                let event_date: Option<String> = row.try_get("event_date")?;
                Ok(CanonicalExportRow {
                    deduplicated_event_id: Uuid::parse_str(&id)
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                    title: row.try_get("title")?,
                    victim_organization_name: row.try_get("victim_organization_name")?,
                    victim_organization_industry: row.try_get("victim_organization_industry")?,
                    event_type: row
                        .try_get::<Option<String>, _>("event_type")?
                        .unwrap_or_default(),
                    severity: row
                        .try_get::<Option<String>, _>("severity")?
                        .unwrap_or_default(),
                    event_date: event_date
                        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                    records_affected: row.try_get("records_affected")?,
                    attacking_entity_name: row.try_get("attacking_entity_name")?,
                    attack_method: row.try_get("attack_method")?,
                    total_data_sources: row.try_get("total_data_sources")?,
                    confidence_score: row
                        .try_get::<Option<f64>, _>("confidence_score")?
                        .unwrap_or(0.0),
                })
            })
            .collect()
    }

    /// Canonical events carrying a records_affected value, for the repair
    /// job.
    pub async fn canonical_with_records(
        &self,
    ) -> Result<Vec<(Uuid, String, i64)>, StorageError> {
        let rows = sqlx::query(
            "SELECT deduplicated_event_id, title, records_affected FROM DeduplicatedEvents
             WHERE records_affected IS NOT NULL",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("deduplicated_event_id")?;
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

    pub async fn clear_canonical_records(
        &self,
        deduplicated_event_id: Uuid,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE DeduplicatedEvents SET records_affected = NULL, updated_at = ?
             WHERE deduplicated_event_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(deduplicated_event_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

/// Flattened canonical event for CSV/XLSX export.
#[derive(Debug, Clone)]
pub struct CanonicalExportRow {
    pub deduplicated_event_id: Uuid,
    pub title: String,
    pub victim_organization_name: Option<String>,
    pub victim_organization_industry: Option<String>,
    pub event_type: String,
    pub severity: String,
    pub event_date: Option<NaiveDate>,
    pub records_affected: Option<i64>,
    pub attacking_entity_name: Option<String>,
    pub attack_method: Option<String>,
    pub total_data_sources: i64,
    pub confidence_score: f64,
}
