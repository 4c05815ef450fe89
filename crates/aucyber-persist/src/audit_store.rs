//! Per-run enrichment audit trail.
//!
//! Every pipeline run persists exactly one row carrying timing, the final
//! decision and confidence, and a compact JSON blob per stage. If a stage
//! threw, the stage name and error message are recorded.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::error::StorageError;
use crate::store::EventStore;

/// One pipeline run, flattened for storage.
#[derive(Debug, Clone, Default)]
pub struct AuditRecord {
    pub raw_event_id: Option<Uuid>,
    pub enriched_event_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_time_seconds: Option<f64>,
    pub final_decision: Option<String>,
    pub final_confidence: Option<f64>,

    pub stage1_success: Option<bool>,
    pub stage1_extraction_method: Option<String>,
    pub stage1_content_length: Option<i64>,
    pub stage1_source_reliability: Option<f64>,
    pub stage1_details: Option<serde_json::Value>,

    pub stage2_success: Option<bool>,
    pub stage2_victim_organization: Option<String>,
    pub stage2_confidence: Option<f64>,
    pub stage2_is_specific_incident: Option<bool>,
    pub stage2_australian_relevance: Option<f64>,
    pub stage2_tokens_used: Option<i64>,
    pub stage2_details: Option<serde_json::Value>,

    pub stage3_checks_performed: Option<i64>,
    pub stage3_checks_passed: Option<i64>,
    pub stage3_checks_failed: Option<i64>,
    pub stage3_verification_confidence: Option<f64>,
    pub stage3_details: Option<serde_json::Value>,

    pub stage4_is_valid: Option<bool>,
    pub stage4_error_count: Option<i64>,
    pub stage4_warning_count: Option<i64>,
    pub stage4_validation_confidence: Option<f64>,
    pub stage4_details: Option<serde_json::Value>,

    pub stage5_stage_confidences: Option<serde_json::Value>,
    pub stage5_penalties_applied: Option<serde_json::Value>,

    pub error_message: Option<String>,
    pub error_stage: Option<String>,
}

const PIPELINE_VERSION: &str = "1.0";

fn to_json_text(value: &Option<serde_json::Value>) -> Result<Option<String>, StorageError> {
    match value {
        Some(v) => Ok(Some(serde_json::to_string(v)?)),
        None => Ok(None),
    }
}

impl EventStore {
    /// Persist one audit row; returns the generated audit id.
    pub async fn save_audit_trail(&self, record: &AuditRecord) -> Result<Uuid, StorageError> {
        let audit_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO EnrichmentAuditTrail (
                audit_id, raw_event_id, enriched_event_id, pipeline_version,
                started_at, completed_at, total_time_seconds,
                final_decision, final_confidence,
                stage1_success, stage1_extraction_method, stage1_content_length,
                stage1_source_reliability, stage1_details,
                stage2_success, stage2_victim_organization, stage2_confidence,
                stage2_is_specific_incident, stage2_australian_relevance,
                stage2_tokens_used, stage2_details,
                stage3_checks_performed, stage3_checks_passed, stage3_checks_failed,
                stage3_verification_confidence, stage3_details,
                stage4_is_valid, stage4_error_count, stage4_warning_count,
                stage4_validation_confidence, stage4_details,
                stage5_stage_confidences, stage5_penalties_applied,
                error_message, error_stage
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(audit_id.to_string())
        .bind(record.raw_event_id.map(|id| id.to_string()))
        .bind(record.enriched_event_id.map(|id| id.to_string()))
        .bind(PIPELINE_VERSION)
        .bind(record.started_at.map(|t| t.to_rfc3339()))
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .bind(record.total_time_seconds)
        .bind(&record.final_decision)
        .bind(record.final_confidence)
        .bind(record.stage1_success)
        .bind(&record.stage1_extraction_method)
        .bind(record.stage1_content_length)
        .bind(record.stage1_source_reliability)
        .bind(to_json_text(&record.stage1_details)?)
        .bind(record.stage2_success)
        .bind(&record.stage2_victim_organization)
        .bind(record.stage2_confidence)
        .bind(record.stage2_is_specific_incident)
        .bind(record.stage2_australian_relevance)
        .bind(record.stage2_tokens_used)
        .bind(to_json_text(&record.stage2_details)?)
        .bind(record.stage3_checks_performed)
        .bind(record.stage3_checks_passed)
        .bind(record.stage3_checks_failed)
        .bind(record.stage3_verification_confidence)
        .bind(to_json_text(&record.stage3_details)?)
        .bind(record.stage4_is_valid)
        .bind(record.stage4_error_count)
        .bind(record.stage4_warning_count)
        .bind(record.stage4_validation_confidence)
        .bind(to_json_text(&record.stage4_details)?)
        .bind(to_json_text(&record.stage5_stage_confidences)?)
        .bind(to_json_text(&record.stage5_penalties_applied)?)
        .bind(&record.error_message)
        .bind(&record.error_stage)
        .execute(self.pool())
        .await?;

        Ok(audit_id)
    }

    /// Audit rows recorded for one raw event (newest first).
    pub async fn audit_count_for_raw(&self, raw_event_id: Uuid) -> Result<i64, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM EnrichmentAuditTrail WHERE raw_event_id = ?",
        )
        .bind(raw_event_id.to_string())
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("n")?)
    }
}
