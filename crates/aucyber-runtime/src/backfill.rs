//! Search-grounded verification backfill.
//!
//! Active enriched events that predate the fact-checking stage (or were
//! created under an override) lack a verification blob. This job
//! re-validates them against live web sources, stores the blob, and adopts
//! corrected dates and record counts when the verification supplies
//! better values.

use std::sync::Arc;

use aucyber_enrich::validate_records_affected;
use aucyber_llm::{SearchProvider, ServiceRateLimiter};
use aucyber_persist::{EventStore, StorageError};

/// What a backfill run did.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillReport {
    pub processed: usize,
    pub validated: usize,
    pub corrected_dates: usize,
    pub corrected_records: usize,
    pub errors: usize,
}

fn verification_prompt(title: &str, event_date: Option<chrono::NaiveDate>) -> String {
    let date_hint = event_date
        .map(|d| format!(" around {d}"))
        .unwrap_or_default();
    format!(
        "Verify this reported Australian cyber incident{date_hint}: \"{title}\".\n\n\
Search for coverage and answer with ONLY a JSON object:\n\
{{\"incident_confirmed\": true or false, \"actual_date\": \"YYYY-MM-DD or null\", \
\"records_affected\": integer or null, \"attacker\": \"name or null\", \
\"confidence\": 0.0 to 1.0, \"sources\": [\"URL1\"], \"reasoning\": \"one sentence\"}}\n\n\
Rules: confirm only from credible sources; records_affected counts people, not \
transactions or dollars; prefer official statements and Australian outlets."
    )
}

/// Re-validate events pending verification, up to `limit`.
pub async fn backfill_verifications(
    store: &EventStore,
    search: Arc<dyn SearchProvider>,
    rate_limiter: Arc<ServiceRateLimiter>,
    limit: i64,
) -> Result<BackfillReport, StorageError> {
    let pending = store.enriched_pending_backfill(limit).await?;
    tracing::info!(events = pending.len(), "Verification backfill starting");

    let mut report = BackfillReport::default();
    for (enriched_event_id, title, event_date) in pending {
        report.processed += 1;
        rate_limiter.wait(search.name()).await;

        let value = match search.search_json(&verification_prompt(&title, event_date)).await {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%enriched_event_id, error = %error, "Verification call failed");
                report.errors += 1;
                continue;
            }
        };

        let confirmed = value["incident_confirmed"] == serde_json::json!(true);
        let confidence = value["confidence"].as_f64().unwrap_or(0.0);

        // Adopt corrections only from confident confirmations.
        let mut corrected_date = None;
        let mut corrected_records = None;
        if confirmed && confidence >= 0.7 {
            corrected_date = value["actual_date"]
                .as_str()
                .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .filter(|d| Some(*d) != event_date);
            corrected_records =
                validate_records_affected(value["records_affected"].as_i64(), &title);
        }

        if corrected_date.is_some() {
            report.corrected_dates += 1;
        }
        if corrected_records.is_some() {
            report.corrected_records += 1;
        }

        store
            .apply_backfill(enriched_event_id, &value, corrected_date, corrected_records)
            .await?;
        report.validated += 1;
    }

    tracing::info!(
        processed = report.processed,
        validated = report.validated,
        corrected_dates = report.corrected_dates,
        corrected_records = report.corrected_records,
        errors = report.errors,
        "Verification backfill complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aucyber_core::{CyberEventType, EventSeverity, RawEventDraft, SourceType};
    use aucyber_llm::MockProvider;
    use aucyber_persist::NewEnrichedEvent;
    use chrono::NaiveDate;

    async fn seed(store: &EventStore, title: &str) -> uuid::Uuid {
        let raw_id = store
            .add_raw_event(&RawEventDraft {
                source_type: SourceType::WebSearch,
                source_event_id: None,
                title: title.to_string(),
                description: "d".to_string(),
                content: None,
                event_date: None,
                source_url: Some("https://example.com/a".to_string()),
                metadata: serde_json::Value::Null,
            })
            .await
            .unwrap()
            .unwrap();
        store
            .insert_enriched(
                &NewEnrichedEvent {
                    raw_event_id: raw_id,
                    title: title.to_string(),
                    description: "d".to_string(),
                    summary: None,
                    event_type: CyberEventType::DataBreach,
                    severity: EventSeverity::High,
                    event_date: NaiveDate::from_ymd_opt(2024, 6, 1),
                    records_affected: None,
                    victim_organization_name: Some("Acme".to_string()),
                    victim_organization_industry: None,
                    attacking_entity_name: None,
                    attack_method: None,
                    is_australian_event: true,
                    is_specific_event: true,
                    confidence_score: 0.8,
                    australian_relevance_score: 0.9,
                },
                false,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn confident_confirmation_applies_corrections() {
        let store = EventStore::memory().await.unwrap();
        seed(&store, "Acme data breach").await;

        let search = Arc::new(MockProvider::constant(
            r#"{"incident_confirmed": true, "actual_date": "2024-06-12",
                "records_affected": 120000, "confidence": 0.9, "sources": []}"#,
        ));
        let limiter = Arc::new(ServiceRateLimiter::with_default_limits());
        let report = backfill_verifications(&store, search, limiter.clone(), 10)
            .await
            .unwrap();
        assert_eq!(report.validated, 1);
        assert_eq!(report.corrected_dates, 1);
        assert_eq!(report.corrected_records, 1);

        // Once validated, the event leaves the pending queue.
        assert!(store.enriched_pending_backfill(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unconfirmed_events_store_blob_without_corrections() {
        let store = EventStore::memory().await.unwrap();
        seed(&store, "Acme data breach").await;

        let search = Arc::new(MockProvider::constant(
            r#"{"incident_confirmed": false, "confidence": 0.2, "sources": []}"#,
        ));
        let limiter = Arc::new(ServiceRateLimiter::with_default_limits());
        let report = backfill_verifications(&store, search, limiter, 10).await.unwrap();
        assert_eq!(report.validated, 1);
        assert_eq!(report.corrected_dates, 0);
        assert_eq!(report.corrected_records, 0);
    }
}
