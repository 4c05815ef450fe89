//! Idempotent repair job for out-of-policy records-affected values.
//!
//! Re-applies the shared records rule over already-persisted enriched and
//! canonical events. Dry-run reports what would change; apply mode nulls
//! the offending values. Running it twice is a no-op.

use aucyber_enrich::validate_records_affected;
use aucyber_persist::{EventStore, StorageError};

/// What a repair run found and did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairReport {
    pub examined: usize,
    pub out_of_policy: usize,
    pub cleared: usize,
    pub dry_run: bool,
}

/// Scan both tiers and null records counts the policy rejects.
pub async fn fix_records(store: &EventStore, dry_run: bool) -> Result<RepairReport, StorageError> {
    let mut report = RepairReport {
        dry_run,
        ..Default::default()
    };

    for (id, title, records) in store.enriched_with_records().await? {
        report.examined += 1;
        if validate_records_affected(Some(records), &title).is_none() {
            report.out_of_policy += 1;
            tracing::warn!(%id, records, title = %title, "Enriched records_affected out of policy");
            if !dry_run {
                store.clear_enriched_records(id).await?;
                report.cleared += 1;
            }
        }
    }

    for (id, title, records) in store.canonical_with_records().await? {
        report.examined += 1;
        if validate_records_affected(Some(records), &title).is_none() {
            report.out_of_policy += 1;
            tracing::warn!(%id, records, title = %title, "Canonical records_affected out of policy");
            if !dry_run {
                store.clear_canonical_records(id).await?;
                report.cleared += 1;
            }
        }
    }

    tracing::info!(
        examined = report.examined,
        out_of_policy = report.out_of_policy,
        cleared = report.cleared,
        dry_run,
        "Records repair complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aucyber_core::{CyberEventType, EventSeverity, RawEventDraft, SourceType};
    use aucyber_persist::NewEnrichedEvent;
    use chrono::NaiveDate;

    async fn seed(store: &EventStore, title: &str, records: i64) {
        let raw_id = store
            .add_raw_event(&RawEventDraft {
                source_type: SourceType::WebSearch,
                source_event_id: None,
                title: title.to_string(),
                description: "d".to_string(),
                content: None,
                event_date: None,
                source_url: Some(format!("https://example.com/{records}")),
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
                    event_date: NaiveDate::from_ymd_opt(2024, 5, 1),
                    records_affected: Some(records),
                    victim_organization_name: None,
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
            .unwrap();
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let store = EventStore::memory().await.unwrap();
        seed(&store, "Local Perth dental clinic suffers data breach", 25_000_000).await;
        seed(&store, "Optus data breach widens", 9_800_000).await;

        let report = fix_records(&store, true).await.unwrap();
        assert_eq!(report.out_of_policy, 1);
        assert_eq!(report.cleared, 0);
        // Nothing changed: the same finding appears on the next run.
        let again = fix_records(&store, true).await.unwrap();
        assert_eq!(again.out_of_policy, 1);
    }

    #[tokio::test]
    async fn apply_mode_is_idempotent() {
        let store = EventStore::memory().await.unwrap();
        seed(&store, "Local Perth dental clinic suffers data breach", 25_000_000).await;

        let first = fix_records(&store, false).await.unwrap();
        assert_eq!(first.cleared, 1);

        let second = fix_records(&store, false).await.unwrap();
        assert_eq!(second.out_of_policy, 0);
        assert_eq!(second.cleared, 0);
    }
}
