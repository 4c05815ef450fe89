//! Integration tests for the three-tier store against an in-memory SQLite
//! database.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use aucyber_core::{
    ContributionType, CyberEventType, EventSeverity, EventSource, EventStatus, RawEventDraft,
    SourceType,
};
use aucyber_persist::{AuditRecord, CanonicalWrite, EventStore, MappingRow, NewEnrichedEvent};

fn draft(title: &str, url: &str) -> RawEventDraft {
    RawEventDraft {
        source_type: SourceType::WebSearch,
        source_event_id: None,
        title: title.to_string(),
        description: "An Australian organisation disclosed a cyber incident.".to_string(),
        content: None,
        event_date: NaiveDate::from_ymd_opt(2024, 6, 10),
        source_url: Some(url.to_string()),
        metadata: serde_json::json!({"query": "australia data breach"}),
    }
}

fn enriched_for(raw_event_id: Uuid, title: &str, victim: &str) -> NewEnrichedEvent {
    NewEnrichedEvent {
        raw_event_id,
        title: title.to_string(),
        description: "Customer data exposed.".to_string(),
        summary: None,
        event_type: CyberEventType::DataBreach,
        severity: EventSeverity::High,
        event_date: NaiveDate::from_ymd_opt(2024, 6, 10),
        records_affected: Some(280_000),
        victim_organization_name: Some(victim.to_string()),
        victim_organization_industry: Some("TELECOMMUNICATIONS".to_string()),
        attacking_entity_name: None,
        attack_method: Some("credential stuffing".to_string()),
        is_australian_event: true,
        is_specific_event: true,
        confidence_score: 0.85,
        australian_relevance_score: 0.9,
    }
}

#[tokio::test]
async fn duplicate_gate_skips_repeat_discovery() {
    let store = EventStore::memory().await.unwrap();

    let first = store
        .add_raw_event(&draft("iiNet Data Breach", "https://example.com/a"))
        .await
        .unwrap();
    assert!(first.is_some());

    // Re-running discovery with the same key produces zero new rows.
    let second = store
        .add_raw_event(&draft("iiNet Data Breach", "https://example.com/a"))
        .await
        .unwrap();
    assert!(second.is_none());

    // A different URL with the same title is a new record.
    let third = store
        .add_raw_event(&draft("iiNet Data Breach", "https://example.com/b"))
        .await
        .unwrap();
    assert!(third.is_some());

    let (_, pending) = store.raw_event_counts().await.unwrap();
    assert_eq!(pending, 2);
}

#[tokio::test]
async fn raw_lifecycle_tracks_processing_outcomes() {
    let store = EventStore::memory().await.unwrap();
    let raw_id = store
        .add_raw_event(&draft("Acme breach", "https://example.com/acme"))
        .await
        .unwrap()
        .unwrap();

    let pending = store.unprocessed_raw_events(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].raw_event_id, raw_id);

    store
        .mark_raw_processed(raw_id, Some("content acquisition failed"))
        .await
        .unwrap();
    let raw = store.get_raw_event(raw_id).await.unwrap();
    assert!(raw.is_processed);
    assert_eq!(
        raw.processing_error.as_deref(),
        Some("content acquisition failed")
    );
    assert!(store.unprocessed_raw_events(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn enriched_insert_requires_australian_and_specific_flags() {
    let store = EventStore::memory().await.unwrap();
    let raw_id = store
        .add_raw_event(&draft("Acme breach", "https://example.com/acme"))
        .await
        .unwrap()
        .unwrap();

    let mut event = enriched_for(raw_id, "Acme breach", "Acme");
    event.is_specific_event = false;
    assert!(store.insert_enriched(&event, false).await.is_err());

    // Manual override path still persists it.
    assert!(store.insert_enriched(&event, true).await.is_ok());

    event.is_specific_event = true;
    let id = store.insert_enriched(&event, false).await.unwrap();
    let matches = store
        .find_active_by_victim_and_date("Acme", NaiveDate::from_ymd_opt(2024, 6, 10).unwrap())
        .await
        .unwrap();
    assert!(matches.iter().any(|(found, _)| *found == id));
}

#[tokio::test]
async fn canonical_write_is_transactional_and_counts_distinct_urls() {
    let store = EventStore::memory().await.unwrap();

    let raw_a = store
        .add_raw_event(&draft("ANZ Bank confirms data leak", "https://example.com/a"))
        .await
        .unwrap()
        .unwrap();
    let raw_b = store
        .add_raw_event(&draft(
            "Australia and New Zealand Banking Group discloses breach",
            "https://example.com/b",
        ))
        .await
        .unwrap()
        .unwrap();

    let enriched_a = store
        .insert_enriched(&enriched_for(raw_a, "ANZ Bank confirms data leak", "ANZ"), false)
        .await
        .unwrap();
    let enriched_b = store
        .insert_enriched(
            &enriched_for(
                raw_b,
                "Australia and New Zealand Banking Group discloses breach",
                "ANZ",
            ),
            false,
        )
        .await
        .unwrap();

    let write = CanonicalWrite {
        master_enriched_event_id: enriched_a,
        title: "Australia and New Zealand Banking Group discloses breach".to_string(),
        description: "Customer data exposed.".to_string(),
        summary: None,
        event_type: CyberEventType::DataBreach,
        severity: EventSeverity::High,
        event_date: NaiveDate::from_ymd_opt(2024, 6, 10),
        records_affected: Some(280_000),
        victim_organization_name: Some("ANZ".to_string()),
        victim_organization_industry: Some("FINANCIAL_SERVICES".to_string()),
        attacking_entity_name: None,
        attack_method: Some("credential stuffing".to_string()),
        is_australian_event: true,
        is_specific_event: true,
        confidence_score: 0.95,
        australian_relevance_score: 0.9,
        similarity_score: 0.82,
        deduplication_method: "entity_anchored_hybrid".to_string(),
        mappings: vec![
            MappingRow {
                raw_event_id: raw_a,
                enriched_event_id: enriched_a,
                contribution_type: ContributionType::Primary,
                similarity_to_master: 1.0,
                weight: 1.0,
            },
            MappingRow {
                raw_event_id: raw_b,
                enriched_event_id: enriched_b,
                contribution_type: ContributionType::Supporting,
                similarity_to_master: 0.82,
                weight: 1.0,
            },
        ],
        sources: vec![
            EventSource {
                source_url: "https://example.com/a".to_string(),
                source_type: SourceType::WebSearch,
                credibility_score: 0.8,
                content_snippet: None,
                discovered_at: Some(Utc::now()),
            },
            EventSource {
                source_url: "https://example.com/b".to_string(),
                source_type: SourceType::WebSearch,
                credibility_score: 0.8,
                content_snippet: None,
                discovered_at: Some(Utc::now()),
            },
            // Same URL again: must be deduplicated in the source table.
            EventSource {
                source_url: "https://example.com/b".to_string(),
                source_type: SourceType::RegulatorScrape,
                credibility_score: 1.0,
                content_snippet: None,
                discovered_at: Some(Utc::now()),
            },
        ],
        algorithm_version: "v2.0".to_string(),
    };

    let dedup_id = store.insert_canonical(&write).await.unwrap();
    assert_eq!(store.canonical_source_count(dedup_id).await.unwrap(), 2);

    store
        .mark_enriched_status(&[enriched_b], EventStatus::Superseded)
        .await
        .unwrap();
    let active = store.active_enriched_with_raw().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].enriched_event_id, enriched_a);

    // A re-run clears and rebuilds the canonical tier.
    assert_eq!(store.clear_canonical().await.unwrap(), 1);
}

#[tokio::test]
async fn audit_trail_records_one_row_per_run() {
    let store = EventStore::memory().await.unwrap();
    let raw_id = store
        .add_raw_event(&draft("Acme breach", "https://example.com/acme"))
        .await
        .unwrap()
        .unwrap();

    let record = AuditRecord {
        raw_event_id: Some(raw_id),
        started_at: Some(Utc::now()),
        completed_at: Some(Utc::now()),
        total_time_seconds: Some(4.2),
        final_decision: Some("AUTO_ACCEPT".to_string()),
        final_confidence: Some(0.86),
        stage1_success: Some(true),
        stage1_extraction_method: Some("article_parser".to_string()),
        stage1_content_length: Some(640),
        stage1_source_reliability: Some(0.9),
        stage2_success: Some(true),
        stage2_victim_organization: Some("Acme".to_string()),
        stage2_confidence: Some(0.85),
        stage5_stage_confidences: Some(serde_json::json!({
            "extraction": 0.85, "fact_check": 0.8, "validation": 0.9, "source_reliability": 0.9
        })),
        ..Default::default()
    };

    store.save_audit_trail(&record).await.unwrap();
    assert_eq!(store.audit_count_for_raw(raw_id).await.unwrap(), 1);
}

#[tokio::test]
async fn month_ledger_is_idempotent() {
    let store = EventStore::memory().await.unwrap();

    assert!(!store.is_month_processed(2024, 6).await.unwrap());
    store
        .mark_month_processed(2024, 6, &serde_json::json!({"discovered": 12, "enriched": 7}))
        .await
        .unwrap();
    assert!(store.is_month_processed(2024, 6).await.unwrap());

    // Forcing a re-run overwrites stats without duplicating the row.
    store
        .mark_month_processed(2024, 6, &serde_json::json!({"discovered": 12, "enriched": 8}))
        .await
        .unwrap();
    let stats = store.month_stats(2024, 6).await.unwrap().unwrap();
    assert_eq!(stats["enriched"], serde_json::json!(8));
}

#[tokio::test]
async fn entity_links_are_unique_per_relationship() {
    let store = EventStore::memory().await.unwrap();
    let raw_id = store
        .add_raw_event(&draft("Acme breach", "https://example.com/acme"))
        .await
        .unwrap()
        .unwrap();
    let enriched_id = store
        .insert_enriched(&enriched_for(raw_id, "Acme breach", "Acme"), false)
        .await
        .unwrap();

    let first = store
        .link_entity(
            enriched_id,
            "Acme",
            aucyber_core::EntityKind::Business,
            Some("TECHNOLOGY"),
            true,
            "victim",
            0.9,
        )
        .await
        .unwrap();
    let second = store
        .link_entity(
            enriched_id,
            "Acme",
            aucyber_core::EntityKind::Business,
            Some("TECHNOLOGY"),
            true,
            "victim",
            0.9,
        )
        .await
        .unwrap();
    assert_eq!(first, second);
}
