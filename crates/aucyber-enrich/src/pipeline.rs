//! The five-stage pipeline, wired together.
//!
//! Stages run strictly in order for a single event; the orchestrator runs
//! different events in parallel. Every run writes exactly one audit row,
//! whatever happened. Persistence rules:
//!
//! - content failure short-circuits to REJECT, raw marked processed with
//!   the error
//! - REJECT stores no enriched event, raw marked processed
//! - accepted events persist only when both the Australian and specificity
//!   flags hold
//! - a storage failure leaves the raw event unprocessed so it is retried

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use aucyber_core::{CyberEventType, EntityKind, RawEvent};
use aucyber_llm::ServiceRateLimiter;
use aucyber_persist::{AuditRecord, EventStore, NewEnrichedEvent};

use crate::confidence::{aggregate_confidence, Decision, FinalDecision};
use crate::content::{AcquiredContent, ContentAcquisition};
use crate::error::EnrichError;
use crate::extract::{Extraction, ExtractionMetadata, PrimaryExtractor};
use crate::factcheck::{FactCheckResult, FactChecker};
use crate::validate::{DuplicateHit, Validator};

/// What a pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub decision: Decision,
    pub final_confidence: f64,
    pub enriched_event_id: Option<Uuid>,
    pub audit_id: Uuid,
}

/// The enrichment pipeline. One instance serves all workers; stages hold
/// no per-event state.
pub struct EnrichmentPipeline {
    content: ContentAcquisition,
    extractor: PrimaryExtractor,
    fact_checker: FactChecker,
    validator: Validator,
    store: EventStore,
    rate_limiter: Arc<ServiceRateLimiter>,
}

impl EnrichmentPipeline {
    pub fn new(
        content: ContentAcquisition,
        extractor: PrimaryExtractor,
        fact_checker: FactChecker,
        store: EventStore,
        rate_limiter: Arc<ServiceRateLimiter>,
    ) -> Self {
        Self {
            content,
            extractor,
            fact_checker,
            validator: Validator::new(),
            store,
            rate_limiter,
        }
    }

    /// Run all five stages for one raw event and persist the results.
    pub async fn enrich_event(&self, raw: &RawEvent) -> Result<PipelineOutcome, EnrichError> {
        let started = Instant::now();
        let started_at = Utc::now();
        tracing::info!(raw_id = %raw.raw_event_id, title = %raw.title, "Enriching event");

        let mut audit = AuditRecord {
            raw_event_id: Some(raw.raw_event_id),
            started_at: Some(started_at),
            ..Default::default()
        };

        // Stage 1: content acquisition
        let content = self.acquire_content(raw).await;
        audit.stage1_success = Some(content.extraction_success);
        audit.stage1_extraction_method = Some(content.extraction_method.as_str().to_string());
        audit.stage1_content_length = Some(content.content_length as i64);
        audit.stage1_source_reliability = Some(content.source_reliability);
        audit.stage1_details = Some(serde_json::json!({
            "url": raw.source_url,
            "source_domain": content.source_domain,
            "publication_date": content.publication_date.map(|d| d.to_string()),
            "error": content.error,
        }));

        self.store
            .log_processing(
                raw.raw_event_id,
                "content_acquisition",
                if content.extraction_success { "success" } else { "failed" },
                None,
                content.error.as_deref(),
                started.elapsed().as_millis() as i64,
            )
            .await?;

        if !content.extraction_success {
            let error = content
                .error
                .clone()
                .unwrap_or_else(|| "content acquisition failed".to_string());
            audit.error_message = Some(error.clone());
            audit.error_stage = Some("content_acquisition".to_string());
            return self
                .finish_rejected(raw, audit, started, Some(&error))
                .await;
        }

        // Stage 2: primary extraction
        self.rate_limiter.wait("openai").await;
        let (mut extraction, metadata) = self
            .extractor
            .extract(&raw.title, raw.source_url.as_deref(), &content)
            .await;
        self.record_stage2(&mut audit, &extraction, &metadata);

        // Stage 3: fact-checking (skipped for sentinel extractions, which
        // carry nothing checkable)
        let fact_check = if extraction.failed() {
            FactCheckResult::default()
        } else {
            self.fact_checker.fact_check(&extraction).await
        };
        audit.stage3_checks_performed = Some(fact_check.checks_performed as i64);
        audit.stage3_checks_passed = Some(fact_check.checks_passed as i64);
        audit.stage3_checks_failed = Some(fact_check.checks_failed as i64);
        audit.stage3_verification_confidence = Some(fact_check.overall_verification_confidence);
        audit.stage3_details = serde_json::to_value(&fact_check.details).ok();

        // Stage 4: validation
        let duplicate_hits = self.find_duplicates(&extraction).await;
        let validation = self.validator.validate(
            &mut extraction,
            &fact_check,
            Some(&raw.title),
            raw.source_url.as_deref(),
            &duplicate_hits,
        );
        audit.stage4_is_valid = Some(validation.is_valid);
        audit.stage4_error_count = Some(validation.errors.len() as i64);
        audit.stage4_warning_count = Some(validation.warnings.len() as i64);
        audit.stage4_validation_confidence = Some(validation.validation_confidence);
        audit.stage4_details = Some(serde_json::json!({
            "errors": validation.errors,
            "warnings": validation.warnings,
            "overrides": serde_json::to_value(&validation.overrides).unwrap_or_default(),
        }));

        // Stage 5: confidence aggregation and decision
        let decision = aggregate_confidence(
            &extraction,
            &fact_check,
            &validation,
            &content,
            Some(&raw.title),
        );
        audit.final_decision = Some(decision.decision.as_str().to_string());
        audit.final_confidence = Some(decision.final_confidence);
        audit.stage5_stage_confidences = serde_json::to_value(decision.stage_confidences).ok();
        audit.stage5_penalties_applied = serde_json::to_value(&decision.applied_penalties).ok();

        // Persist
        let enriched_event_id = match self
            .persist_decision(raw, &content, &extraction, &decision)
            .await
        {
            Ok(id) => id,
            Err(EnrichError::Storage(error)) => {
                // Rollback path: leave the raw event retryable.
                tracing::error!(raw_id = %raw.raw_event_id, error = %error, "Enriched write failed");
                self.store.mark_raw_attempted(raw.raw_event_id).await?;
                audit.error_message = Some(error.to_string());
                audit.error_stage = Some("persistence".to_string());
                audit.completed_at = Some(Utc::now());
                audit.total_time_seconds = Some(started.elapsed().as_secs_f64());
                self.store.save_audit_trail(&audit).await?;
                return Err(EnrichError::Storage(error));
            }
            Err(other) => return Err(other),
        };
        audit.enriched_event_id = enriched_event_id;

        audit.completed_at = Some(Utc::now());
        audit.total_time_seconds = Some(started.elapsed().as_secs_f64());
        let audit_id = self.store.save_audit_trail(&audit).await?;

        Ok(PipelineOutcome {
            decision: decision.decision,
            final_confidence: decision.final_confidence,
            enriched_event_id,
            audit_id,
        })
    }

    async fn acquire_content(&self, raw: &RawEvent) -> AcquiredContent {
        if let Some(article_url) = raw.source_url.as_deref() {
            let acquired = self.content.acquire(article_url).await;
            if acquired.extraction_success {
                return acquired;
            }
            // Fall back to whatever the collector stored.
        }
        let stored = raw.content.as_deref().unwrap_or(&raw.description);
        AcquiredContent::from_text(stored)
    }

    fn record_stage2(
        &self,
        audit: &mut AuditRecord,
        extraction: &Extraction,
        metadata: &ExtractionMetadata,
    ) {
        audit.stage2_success = Some(!extraction.failed());
        audit.stage2_victim_organization = extraction.victim.organization.clone();
        audit.stage2_confidence = Some(extraction.overall_confidence);
        audit.stage2_is_specific_incident = Some(extraction.specificity.is_specific_incident);
        audit.stage2_australian_relevance =
            Some(extraction.australian_relevance.relevance_score);
        audit.stage2_tokens_used = metadata.tokens_used.map(|t| t as i64);
        audit.stage2_details = serde_json::to_value(extraction).ok();
    }

    async fn find_duplicates(&self, extraction: &Extraction) -> Vec<DuplicateHit> {
        let (Some(victim), Some(date)) = (
            extraction.victim.organization.as_deref(),
            extraction.incident.parsed_date(),
        ) else {
            return Vec::new();
        };
        match self.store.find_active_by_victim_and_date(victim, date).await {
            Ok(hits) => hits
                .into_iter()
                .map(|(enriched_event_id, title)| DuplicateHit {
                    enriched_event_id,
                    title,
                })
                .collect(),
            Err(error) => {
                tracing::warn!(error = %error, "Duplicate lookup failed");
                Vec::new()
            }
        }
    }

    async fn persist_decision(
        &self,
        raw: &RawEvent,
        content: &AcquiredContent,
        extraction: &Extraction,
        decision: &FinalDecision,
    ) -> Result<Option<Uuid>, EnrichError> {
        if !decision.decision.accepts() {
            self.store
                .mark_raw_processed(
                    raw.raw_event_id,
                    Some(&format!(
                        "rejected at confidence {:.2}",
                        decision.final_confidence
                    )),
                )
                .await?;
            return Ok(None);
        }

        let australian = extraction.australian_relevance.is_australian_event;
        let specific = extraction.specificity.is_specific_incident;
        if !(australian && specific) {
            self.store
                .mark_raw_processed(
                    raw.raw_event_id,
                    Some(&format!(
                        "accepted but not persisted (australian={australian}, specific={specific})"
                    )),
                )
                .await?;
            return Ok(None);
        }

        let event = NewEnrichedEvent {
            raw_event_id: raw.raw_event_id,
            title: raw.title.clone(),
            description: if raw.description.is_empty() {
                content.clean_summary.clone()
            } else {
                raw.description.clone()
            },
            summary: Some(content.clean_summary.clone()),
            event_type: derive_event_type(extraction, &raw.title),
            severity: extraction.incident.severity_level(),
            event_date: extraction.incident.parsed_date().or(raw.event_date),
            records_affected: extraction.incident.records_affected,
            victim_organization_name: extraction.victim.organization.clone(),
            victim_organization_industry: extraction.victim.industry.clone(),
            attacking_entity_name: extraction
                .attacker
                .is_named()
                .then(|| extraction.attacker.name.clone()),
            attack_method: extraction
                .attacker
                .attack_vector
                .clone()
                .or_else(|| extraction.attacker.malware.clone()),
            is_australian_event: australian,
            is_specific_event: specific,
            confidence_score: decision.final_confidence,
            australian_relevance_score: extraction.australian_relevance.relevance_score,
        };

        let enriched_event_id = self.store.insert_enriched(&event, false).await?;

        if let Some(victim) = extraction.victim.organization.as_deref() {
            let kind = match extraction.victim.industry.as_deref() {
                Some("GOVERNMENT") => EntityKind::Government,
                Some("NON_PROFIT") => EntityKind::NotForProfit,
                _ => EntityKind::Business,
            };
            self.store
                .link_entity(
                    enriched_event_id,
                    victim,
                    kind,
                    extraction.victim.industry.as_deref(),
                    extraction.victim.is_australian,
                    "victim",
                    extraction.victim.confidence,
                )
                .await?;
        }
        if extraction.attacker.is_named() {
            self.store
                .link_entity(
                    enriched_event_id,
                    &extraction.attacker.name,
                    EntityKind::ThreatActor,
                    None,
                    false,
                    "attacker",
                    extraction.attacker.confidence,
                )
                .await?;
        }

        self.store.mark_raw_processed(raw.raw_event_id, None).await?;
        Ok(Some(enriched_event_id))
    }

    async fn finish_rejected(
        &self,
        raw: &RawEvent,
        mut audit: AuditRecord,
        started: Instant,
        error: Option<&str>,
    ) -> Result<PipelineOutcome, EnrichError> {
        audit.final_decision = Some(Decision::Reject.as_str().to_string());
        audit.final_confidence = Some(0.0);
        audit.completed_at = Some(Utc::now());
        audit.total_time_seconds = Some(started.elapsed().as_secs_f64());
        let audit_id = self.store.save_audit_trail(&audit).await?;
        self.store.mark_raw_processed(raw.raw_event_id, error).await?;
        Ok(PipelineOutcome {
            decision: Decision::Reject,
            final_confidence: 0.0,
            enriched_event_id: None,
            audit_id,
        })
    }
}

/// Derive the incident-type enum for storage. Structured attacker fields
/// win; the title decides otherwise.
fn derive_event_type(extraction: &Extraction, title: &str) -> CyberEventType {
    let vector = extraction
        .attacker
        .attack_vector
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    let malware = extraction
        .attacker
        .malware
        .as_deref()
        .unwrap_or("")
        .to_lowercase();

    if vector.contains("ransomware") || malware.contains("ransom") {
        CyberEventType::Ransomware
    } else if vector.contains("phishing") {
        CyberEventType::Phishing
    } else if vector.contains("ddos") || vector.contains("denial of service") {
        CyberEventType::DenialOfService
    } else if vector.contains("supply chain") {
        CyberEventType::SupplyChainAttack
    } else if vector.contains("insider") {
        CyberEventType::InsiderThreat
    } else if !malware.is_empty() {
        CyberEventType::Malware
    } else {
        CyberEventType::from_title(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::DisabledBrowser;
    use aucyber_core::{RawEventDraft, SourceType};
    use aucyber_llm::MockProvider;

    fn extraction_json(victim: &str, specific: bool, relevance: f64) -> String {
        serde_json::json!({
            "victim": {"organization": victim, "industry": "TELECOMMUNICATIONS",
                        "is_australian": true, "confidence": 0.9, "reasoning": "title"},
            "attacker": {"name": "Unknown", "type": "unknown", "malware": null,
                          "attack_vector": "credential stuffing", "confidence": 0.4,
                          "reasoning": "reported vector"},
            "incident": {"date": "2024-06-10", "discovery_date": null, "disclosure_date": null,
                          "severity": "high", "records_affected": 280000,
                          "data_types": ["personal_information"], "confidence": 0.85,
                          "reasoning": "reported"},
            "australian_relevance": {"is_australian_event": true, "relevance_score": relevance,
                                      "reasoning": "Australian ISP"},
            "specificity": {"is_specific_incident": specific, "reasoning": "named victim"},
            "multi_victim": {"has_multiple_victims": false, "victim_organizations": null,
                              "reasoning": "single"},
            "overall_confidence": 0.88,
            "extraction_notes": ""
        })
        .to_string()
    }

    fn fact_check_json() -> String {
        r#"{"is_real_organization": true, "incident_confirmed": true,
            "count_confirmed": true, "confidence": 0.9, "sources": []}"#
            .to_string()
    }

    async fn seeded_raw(store: &EventStore, with_content: bool) -> RawEvent {
        let draft = RawEventDraft {
            source_type: SourceType::CuratedList,
            source_event_id: None,
            title: "iiNet Data Breach Exposes 280,000 Customers".to_string(),
            description: "iiNet confirmed a data breach affecting customers.".to_string(),
            content: with_content.then(|| {
                "iiNet, owned by TPG Telecom, confirmed a data breach affecting 280,000 \
customers after attackers used stolen credentials against its order management \
system. The company said email addresses and phone numbers were exposed. "
                    .repeat(5)
            }),
            event_date: None,
            source_url: None,
            metadata: serde_json::Value::Null,
        };
        let id = store.add_raw_event(&draft).await.unwrap().unwrap();
        store.get_raw_event(id).await.unwrap()
    }

    fn pipeline_with(store: EventStore, llm_json: String) -> EnrichmentPipeline {
        let limiter = Arc::new(ServiceRateLimiter::with_default_limits());
        EnrichmentPipeline::new(
            ContentAcquisition::new(Arc::new(DisabledBrowser)),
            PrimaryExtractor::new(Arc::new(MockProvider::constant(&llm_json))),
            FactChecker::new(Arc::new(MockProvider::constant(&fact_check_json()))),
            store,
            limiter,
        )
    }

    #[tokio::test]
    async fn accepted_event_persists_with_entities_and_audit() {
        let store = EventStore::memory().await.unwrap();
        let raw = seeded_raw(&store, true).await;
        let pipeline = pipeline_with(store.clone(), extraction_json("iiNet", true, 0.95));

        let outcome = pipeline.enrich_event(&raw).await.unwrap();
        assert!(outcome.decision.accepts());
        let enriched_id = outcome.enriched_event_id.expect("persisted");

        // Exactly one audit row, raw marked processed, enriched queryable.
        assert_eq!(store.audit_count_for_raw(raw.raw_event_id).await.unwrap(), 1);
        assert!(store.get_raw_event(raw.raw_event_id).await.unwrap().is_processed);
        let hits = store
            .find_active_by_victim_and_date(
                "iiNet",
                chrono::NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            )
            .await
            .unwrap();
        assert!(hits.iter().any(|(id, _)| *id == enriched_id));
    }

    #[tokio::test]
    async fn content_failure_short_circuits_to_reject() {
        let store = EventStore::memory().await.unwrap();
        // No URL and only a one-line description: stage 1 cannot reach the
        // word floor.
        let raw = seeded_raw(&store, false).await;
        let pipeline = pipeline_with(store.clone(), extraction_json("iiNet", true, 0.95));

        let outcome = pipeline.enrich_event(&raw).await.unwrap();
        assert_eq!(outcome.decision, Decision::Reject);
        assert!(outcome.enriched_event_id.is_none());

        let after = store.get_raw_event(raw.raw_event_id).await.unwrap();
        assert!(after.is_processed);
        assert!(after.processing_error.is_some());
        assert_eq!(store.audit_count_for_raw(raw.raw_event_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unparsable_extraction_rejects_but_completes() {
        let store = EventStore::memory().await.unwrap();
        let raw = seeded_raw(&store, true).await;
        let pipeline = pipeline_with(store.clone(), "definitely not json".to_string());

        let outcome = pipeline.enrich_event(&raw).await.unwrap();
        assert_eq!(outcome.decision, Decision::Reject);
        assert_eq!(store.audit_count_for_raw(raw.raw_event_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn non_australian_accepts_are_not_persisted() {
        let store = EventStore::memory().await.unwrap();
        let raw = seeded_raw(&store, true).await;
        // High confidence but relevance below everything: penalties push to
        // reject, and even an accept would fail the flag guard.
        let pipeline = pipeline_with(store.clone(), extraction_json("Acme GmbH", true, 0.1));

        let outcome = pipeline.enrich_event(&raw).await.unwrap();
        assert!(outcome.enriched_event_id.is_none());
        assert!(store.get_raw_event(raw.raw_event_id).await.unwrap().is_processed);
    }

    #[test]
    fn event_type_prefers_structured_fields_over_title() {
        let mut extraction = Extraction::default();
        extraction.attacker.attack_vector = Some("Ransomware deployment".to_string());
        assert_eq!(
            derive_event_type(&extraction, "Acme suffers incident"),
            CyberEventType::Ransomware
        );

        let extraction = Extraction::default();
        assert_eq!(
            derive_event_type(&extraction, "Acme data breach exposes records"),
            CyberEventType::DataBreach
        );
    }
}
