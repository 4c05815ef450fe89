//! Group formation and merge.
//!
//! A linear sweep over events sorted by creation time: each ungrouped
//! event starts a group and absorbs every later ungrouped event the
//! pairwise judgment accepts. O(n^2) worst case, acceptable at corpus
//! scale, and deterministic for a stable input ordering.

use uuid::Uuid;

use aucyber_core::{ContributionType, EnrichedWithRaw, EventSource};
use aucyber_persist::{CanonicalWrite, MappingRow};

use crate::arbiter::DuplicateArbiter;
use crate::entity::{entity_similarity, extract_entity_from_title};
use crate::similarity::{are_both_generic_summaries, are_different_incidents, content_similarity};
use crate::text::sequence_ratio;

const ENTITY_SIMILARITY_THRESHOLD: f64 = 0.70;
const ARBITER_BAND_LOW: f64 = 0.50;
const ARBITER_BAND_HIGH: f64 = 0.85;
const ARBITER_CONFIDENCE_FLOOR: f64 = 0.7;
const LLM_ARBITER_SCORE_FLOOR: f64 = 0.60;
const ALGORITHM_VERSION: &str = "v2.0";
const DEDUPLICATION_METHOD: &str = "entity_anchored_hybrid";

/// Run counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DedupeStats {
    pub input_events: usize,
    pub groups: usize,
    pub merged_groups: usize,
    pub arbiter_calls: usize,
}

/// The deduplication engine. Arbiters are optional; without them the
/// weighted score decides borderline pairs by threshold.
pub struct DedupeEngine {
    search_arbiter: Option<Box<dyn DuplicateArbiter>>,
    llm_arbiter: Option<Box<dyn DuplicateArbiter>>,
}

impl DedupeEngine {
    pub fn new(
        search_arbiter: Option<Box<dyn DuplicateArbiter>>,
        llm_arbiter: Option<Box<dyn DuplicateArbiter>>,
    ) -> Self {
        Self {
            search_arbiter,
            llm_arbiter,
        }
    }

    /// Rule-only engine (tests, offline runs).
    pub fn rule_based() -> Self {
        Self::new(None, None)
    }

    fn primary_entity(event: &EnrichedWithRaw) -> Option<String> {
        event
            .victim_organization_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| extract_entity_from_title(&event.title))
    }

    /// Pairwise similarity judgment.
    pub async fn is_similar(
        &self,
        a: &EnrichedWithRaw,
        b: &EnrichedWithRaw,
        stats: &mut DedupeStats,
    ) -> bool {
        // Entity gate. Identical titles bypass it.
        if a.title != b.title {
            let (Some(entity_a), Some(entity_b)) =
                (Self::primary_entity(a), Self::primary_entity(b))
            else {
                return false;
            };
            let similarity = entity_similarity(&entity_a, &entity_b);
            if similarity < ENTITY_SIMILARITY_THRESHOLD {
                tracing::debug!(
                    entity_a = %entity_a,
                    entity_b = %entity_b,
                    similarity,
                    "Entity gate rejected pair"
                );
                return false;
            }
        }

        if are_both_generic_summaries(a, b) {
            return true;
        }
        if are_different_incidents(a, b) {
            return false;
        }

        let breakdown = content_similarity(a, b);
        tracing::debug!(
            score = breakdown.score,
            threshold = breakdown.threshold,
            title_sim = breakdown.title_similarity,
            key_terms = breakdown.key_terms_similarity,
            date_factor = breakdown.date_factor,
            "Pairwise score"
        );

        // Borderline band: hand the call to an arbiter.
        if (ARBITER_BAND_LOW..ARBITER_BAND_HIGH).contains(&breakdown.score) {
            if let Some(arbiter) = &self.search_arbiter {
                stats.arbiter_calls += 1;
                match arbiter.check(a, b).await {
                    Ok(verdict) if verdict.confidence >= ARBITER_CONFIDENCE_FLOOR => {
                        tracing::info!(
                            arbiter = arbiter.name(),
                            same = verdict.same_incident,
                            confidence = verdict.confidence,
                            "Arbiter decided borderline pair"
                        );
                        return verdict.same_incident;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(error = %error, "Search arbiter failed, trying LLM");
                    }
                }
            }
            if breakdown.score >= LLM_ARBITER_SCORE_FLOOR {
                if let Some(arbiter) = &self.llm_arbiter {
                    stats.arbiter_calls += 1;
                    if let Ok(verdict) = arbiter.check(a, b).await {
                        if verdict.same_incident {
                            tracing::info!(
                                arbiter = arbiter.name(),
                                "LLM arbiter merged borderline pair"
                            );
                            return true;
                        }
                    }
                }
            }
        }

        breakdown.passes()
    }

    /// Group formation: linear sweep, deterministic for a stable ordering.
    /// Returns groups of indices into `events`.
    pub async fn group_events(
        &self,
        events: &[EnrichedWithRaw],
        stats: &mut DedupeStats,
    ) -> Vec<Vec<usize>> {
        stats.input_events = events.len();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut processed = vec![false; events.len()];

        for i in 0..events.len() {
            if processed[i] {
                continue;
            }
            let mut group = vec![i];
            processed[i] = true;
            for j in (i + 1)..events.len() {
                if processed[j] {
                    continue;
                }
                if self.is_similar(&events[i], &events[j], stats).await {
                    group.push(j);
                    processed[j] = true;
                }
            }
            groups.push(group);
        }

        stats.groups = groups.len();
        stats.merged_groups = groups.iter().filter(|g| g.len() > 1).count();
        groups
    }

    /// Merge one group into its canonical write.
    pub fn merge_group(&self, group: &[&EnrichedWithRaw]) -> CanonicalWrite {
        let master = group
            .iter()
            .max_by(|a, b| {
                a.confidence_score
                    .partial_cmp(&b.confidence_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("groups are non-empty");

        let longest_title = group
            .iter()
            .map(|e| e.title.as_str())
            .max_by_key(|t| t.len())
            .unwrap_or(&master.title)
            .to_string();
        let longest_description = group
            .iter()
            .map(|e| e.description.as_str())
            .max_by_key(|d| d.len())
            .unwrap_or(&master.description)
            .to_string();

        // Source union keyed by URL, first seen wins.
        let mut seen_urls = std::collections::HashSet::new();
        let mut sources = Vec::new();
        for event in group {
            if let Some(source_url) = &event.source_url {
                if seen_urls.insert(source_url.clone()) {
                    sources.push(EventSource {
                        source_url: source_url.clone(),
                        source_type: event.source_type,
                        credibility_score: 0.8,
                        content_snippet: None,
                        discovered_at: Some(event.discovered_at),
                    });
                }
            }
        }

        // Best event date: earliest specific date beats earliest
        // first-of-month fallback beats the master's date.
        let dates: Vec<chrono::NaiveDate> = group.iter().filter_map(|e| e.event_date).collect();
        let specific: Option<chrono::NaiveDate> = dates
            .iter()
            .filter(|d| chrono::Datelike::day(*d) != 1)
            .min()
            .copied();
        let fallback: Option<chrono::NaiveDate> = dates
            .iter()
            .filter(|d| chrono::Datelike::day(*d) == 1)
            .min()
            .copied();
        let event_date = specific.or(fallback).or(master.event_date);

        // Victim and attacker attributes: the master leads, first seen
        // fills gaps.
        let first_some = |pick: fn(&EnrichedWithRaw) -> Option<String>| -> Option<String> {
            pick(master).or_else(|| group.iter().find_map(|e| pick(e)))
        };
        let victim_name = first_some(|e| e.victim_organization_name.clone());
        let victim_industry = first_some(|e| e.victim_organization_industry.clone());
        let attacker = first_some(|e| e.attacking_entity_name.clone());
        let attack_method = first_some(|e| e.attack_method.clone());
        let records_affected = master
            .records_affected
            .or_else(|| group.iter().find_map(|e| e.records_affected));

        let confidence_boost = 0.1 * (sources.len().min(3) as f64);
        let confidence_score = (master.confidence_score + confidence_boost).min(1.0);

        // Mean pairwise title similarity inside the cluster.
        let mut similarities = Vec::new();
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                similarities.push(sequence_ratio(
                    &group[i].title.to_lowercase(),
                    &group[j].title.to_lowercase(),
                ));
            }
        }
        let similarity_score = if similarities.is_empty() {
            1.0
        } else {
            similarities.iter().sum::<f64>() / similarities.len() as f64
        };

        let master_id = master.enriched_event_id;
        let mut supporting_assigned = 0;
        let mappings = group
            .iter()
            .map(|event| {
                let contribution_type = if event.enriched_event_id == master_id {
                    ContributionType::Primary
                } else if supporting_assigned < 2 {
                    supporting_assigned += 1;
                    ContributionType::Supporting
                } else {
                    ContributionType::Duplicate
                };
                MappingRow {
                    raw_event_id: event.raw_event_id,
                    enriched_event_id: event.enriched_event_id,
                    contribution_type,
                    similarity_to_master: sequence_ratio(
                        &master.title.to_lowercase(),
                        &event.title.to_lowercase(),
                    ),
                    weight: 1.0,
                }
            })
            .collect();

        CanonicalWrite {
            master_enriched_event_id: master_id,
            title: longest_title,
            description: longest_description,
            summary: master.summary.clone(),
            event_type: master.event_type,
            severity: master.severity,
            event_date,
            records_affected,
            victim_organization_name: victim_name,
            victim_organization_industry: victim_industry,
            attacking_entity_name: attacker,
            attack_method,
            is_australian_event: master.is_australian_event,
            is_specific_event: master.is_specific_event,
            confidence_score,
            australian_relevance_score: master.australian_relevance_score,
            similarity_score,
            deduplication_method: DEDUPLICATION_METHOD.to_string(),
            mappings,
            sources,
            algorithm_version: ALGORITHM_VERSION.to_string(),
        }
    }

    /// Full run: group, then merge each group.
    pub async fn deduplicate(
        &self,
        events: &[EnrichedWithRaw],
    ) -> (Vec<CanonicalWrite>, DedupeStats) {
        let mut stats = DedupeStats::default();
        let groups = self.group_events(events, &mut stats).await;
        let writes = groups
            .iter()
            .map(|group| {
                let members: Vec<&EnrichedWithRaw> = group.iter().map(|&i| &events[i]).collect();
                self.merge_group(&members)
            })
            .collect();
        (writes, stats)
    }
}

/// Superseded contributors: every non-master enriched event across writes.
pub fn superseded_ids(writes: &[CanonicalWrite]) -> Vec<Uuid> {
    writes
        .iter()
        .flat_map(|write| {
            write
                .mappings
                .iter()
                .filter(|m| m.enriched_event_id != write.master_enriched_event_id)
                .map(|m| m.enriched_event_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aucyber_llm::LlmError;
    use chrono::NaiveDate;

    fn event(
        title: &str,
        description: &str,
        victim: Option<&str>,
        date: Option<NaiveDate>,
        confidence: f64,
        url: &str,
    ) -> EnrichedWithRaw {
        EnrichedWithRaw {
            enriched_event_id: Uuid::new_v4(),
            raw_event_id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.to_string(),
            summary: None,
            event_type: aucyber_core::CyberEventType::DataBreach,
            severity: aucyber_core::EventSeverity::High,
            event_date: date,
            records_affected: None,
            victim_organization_name: victim.map(|v| v.to_string()),
            victim_organization_industry: Some("FINANCIAL_SERVICES".to_string()),
            attacking_entity_name: None,
            attack_method: None,
            is_australian_event: true,
            is_specific_event: true,
            confidence_score: confidence,
            australian_relevance_score: 0.9,
            created_at: chrono::Utc::now(),
            source_url: Some(url.to_string()),
            source_type: aucyber_core::SourceType::WebSearch,
            discovered_at: chrono::Utc::now(),
        }
    }

    fn anz_pair() -> (EnrichedWithRaw, EnrichedWithRaw) {
        let description_a = "ANZ confirmed customer names, email addresses and phone numbers \
were exposed in the data breach. Personal details of customers were compromised.";
        let description_b = "The bank disclosed that a breach exposed customer names, email \
addresses and phone numbers. Personal details of customers were compromised.";
        (
            event(
                "ANZ Bank confirms data leak",
                description_a,
                Some("ANZ Bank"),
                NaiveDate::from_ymd_opt(2024, 6, 3),
                0.9,
                "https://example.com/a",
            ),
            event(
                "Australia and New Zealand Banking Group discloses breach",
                description_b,
                Some("Australia and New Zealand Banking Group"),
                NaiveDate::from_ymd_opt(2024, 6, 14),
                0.8,
                "https://example.com/b",
            ),
        )
    }

    #[tokio::test]
    async fn alias_pair_merges_into_one_canonical_event() {
        let (a, b) = anz_pair();
        let engine = DedupeEngine::rule_based();
        let (writes, stats) = engine.deduplicate(&[a.clone(), b.clone()]).await;

        assert_eq!(writes.len(), 1);
        assert_eq!(stats.merged_groups, 1);
        let write = &writes[0];
        assert_eq!(write.master_enriched_event_id, a.enriched_event_id);
        // Longest title wins.
        assert_eq!(write.title, b.title);
        assert_eq!(write.mappings.len(), 2);
        assert_eq!(write.sources.len(), 2);
        // Master confidence 0.9 + 0.1 * min(2, 3)
        assert!((write.confidence_score - 1.0).abs() < 1e-9);

        let superseded = superseded_ids(&writes);
        assert_eq!(superseded, vec![b.enriched_event_id]);
    }

    #[tokio::test]
    async fn different_entities_never_merge() {
        let a = event(
            "Optus suffers data breach",
            "Customer data exposed at Optus.",
            Some("Optus"),
            NaiveDate::from_ymd_opt(2024, 6, 1),
            0.9,
            "https://example.com/a",
        );
        let b = event(
            "Medibank Private discloses breach",
            "Customer data exposed at Medibank.",
            Some("Medibank Private"),
            NaiveDate::from_ymd_opt(2024, 6, 1),
            0.9,
            "https://example.com/b",
        );
        let engine = DedupeEngine::rule_based();
        let (writes, _) = engine.deduplicate(&[a, b]).await;
        assert_eq!(writes.len(), 2);
    }

    #[tokio::test]
    async fn missing_entity_with_different_titles_rejects() {
        let a = event(
            "lessons from a difficult year",
            "general commentary",
            None,
            None,
            0.5,
            "https://example.com/a",
        );
        let b = event(
            "thoughts on industry resilience",
            "general commentary",
            None,
            None,
            0.5,
            "https://example.com/b",
        );
        let engine = DedupeEngine::rule_based();
        let mut stats = DedupeStats::default();
        assert!(!engine.is_similar(&a, &b, &mut stats).await);
    }

    struct FixedArbiter(bool, f64);

    #[async_trait]
    impl DuplicateArbiter for FixedArbiter {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn check(
            &self,
            _a: &EnrichedWithRaw,
            _b: &EnrichedWithRaw,
        ) -> Result<ArbiterVerdict, LlmError> {
            Ok(ArbiterVerdict {
                same_incident: self.0,
                confidence: self.1,
                reasoning: "scripted".to_string(),
            })
        }
    }

    use crate::arbiter::ArbiterVerdict;

    #[tokio::test]
    async fn confident_arbiter_overrides_borderline_score() {
        let (a, b) = anz_pair();
        // The rule-based score for this pair sits in the arbiter band; a
        // confident DIFFERENT verdict must split it.
        let engine = DedupeEngine::new(Some(Box::new(FixedArbiter(false, 0.9))), None);
        let mut stats = DedupeStats::default();
        assert!(!engine.is_similar(&a, &b, &mut stats).await);
        assert_eq!(stats.arbiter_calls, 1);

        // An unsure arbiter is ignored and the threshold decides.
        let engine = DedupeEngine::new(Some(Box::new(FixedArbiter(false, 0.4))), None);
        let mut stats = DedupeStats::default();
        assert!(engine.is_similar(&a, &b, &mut stats).await);
    }

    #[tokio::test]
    async fn merge_prefers_earliest_specific_date() {
        let (mut a, mut b) = anz_pair();
        a.event_date = NaiveDate::from_ymd_opt(2024, 6, 1); // first of month
        b.event_date = NaiveDate::from_ymd_opt(2024, 6, 14);
        let engine = DedupeEngine::rule_based();
        let write = engine.merge_group(&[&a, &b]);
        assert_eq!(write.event_date, NaiveDate::from_ymd_opt(2024, 6, 14));

        b.event_date = NaiveDate::from_ymd_opt(2024, 7, 1);
        let write = engine.merge_group(&[&a, &b]);
        // Only first-of-month dates: earliest wins.
        assert_eq!(write.event_date, NaiveDate::from_ymd_opt(2024, 6, 1));
    }

    #[tokio::test]
    async fn grouping_is_deterministic_over_reruns() {
        let (a, b) = anz_pair();
        let c = event(
            "Qantas contact centre incident",
            "Unrelated airline incident.",
            Some("Qantas"),
            NaiveDate::from_ymd_opt(2024, 5, 2),
            0.7,
            "https://example.com/c",
        );
        let events = vec![a, b, c];
        let engine = DedupeEngine::rule_based();
        let (first, _) = engine.deduplicate(&events).await;
        let (second, _) = engine.deduplicate(&events).await;
        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.master_enriched_event_id, y.master_enriched_event_id);
            assert_eq!(x.mappings.len(), y.mappings.len());
        }
    }
}
