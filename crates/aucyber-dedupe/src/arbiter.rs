//! Arbiters for borderline similarity judgments.
//!
//! When the algorithmic score lands in the uncertain band, a
//! search-grounded arbiter gets the first call; if it is unavailable or
//! unsure, a conservative LLM arbiter that requires multiple independent
//! anchors decides instead.

use async_trait::async_trait;
use std::sync::Arc;

use aucyber_core::EnrichedWithRaw;
use aucyber_llm::{LlmError, LlmProvider, LlmRequest, SearchProvider};

/// An arbiter's judgment on a pair.
#[derive(Debug, Clone)]
pub struct ArbiterVerdict {
    pub same_incident: bool,
    pub confidence: f64,
    pub reasoning: String,
}

/// Yes/no "same incident" judgment over two event records.
#[async_trait]
pub trait DuplicateArbiter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(
        &self,
        a: &EnrichedWithRaw,
        b: &EnrichedWithRaw,
    ) -> Result<ArbiterVerdict, LlmError>;
}

fn describe(event: &EnrichedWithRaw) -> String {
    format!(
        "Title: {}\nDate: {}\nEntity: {}\nDescription: {}",
        event.title,
        event
            .event_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        event
            .victim_organization_name
            .as_deref()
            .unwrap_or("unknown"),
        event.description.chars().take(300).collect::<String>(),
    )
}

/// Search-grounded arbiter: asks for a judgment backed by live sources.
pub struct SearchArbiter {
    search: Arc<dyn SearchProvider>,
}

impl SearchArbiter {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl DuplicateArbiter for SearchArbiter {
    fn name(&self) -> &'static str {
        "search_arbiter"
    }

    async fn check(
        &self,
        a: &EnrichedWithRaw,
        b: &EnrichedWithRaw,
    ) -> Result<ArbiterVerdict, LlmError> {
        let prompt = format!(
            "Are these two records about the SAME cyber incident?\n\n\
Event 1:\n{}\n\nEvent 2:\n{}\n\n\
Search for coverage of both and answer with ONLY a JSON object:\n\
{{\"are_same_incident\": true or false, \"confidence\": 0.0 to 1.0, \"reasoning\": \"one sentence\"}}\n\n\
Same incident means the same organization suffered the same compromise. Two \
attacks on the same organization at clearly different times, or via clearly \
different methods, are different incidents.",
            describe(a),
            describe(b),
        );

        let value = self.search.search_json(&prompt).await?;
        Ok(ArbiterVerdict {
            same_incident: value["are_same_incident"] == serde_json::json!(true),
            confidence: value["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
            reasoning: value["reasoning"].as_str().unwrap_or_default().to_string(),
        })
    }
}

/// Conservative LLM arbiter: answers YES only when the entities resolve to
/// the same organization and at least two independent anchors align.
pub struct LlmArbiter {
    llm: Arc<dyn LlmProvider>,
}

impl LlmArbiter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DuplicateArbiter for LlmArbiter {
    fn name(&self) -> &'static str {
        "llm_arbiter"
    }

    async fn check(
        &self,
        a: &EnrichedWithRaw,
        b: &EnrichedWithRaw,
    ) -> Result<ArbiterVerdict, LlmError> {
        let prompt = format!(
            "You are a careful cyber-incident deduplicator. Be conservative: if not clearly the same incident, answer NO.\n\n\
Decide whether the two event records below describe the same cyber incident.\n\n\
Event 1:\n{}\n\nEvent 2:\n{}\n\n\
Decision procedure:\n\
1. Entity resolution (hard gate): if the organizations differ, answer NO unless the text explicitly equates them. Shared vendors or platforms do not make entities equal.\n\
2. Extract anchors: incident type and TTPs, threat actor/malware/CVE, affected system or site, data type and scale, regulator or notification identifiers, timeframe.\n\
3. Answer YES only if the organization matches AND at least two independent anchors align: (a) same incident type with similar TTPs or actor, (b) same affected system/site/product, (c) same data type with similar scale, (d) same regulator ID or uniquely identifying detail.\n\
4. Date consistency: incident windows must overlap or be plausibly the same disclosure.\n\
Disqualifiers (any means NO): different legal entities; clearly different incident types or actors; clearly different data types or scales; one is a campaign or vendor compromise and the other a specific customer impact with no explicit link.\n\n\
Return only a single token: YES or NO. If uncertain, return NO.",
            describe(a),
            describe(b),
        );

        let request = LlmRequest::verdict(
            "You are an expert at identifying duplicate cyber security incidents from news reports.",
            &prompt,
        );
        let response = self.llm.complete(request).await?;
        let answer = response.content.trim().to_uppercase();
        let same_incident = answer.starts_with("YES");
        Ok(ArbiterVerdict {
            same_incident,
            // A conservative prompt makes YES informative and NO the
            // default; both are treated as decisive by the caller.
            confidence: 0.75,
            reasoning: format!("llm verdict: {answer}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aucyber_llm::MockProvider;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn event(title: &str) -> EnrichedWithRaw {
        EnrichedWithRaw {
            enriched_event_id: Uuid::new_v4(),
            raw_event_id: Uuid::new_v4(),
            title: title.to_string(),
            description: "desc".to_string(),
            summary: None,
            event_type: aucyber_core::CyberEventType::DataBreach,
            severity: aucyber_core::EventSeverity::High,
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
            created_at: chrono::Utc::now(),
            source_url: None,
            source_type: aucyber_core::SourceType::WebSearch,
            discovered_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn search_arbiter_parses_structured_verdict() {
        let arbiter = SearchArbiter::new(Arc::new(MockProvider::constant(
            r#"{"are_same_incident": true, "confidence": 0.85, "reasoning": "same breach"}"#,
        )));
        let verdict = arbiter.check(&event("a"), &event("b")).await.unwrap();
        assert!(verdict.same_incident);
        assert!((verdict.confidence - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn llm_arbiter_reads_single_token() {
        let yes = LlmArbiter::new(Arc::new(MockProvider::constant("YES")));
        assert!(yes.check(&event("a"), &event("b")).await.unwrap().same_incident);

        let no = LlmArbiter::new(Arc::new(MockProvider::constant("NO")));
        assert!(!no.check(&event("a"), &event("b")).await.unwrap().same_incident);
    }
}
