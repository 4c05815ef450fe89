//! Stage 3: search-grounded fact checking.
//!
//! Up to four targeted verifications against live web sources, each with a
//! fixed prompt shape and JSON response schema. A check that never returns
//! a parsable result is recorded as unverified with confidence 0; the
//! pipeline never fails on fact-check errors.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use aucyber_llm::{classify, RetryPolicy, SearchProvider, ServiceRateLimiter};

use crate::extract::Extraction;

/// The four verification types and their aggregation weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckType {
    OrganizationExists,
    IncidentOccurred,
    AttackerAttribution,
    RecordsAffected,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::OrganizationExists => "organization_exists",
            CheckType::IncidentOccurred => "incident_occurred",
            CheckType::AttackerAttribution => "attacker_attribution",
            CheckType::RecordsAffected => "records_affected",
        }
    }

    /// Organization and incident existence dominate; attribution and
    /// record counts are often uncertain even in good reporting.
    pub fn weight(&self) -> f64 {
        match self {
            CheckType::OrganizationExists => 0.4,
            CheckType::IncidentOccurred => 0.4,
            CheckType::AttackerAttribution => 0.1,
            CheckType::RecordsAffected => 0.1,
        }
    }
}

/// One verification outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_type: CheckType,
    pub query: String,
    pub verified: bool,
    pub confidence: f64,
    pub details: serde_json::Value,
}

impl CheckResult {
    fn unverified(check_type: CheckType, query: String, error: &str) -> Self {
        Self {
            check_type,
            query,
            verified: false,
            confidence: 0.0,
            details: serde_json::json!({"error": error}),
        }
    }
}

/// Stage-3 output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactCheckResult {
    pub checks_performed: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub details: Vec<CheckResult>,
    pub overall_verification_confidence: f64,
}

impl FactCheckResult {
    pub fn pass_rate(&self) -> Option<f64> {
        (self.checks_performed > 0)
            .then(|| self.checks_passed as f64 / self.checks_performed as f64)
    }
}

/// Stage-3 service.
pub struct FactChecker {
    search: Arc<dyn SearchProvider>,
    policy: RetryPolicy,
    rate_limiter: Option<Arc<ServiceRateLimiter>>,
}

impl FactChecker {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self {
            search,
            policy: RetryPolicy::default(),
            rate_limiter: None,
        }
    }

    /// Gate every verification call through the shared limiter.
    pub fn with_rate_limiter(mut self, limiter: Arc<ServiceRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Run every applicable verification for an extraction.
    pub async fn fact_check(&self, extraction: &Extraction) -> FactCheckResult {
        let mut checks = Vec::new();
        let victim = extraction.victim.organization.as_deref();

        if let Some(org) = victim {
            checks.push(self.verify_organization_exists(org).await);
        }

        if let (Some(org), Some(date)) = (victim, extraction.incident.date.as_deref()) {
            checks.push(self.verify_incident_occurred(org, date).await);
        }

        if extraction.attacker.is_named() {
            checks.push(
                self.verify_attacker_attribution(
                    &extraction.attacker.name,
                    victim.unwrap_or("the named organisation"),
                )
                .await,
            );
        }

        if let Some(records) = extraction.incident.records_affected {
            checks.push(
                self.verify_records_count(victim.unwrap_or("the named organisation"), records)
                    .await,
            );
        }

        let checks_passed = checks.iter().filter(|c| c.verified).count();
        let checks_failed = checks.len() - checks_passed;
        let overall = verification_confidence(&checks);

        tracing::info!(
            performed = checks.len(),
            passed = checks_passed,
            confidence = overall,
            "Fact-checking complete"
        );

        FactCheckResult {
            checks_performed: checks.len(),
            checks_passed,
            checks_failed,
            details: checks,
            overall_verification_confidence: overall,
        }
    }

    async fn verify_organization_exists(&self, org_name: &str) -> CheckResult {
        let prompt = format!(
            r#"Is "{org_name}" a real, specific organization (not a generic description)?

Search for information about this organization and answer with JSON:
{{"is_real_organization": true or false, "organization_type": "company|government|nonprofit|university|other|generic", "country": "primary country or null", "confidence": 0.0 to 1.0, "reasoning": "brief explanation", "sources": ["URL1"]}}

Rules: is_real_organization is FALSE for generic descriptions like "Australian IT company" and for person names. TRUE only for a confirmable specific legal entity. If you find no information, confidence must be below 0.3."#
        );
        self.run_check(CheckType::OrganizationExists, org_name.to_string(), &prompt, |v| {
            v["is_real_organization"] == serde_json::json!(true)
        })
        .await
    }

    async fn verify_incident_occurred(&self, org_name: &str, incident_date: &str) -> CheckResult {
        let prompt = format!(
            r#"Did "{org_name}" experience a cybersecurity incident (data breach, ransomware attack, cyber attack) on or around {incident_date}?

Search reliable news sources and answer with JSON:
{{"incident_confirmed": true or false, "actual_date": "YYYY-MM-DD or null", "incident_type": "type or null", "sources": ["URL1", "URL2"], "confidence": 0.0 to 1.0, "reasoning": "brief explanation citing sources"}}

Rules: confirm only with credible sources; a date within 30 days still confirms (report actual_date); prefer Australian news and cyber-security outlets; no sources found means confidence below 0.3."#
        );
        self.run_check(
            CheckType::IncidentOccurred,
            format!("{org_name} cyber incident {incident_date}"),
            &prompt,
            |v| v["incident_confirmed"] == serde_json::json!(true),
        )
        .await
    }

    async fn verify_attacker_attribution(&self, attacker: &str, victim: &str) -> CheckResult {
        let prompt = format!(
            r#"Has the threat actor "{attacker}" been credibly linked to a cyber attack on "{victim}"?

Search for attribution information and answer with JSON:
{{"attribution_confirmed": true or false, "attribution_confidence": "confirmed|suspected|unverified", "sources": ["URL1"], "confidence": 0.0 to 1.0, "reasoning": "brief explanation"}}

Rules: confirmed only when multiple credible sources agree; attribution claims are often uncertain; no sources means confidence below 0.3."#
        );
        self.run_check(
            CheckType::AttackerAttribution,
            format!("{attacker} attack on {victim}"),
            &prompt,
            |v| v["attribution_confirmed"] == serde_json::json!(true),
        )
        .await
    }

    async fn verify_records_count(&self, org_name: &str, records: i64) -> CheckResult {
        let prompt = format!(
            r#"In the "{org_name}" cyber incident, were approximately {records} records/people affected?

Search reliable sources and answer with JSON:
{{"count_confirmed": true or false, "actual_count": integer or null, "count_range": "range or null", "sources": ["URL1"], "confidence": 0.0 to 1.0, "reasoning": "brief explanation citing sources"}}

Rules: count_confirmed is TRUE when the verified number is within 20% of the stated one; report actual_count when it differs more; prefer official statements and regulatory filings."#
        );
        let query = format!("{org_name} breach {records} records");
        let result = self
            .run_check(CheckType::RecordsAffected, query, &prompt, |v| {
                v["count_confirmed"] == serde_json::json!(true)
            })
            .await;

        // When the verification supplies its own count, the 20% band is the
        // deciding rule regardless of the model's claim.
        if let Some(actual) = result.details["actual_count"].as_i64() {
            if records > 0 {
                let variance = (records - actual).abs() as f64 / records as f64;
                let verified = variance <= 0.20;
                return CheckResult { verified, ..result };
            }
        }
        result
    }

    async fn run_check(
        &self,
        check_type: CheckType,
        query: String,
        prompt: &str,
        verified_by: impl Fn(&serde_json::Value) -> bool,
    ) -> CheckResult {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(limiter) = &self.rate_limiter {
                limiter.wait(self.search.name()).await;
            }
            match self.search.search_json(prompt).await {
                Ok(value) => {
                    let confidence = value["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
                    return CheckResult {
                        check_type,
                        query,
                        verified: verified_by(&value),
                        confidence,
                        details: value,
                    };
                }
                Err(error) => {
                    let retryable = classify(&error).is_retryable();
                    if !retryable || attempt > self.policy.max_retries {
                        tracing::warn!(
                            check = check_type.as_str(),
                            error = %error,
                            "Fact check failed, recording as unverified"
                        );
                        return CheckResult::unverified(check_type, query, &error.to_string());
                    }
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                }
            }
        }
    }
}

/// Weighted verification confidence: passed checks contribute their full
/// confidence; failed checks contribute `0.5 * (1 - confidence)` of their
/// weight.
pub fn verification_confidence(checks: &[CheckResult]) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for check in checks {
        let weight = check.check_type.weight();
        if check.verified {
            weighted_sum += weight * check.confidence;
        } else {
            weighted_sum += weight * (1.0 - check.confidence) * 0.5;
        }
        total_weight += weight;
    }
    weighted_sum / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{AttackerInfo, IncidentInfo, VictimInfo};
    use aucyber_llm::{MockProvider, ScriptedOutcome};

    fn extraction_with_victim_and_date() -> Extraction {
        Extraction {
            victim: VictimInfo {
                organization: Some("Medibank Private".to_string()),
                confidence: 0.9,
                ..Default::default()
            },
            incident: IncidentInfo {
                date: Some("2022-10-13".to_string()),
                records_affected: Some(9_700_000),
                ..Default::default()
            },
            attacker: AttackerInfo {
                name: "REvil".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn all_four_checks_run_when_fields_present() {
        let search = Arc::new(MockProvider::constant(
            r#"{"is_real_organization": true, "incident_confirmed": true,
                "attribution_confirmed": true, "count_confirmed": true,
                "confidence": 0.9, "sources": []}"#,
        ));
        let checker = FactChecker::new(search);
        let result = checker.fact_check(&extraction_with_victim_and_date()).await;
        assert_eq!(result.checks_performed, 4);
        assert_eq!(result.checks_passed, 4);
        assert!(result.overall_verification_confidence > 0.85);
    }

    #[tokio::test]
    async fn unknown_attacker_and_missing_fields_skip_checks() {
        let extraction = Extraction {
            victim: VictimInfo {
                organization: Some("Acme".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let search = Arc::new(MockProvider::constant(
            r#"{"is_real_organization": true, "confidence": 0.8}"#,
        ));
        let checker = FactChecker::new(search);
        let result = checker.fact_check(&extraction).await;
        // Only the organization-existence check applies.
        assert_eq!(result.checks_performed, 1);
    }

    #[tokio::test]
    async fn records_check_applies_twenty_percent_band() {
        // Model says confirmed, but its own actual_count is 40% off.
        let script = vec![
            ScriptedOutcome::ok(r#"{"is_real_organization": true, "confidence": 0.9}"#),
            ScriptedOutcome::ok(r#"{"incident_confirmed": true, "confidence": 0.9}"#),
            ScriptedOutcome::ok(
                r#"{"count_confirmed": true, "actual_count": 5800000, "confidence": 0.8}"#,
            ),
        ];
        let mut extraction = extraction_with_victim_and_date();
        extraction.attacker = AttackerInfo::default();
        let checker = FactChecker::new(Arc::new(MockProvider::scripted(script)));
        let result = checker.fact_check(&extraction).await;
        let records_check = result
            .details
            .iter()
            .find(|c| c.check_type == CheckType::RecordsAffected)
            .unwrap();
        assert!(!records_check.verified);
    }

    #[tokio::test]
    async fn provider_failure_records_unverified_with_zero_confidence() {
        let checker = FactChecker::new(Arc::new(MockProvider::scripted(vec![
            ScriptedOutcome::auth_error(),
        ])));
        let extraction = Extraction {
            victim: VictimInfo {
                organization: Some("Acme".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let result = checker.fact_check(&extraction).await;
        assert_eq!(result.checks_performed, 1);
        assert_eq!(result.checks_failed, 1);
        assert_eq!(result.details[0].confidence, 0.0);
    }

    #[test]
    fn failed_checks_contribute_half_inverse_confidence() {
        let checks = vec![
            CheckResult {
                check_type: CheckType::OrganizationExists,
                query: "x".into(),
                verified: true,
                confidence: 1.0,
                details: serde_json::Value::Null,
            },
            CheckResult {
                check_type: CheckType::IncidentOccurred,
                query: "x".into(),
                verified: false,
                confidence: 0.8,
                details: serde_json::Value::Null,
            },
        ];
        // (0.4*1.0 + 0.4*(1-0.8)*0.5) / 0.8 = (0.4 + 0.04) / 0.8 = 0.55
        let confidence = verification_confidence(&checks);
        assert!((confidence - 0.55).abs() < 1e-9);
    }
}
