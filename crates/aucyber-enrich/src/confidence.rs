//! Stage 5: confidence aggregation and the final decision.
//!
//! Weighted combination of the four stage confidences, then multiplicative
//! penalties applied in a fixed order. The decision bundle records every
//! stage confidence and every applied penalty so the final number can be
//! recomputed from the audit row alone.

use serde::{Deserialize, Serialize};

use crate::content::AcquiredContent;
use crate::extract::Extraction;
use crate::factcheck::FactCheckResult;
use crate::validate::ValidationResult;

/// Final pipeline decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    AutoAccept,
    AcceptWithWarning,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoAccept => "AUTO_ACCEPT",
            Decision::AcceptWithWarning => "ACCEPT_WITH_WARNING",
            Decision::Reject => "REJECT",
        }
    }

    pub fn accepts(&self) -> bool {
        !matches!(self, Decision::Reject)
    }
}

/// One multiplicative penalty that fired.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedPenalty {
    pub name: &'static str,
    pub factor: f64,
}

/// The four stage confidences feeding the weighted average.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageConfidences {
    pub extraction: f64,
    pub fact_check: f64,
    pub validation: f64,
    pub source_reliability: f64,
}

/// Stage-5 output.
#[derive(Debug, Clone, Serialize)]
pub struct FinalDecision {
    pub decision: Decision,
    pub final_confidence: f64,
    pub stage_confidences: StageConfidences,
    pub applied_penalties: Vec<AppliedPenalty>,
    pub checks_performed: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
}

const WEIGHT_EXTRACTION: f64 = 0.30;
const WEIGHT_FACT_CHECK: f64 = 0.30;
const WEIGHT_VALIDATION: f64 = 0.20;
const WEIGHT_SOURCE: f64 = 0.20;

const AUTO_ACCEPT_THRESHOLD: f64 = 0.80;
const ACCEPT_THRESHOLD: f64 = 0.50;

/// Combine stage outputs into the final decision.
pub fn aggregate_confidence(
    extraction: &Extraction,
    fact_check: &FactCheckResult,
    validation: &ValidationResult,
    content: &AcquiredContent,
    event_title: Option<&str>,
) -> FinalDecision {
    let stages = StageConfidences {
        extraction: extraction.overall_confidence,
        fact_check: fact_check.overall_verification_confidence,
        validation: validation.validation_confidence,
        source_reliability: content.source_reliability,
    };

    let mut confidence = WEIGHT_EXTRACTION * stages.extraction
        + WEIGHT_FACT_CHECK * stages.fact_check
        + WEIGHT_VALIDATION * stages.validation
        + WEIGHT_SOURCE * stages.source_reliability;

    let mut penalties = Vec::new();
    let mut apply = |name: &'static str, factor: f64, confidence: &mut f64| {
        *confidence *= factor;
        penalties.push(AppliedPenalty { name, factor });
    };

    if !validation.errors.is_empty() {
        apply("validation_errors", 0.30, &mut confidence);
    }
    if validation.warnings.len() > 3 {
        apply("many_warnings", 0.80, &mut confidence);
    }
    if !extraction.specificity.is_specific_incident {
        apply("non_specific_incident", 0.80, &mut confidence);
    }
    let relevance = extraction.australian_relevance.relevance_score;
    if relevance < 0.3 {
        apply("low_australian_relevance", 0.40, &mut confidence);
    }
    if let Some(pass_rate) = fact_check.pass_rate() {
        if pass_rate < 0.5 {
            apply("low_factcheck_pass_rate", 0.50, &mut confidence);
        }
    }
    // Title claims Australia but the extraction says otherwise: a strong
    // signal the wrong incident was extracted.
    if let Some(title) = event_title {
        if title.to_lowercase().contains("australian") && relevance < 0.3 {
            apply("geographic_mismatch", 0.30, &mut confidence);
        }
    }

    let final_confidence = confidence.clamp(0.0, 1.0);
    let decision = if final_confidence >= AUTO_ACCEPT_THRESHOLD {
        Decision::AutoAccept
    } else if final_confidence >= ACCEPT_THRESHOLD {
        Decision::AcceptWithWarning
    } else {
        Decision::Reject
    };

    tracing::info!(
        decision = decision.as_str(),
        confidence = final_confidence,
        penalties = penalties.len(),
        "Final decision"
    );

    FinalDecision {
        decision,
        final_confidence,
        stage_confidences: stages,
        applied_penalties: penalties,
        checks_performed: fact_check.checks_performed,
        checks_passed: fact_check.checks_passed,
        checks_failed: fact_check.checks_failed,
    }
}

impl FinalDecision {
    /// Recompute the final confidence from the recorded stage confidences
    /// and penalties. Audit rows must satisfy this to within 1e-6.
    pub fn recompute(&self) -> f64 {
        let mut confidence = WEIGHT_EXTRACTION * self.stage_confidences.extraction
            + WEIGHT_FACT_CHECK * self.stage_confidences.fact_check
            + WEIGHT_VALIDATION * self.stage_confidences.validation
            + WEIGHT_SOURCE * self.stage_confidences.source_reliability;
        for penalty in &self.applied_penalties {
            confidence *= penalty.factor;
        }
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ExtractionMethod;
    use crate::extract::{AustralianRelevance, Specificity, VictimInfo};
    use crate::validate::ValidationResult;

    fn content(reliability: f64) -> AcquiredContent {
        AcquiredContent {
            full_text: String::new(),
            clean_summary: String::new(),
            publication_date: None,
            source_domain: "example.com".to_string(),
            source_reliability: reliability,
            content_length: 500,
            extraction_method: ExtractionMethod::ArticleParser,
            extraction_success: true,
            error: None,
        }
    }

    fn extraction(confidence: f64, specific: bool, relevance: f64) -> Extraction {
        Extraction {
            victim: VictimInfo {
                organization: Some("Acme".to_string()),
                ..Default::default()
            },
            specificity: Specificity {
                is_specific_incident: specific,
                reasoning: String::new(),
            },
            australian_relevance: AustralianRelevance {
                is_australian_event: relevance >= 0.5,
                relevance_score: relevance,
                reasoning: String::new(),
            },
            overall_confidence: confidence,
            ..Default::default()
        }
    }

    fn validation(errors: usize, warnings: usize, confidence: f64) -> ValidationResult {
        ValidationResult {
            is_valid: errors == 0,
            errors: (0..errors).map(|i| format!("e{i}")).collect(),
            warnings: (0..warnings).map(|i| format!("w{i}")).collect(),
            validation_confidence: confidence,
            overrides: Vec::new(),
        }
    }

    #[test]
    fn clean_event_auto_accepts() {
        let decision = aggregate_confidence(
            &extraction(0.9, true, 0.95),
            &FactCheckResult {
                checks_performed: 3,
                checks_passed: 3,
                checks_failed: 0,
                details: Vec::new(),
                overall_verification_confidence: 0.9,
            },
            &validation(0, 0, 0.95),
            &content(0.9),
            Some("Acme data breach confirmed"),
        );
        // 0.3*0.9 + 0.3*0.9 + 0.2*0.95 + 0.2*0.9 = 0.91, no penalties
        assert_eq!(decision.decision, Decision::AutoAccept);
        assert!(decision.applied_penalties.is_empty());
        assert!((decision.final_confidence - 0.91).abs() < 1e-9);
    }

    #[test]
    fn validation_errors_force_reject() {
        let decision = aggregate_confidence(
            &extraction(0.9, true, 0.95),
            &FactCheckResult::default(),
            &validation(1, 0, 0.5),
            &content(0.9),
            None,
        );
        assert_eq!(decision.decision, Decision::Reject);
        assert!(decision
            .applied_penalties
            .iter()
            .any(|p| p.name == "validation_errors"));
    }

    #[test]
    fn penalties_compose_in_order() {
        let decision = aggregate_confidence(
            &extraction(0.8, false, 0.2),
            &FactCheckResult {
                checks_performed: 2,
                checks_passed: 0,
                checks_failed: 2,
                details: Vec::new(),
                overall_verification_confidence: 0.2,
            },
            &validation(0, 4, 0.6),
            &content(0.6),
            Some("Australian companies under attack"),
        );
        let names: Vec<&str> = decision
            .applied_penalties
            .iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "many_warnings",
                "non_specific_incident",
                "low_australian_relevance",
                "low_factcheck_pass_rate",
                "geographic_mismatch",
            ]
        );
        assert_eq!(decision.decision, Decision::Reject);
    }

    #[test]
    fn recompute_matches_recorded_confidence() {
        let cases = [
            aggregate_confidence(
                &extraction(0.9, true, 0.95),
                &FactCheckResult {
                    checks_performed: 4,
                    checks_passed: 3,
                    checks_failed: 1,
                    details: Vec::new(),
                    overall_verification_confidence: 0.75,
                },
                &validation(0, 2, 0.8),
                &content(0.85),
                Some("Acme breach"),
            ),
            aggregate_confidence(
                &extraction(0.4, false, 0.1),
                &FactCheckResult::default(),
                &validation(2, 5, 0.1),
                &content(0.6),
                Some("Australian firms targeted"),
            ),
        ];
        for decision in cases {
            assert!((decision.recompute() - decision.final_confidence).abs() < 1e-6);
        }
    }

    #[test]
    fn borderline_event_accepts_with_warning() {
        let decision = aggregate_confidence(
            &extraction(0.7, true, 0.8),
            &FactCheckResult {
                checks_performed: 2,
                checks_passed: 1,
                checks_failed: 1,
                details: Vec::new(),
                overall_verification_confidence: 0.5,
            },
            &validation(0, 2, 0.7),
            &content(0.6),
            None,
        );
        // 0.3*0.7 + 0.3*0.5 + 0.2*0.7 + 0.2*0.6 = 0.62
        assert_eq!(decision.decision, Decision::AcceptWithWarning);
    }
}
