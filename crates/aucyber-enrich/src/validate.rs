//! Stage 4: rule-based sensibility and cross-field consistency checks.
//!
//! Each rule emits warnings and/or errors; `is_valid` means zero errors.
//! The specificity override rules are the deterministic backstop to the
//! LLM classifier: model calibration drifts, the rules do not.

use chrono::{Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::extract::Extraction;
use crate::factcheck::FactCheckResult;

/// Generic organisation-name patterns that must never be persisted as a
/// victim.
fn generic_patterns() -> &'static Vec<(Regex, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"australian\s+\w+\s+(company|firm|organization|organisation)", "Australian X company"),
            (r"new\s+zealand\s+\w+\s+(company|firm)", "New Zealand X company"),
            (r"\w+\s+sector\s+organizations?", "X sector organization"),
            (r"\w+\s+industry\s+company", "X industry company"),
            (r"\w+\s+(companies|organizations|organisations|firms)$", "plural organizations"),
            (r"^(dutch|german|french|british|american|chinese)\s+\w+\s+companies", "country X companies"),
            (r"^company$", "just 'company'"),
            (r"^organization$", "just 'organization'"),
            (r"^the\s+company$", "just 'the company'"),
            (r"^an?\s+\w+\s+(company|provider|institution)", "a/an X company"),
            (r"approximately\s+\d+\s+organizations", "approximately N organizations"),
            (r"multiple\s+(companies|organizations|organisations)", "multiple organizations"),
        ]
        .into_iter()
        .map(|(pattern, label)| (Regex::new(pattern).expect("static regex"), label))
        .collect()
    })
}

/// Person-name shapes commonly misextracted as organisations.
fn person_patterns() -> &'static Vec<(Regex, &'static str)> {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"^(mr|mrs|ms|dr|prof)\.?\s+\w+\s+\w+", "title + name"),
            (r"^\w+\s+\w+\s+(ceo|cto|ciso|expert|researcher|analyst)$", "name + role"),
            (r"^\w+\s+smith$", "common surname"),
            (r"^\w+\s+jones$", "common surname"),
        ]
        .into_iter()
        .map(|(pattern, label)| (Regex::new(pattern).expect("static regex"), label))
        .collect()
    })
}

/// URL fragments marking aggregate listings.
const AGGREGATE_URL_PATTERNS: &[&str] = &[
    "blog/", "weekly", "monthly", "roundup", "digest", "update", "news-feed", "bulletin",
    "newsletter", "recap",
];

/// Title prefixes marking educational content.
const EDUCATIONAL_PREFIXES: &[&str] = &[
    "how to", "guide to", "best practices", "tips for", "5 ways", "10 steps",
];

/// Known-organisation industry table for the consistency check.
const KNOWN_ORG_INDUSTRIES: &[(&str, &str)] = &[
    ("medibank", "HEALTHCARE"),
    ("qantas", "TRANSPORTATION"),
    ("virgin australia", "TRANSPORTATION"),
    ("telstra", "TELECOMMUNICATIONS"),
    ("optus", "TELECOMMUNICATIONS"),
    ("tpg", "TELECOMMUNICATIONS"),
    ("iinet", "TELECOMMUNICATIONS"),
    ("commonwealth bank", "FINANCIAL_SERVICES"),
    ("westpac", "FINANCIAL_SERVICES"),
    ("anz", "FINANCIAL_SERVICES"),
    ("nab", "FINANCIAL_SERVICES"),
    ("woolworths", "RETAIL_COMMERCE"),
    ("coles", "RETAIL_COMMERCE"),
    ("bhp", "MINING"),
    ("rio tinto", "MINING"),
];

/// Stopwords dropped when matching victim words against the title.
const ORG_STOPWORDS: &[&str] = &[
    "limited", "ltd", "inc", "corp", "corporation", "company", "pty", "australia", "australian",
    "group", "holdings",
];

/// One applied specificity override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificityOverride {
    pub original: bool,
    pub override_to: bool,
    pub reason: String,
}

/// Stage-4 output. `extraction` carries any overrides already applied.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub validation_confidence: f64,
    pub overrides: Vec<SpecificityOverride>,
}

/// A duplicate candidate found in the store before validation ran.
#[derive(Debug, Clone)]
pub struct DuplicateHit {
    pub enriched_event_id: uuid::Uuid,
    pub title: String,
}

/// Stage-4 service. Pure: the duplicate lookup happens in the pipeline and
/// its hits are passed in, so every rule is unit-testable.
#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Run every rule. The extraction is taken by mutable reference so
    /// specificity overrides apply in place.
    pub fn validate(
        &self,
        extraction: &mut Extraction,
        fact_check: &FactCheckResult,
        event_title: Option<&str>,
        event_url: Option<&str>,
        duplicate_hits: &[DuplicateHit],
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.check_organization_name(extraction, &mut errors, &mut warnings);
        if let Some(title) = event_title {
            self.check_title_match(extraction, title, event_url, &mut warnings);
        }
        self.check_dates(extraction, &mut errors);
        self.check_consistency(extraction, &mut warnings);

        for check in fact_check.details.iter().filter(|c| !c.verified) {
            warnings.push(format!(
                "Failed fact-check ({}): {}",
                check.check_type.as_str(),
                check.query
            ));
        }

        if let Some(hit) = duplicate_hits.first() {
            warnings.push(format!(
                "Possible duplicate of event {}: {}",
                hit.enriched_event_id,
                hit.title.chars().take(60).collect::<String>()
            ));
        }

        let overrides = self.apply_specificity_overrides(extraction, event_title, event_url);
        for o in &overrides {
            warnings.push(format!(
                "Specificity override {} -> {}: {}",
                o.original, o.override_to, o.reason
            ));
        }

        let validation_confidence = validation_confidence(&errors, &warnings, fact_check);
        tracing::info!(
            errors = errors.len(),
            warnings = warnings.len(),
            confidence = validation_confidence,
            "Validation complete"
        );

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            validation_confidence,
            overrides,
        }
    }

    fn check_organization_name(
        &self,
        extraction: &Extraction,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        // No victim is acceptable; some events have none identified.
        let Some(org_name) = extraction.victim.organization.as_deref() else {
            return;
        };
        let lower = org_name.to_lowercase();

        if let Some((_, label)) = generic_patterns().iter().find(|(re, _)| re.is_match(&lower)) {
            errors.push(format!(
                "Generic organization name detected: '{org_name}' matches pattern '{label}'"
            ));
        } else if let Some((_, label)) =
            person_patterns().iter().find(|(re, _)| re.is_match(&lower))
        {
            errors.push(format!(
                "Appears to be a person's name, not organization: '{org_name}' ({label})"
            ));
        }

        if org_name.len() < 2 {
            errors.push(format!("Organization name too short: '{org_name}'"));
        }
        if org_name.len() > 150 {
            warnings.push(format!(
                "Organization name unusually long ({} chars)",
                org_name.len()
            ));
        }
        if ["unknown", "n/a", "null", "none", "not specified", ""].contains(&lower.as_str()) {
            errors.push(format!("Invalid organization name: '{org_name}'"));
        }
    }

    fn check_title_match(
        &self,
        extraction: &Extraction,
        title: &str,
        event_url: Option<&str>,
        warnings: &mut Vec<String>,
    ) {
        let Some(org_name) = extraction.victim.organization.as_deref() else {
            return;
        };
        let org_lower = org_name.to_lowercase();
        let title_lower = title.to_lowercase();

        let mut key_words: Vec<&str> = org_lower
            .split_whitespace()
            .filter(|w| w.len() > 3 && !ORG_STOPWORDS.contains(w))
            .collect();
        if key_words.is_empty() {
            key_words = org_lower.split_whitespace().filter(|w| w.len() > 2).collect();
        }

        let found = title_lower.contains(&org_lower)
            || key_words.iter().any(|w| title_lower.contains(w));
        if found {
            return;
        }

        let mut message = format!(
            "Victim '{org_name}' not found in title '{}'. This may be an aggregate article, \
a URL/content mismatch, or a contextual mention extracted as the victim.",
            title.chars().take(80).collect::<String>()
        );
        if let Some(url) = event_url {
            if is_aggregate_url(url) {
                message.push_str(&format!(" URL appears to be aggregate content: {url}"));
            }
        }
        warnings.push(message);
    }

    fn check_dates(&self, extraction: &Extraction, errors: &mut Vec<String>) {
        let today = Utc::now().date_naive();
        let incident = extraction.incident.parsed_date();
        let discovery = extraction.incident.parsed_discovery_date();
        let disclosure = extraction.incident.parsed_disclosure_date();

        if let Some(raw) = extraction.incident.date.as_deref() {
            if incident.is_none() {
                errors.push(format!("Invalid incident date format: {raw}"));
            }
        }

        if let Some(date) = incident {
            if date > today {
                errors.push(format!("Incident date is in the future: {date}"));
            }
            if date.year() < 1990 {
                errors.push(format!("Incident date implausibly old (before 1990): {date}"));
            }
        }

        if let (Some(incident), Some(discovery)) = (incident, discovery) {
            if discovery < incident {
                errors.push(format!(
                    "Discovery date ({discovery}) before incident date ({incident})"
                ));
            }
        }
        if let (Some(discovery), Some(disclosure)) = (discovery, disclosure) {
            if disclosure < discovery {
                errors.push(format!(
                    "Disclosure date ({disclosure}) before discovery date ({discovery})"
                ));
            }
        }
    }

    fn check_consistency(&self, extraction: &Extraction, warnings: &mut Vec<String>) {
        let severity = extraction.incident.severity.as_deref().unwrap_or("unknown");
        if let Some(records) = extraction.incident.records_affected {
            if severity.eq_ignore_ascii_case("critical") && records < 1_000 {
                warnings.push(format!(
                    "Severity 'critical' but only {records} records affected"
                ));
            }
            if severity.eq_ignore_ascii_case("low") && records > 100_000 {
                warnings.push(format!("Severity 'low' but {records} records affected"));
            }
        }

        if let (Some(org), Some(industry)) = (
            extraction.victim.organization.as_deref(),
            extraction.victim.industry.as_deref(),
        ) {
            let org_lower = org.to_lowercase();
            if let Some((known, expected)) = KNOWN_ORG_INDUSTRIES
                .iter()
                .find(|(known, _)| org_lower.contains(known))
            {
                if industry != *expected {
                    warnings.push(format!(
                        "Industry classification mismatch: '{org}' ({known}) classified as {industry}, expected {expected}"
                    ));
                }
            }
        }
    }

    /// Belt-and-braces repair of the LLM's specificity call.
    fn apply_specificity_overrides(
        &self,
        extraction: &mut Extraction,
        event_title: Option<&str>,
        event_url: Option<&str>,
    ) -> Vec<SpecificityOverride> {
        let mut overrides = Vec::new();
        let is_specific = extraction.specificity.is_specific_incident;
        let has_victim = extraction.victim.organization.is_some();
        let relevance = extraction.australian_relevance.relevance_score;

        // False -> true: a named victim, high Australian relevance, and at
        // least one concrete anchor mean a real incident whatever the model
        // said.
        if !is_specific && has_victim && relevance > 0.7 {
            let generic_vector = extraction
                .attacker
                .attack_vector
                .as_deref()
                .map(|v| {
                    let v = v.to_lowercase();
                    v == "cyber incident" || v == "unknown" || v == "not specified"
                })
                .unwrap_or(true);
            let has_anchor = extraction.incident.records_affected.is_some()
                || extraction.incident.date.is_some()
                || !generic_vector;
            if has_anchor {
                overrides.push(SpecificityOverride {
                    original: false,
                    override_to: true,
                    reason: "victim with concrete incident details and high Australian relevance"
                        .to_string(),
                });
            }
        }

        // False -> true: incident keywords plus the victim in a
        // non-aggregate title.
        if !is_specific && overrides.is_empty() && has_victim && relevance > 0.3 {
            if let Some(title) = event_title {
                let title_lower = title.to_lowercase();
                let incident_keywords = [
                    "breach", "attack", "hack", "ransomware", "incident", "compromised",
                    "exposed", "hit by", "flags", "confirms", "discloses", "reveals",
                    "data leak", "cyberattack",
                ];
                let has_keyword = incident_keywords.iter().any(|kw| title_lower.contains(kw));
                let victim = extraction.victim.organization.as_deref().unwrap_or("");
                let victim_in_title = title_lower.contains(&victim.to_lowercase())
                    || victim
                        .split_whitespace()
                        .filter(|w| w.len() > 3)
                        .any(|w| title_lower.contains(&w.to_lowercase()));
                let aggregate = event_url.map(is_aggregate_url).unwrap_or(false);
                if has_keyword && victim_in_title && !aggregate {
                    overrides.push(SpecificityOverride {
                        original: false,
                        override_to: true,
                        reason: "title contains incident keywords and the victim name".to_string(),
                    });
                }
            }
        }

        // True -> false: educational titles with no named victim.
        if is_specific && !has_victim {
            if let Some(title) = event_title {
                let title_lower = title.to_lowercase();
                if EDUCATIONAL_PREFIXES
                    .iter()
                    .any(|prefix| title_lower.starts_with(prefix))
                {
                    overrides.push(SpecificityOverride {
                        original: true,
                        override_to: false,
                        reason: "educational title with no identified victim".to_string(),
                    });
                }
            }
        }

        for o in &overrides {
            extraction.specificity.is_specific_incident = o.override_to;
            extraction.specificity.reasoning = format!(
                "{} [VALIDATOR OVERRIDE: {}]",
                extraction.specificity.reasoning, o.reason
            );
        }
        overrides
    }
}

pub(crate) fn is_aggregate_url(url: &str) -> bool {
    let url_lower = url.to_lowercase();
    AGGREGATE_URL_PATTERNS
        .iter()
        .any(|pattern| url_lower.contains(pattern))
}

/// `clamp(1 - 0.3*errors - 0.1*warnings, 0, 1)`, averaged with the
/// fact-check pass rate when checks ran.
pub fn validation_confidence(
    errors: &[String],
    warnings: &[String],
    fact_check: &FactCheckResult,
) -> f64 {
    let mut confidence =
        (1.0 - 0.3 * errors.len() as f64 - 0.1 * warnings.len() as f64).clamp(0.0, 1.0);
    if let Some(pass_rate) = fact_check.pass_rate() {
        confidence = (confidence + pass_rate) / 2.0;
    }
    confidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{AustralianRelevance, IncidentInfo, Specificity, VictimInfo};

    fn extraction(victim: Option<&str>) -> Extraction {
        Extraction {
            victim: VictimInfo {
                organization: victim.map(|v| v.to_string()),
                industry: Some("TELECOMMUNICATIONS".to_string()),
                is_australian: true,
                confidence: 0.9,
                reasoning: String::new(),
            },
            australian_relevance: AustralianRelevance {
                is_australian_event: true,
                relevance_score: 0.9,
                reasoning: String::new(),
            },
            specificity: Specificity {
                is_specific_incident: true,
                reasoning: String::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn generic_victim_names_are_errors() {
        let mut e = extraction(Some("Australian healthcare company"));
        let result = Validator::new().validate(&mut e, &FactCheckResult::default(), None, None, &[]);
        assert!(!result.is_valid);

        let mut e = extraction(Some("multiple organizations"));
        let result = Validator::new().validate(&mut e, &FactCheckResult::default(), None, None, &[]);
        assert!(!result.is_valid);

        let mut e = extraction(Some("Unknown"));
        let result = Validator::new().validate(&mut e, &FactCheckResult::default(), None, None, &[]);
        assert!(!result.is_valid);
    }

    #[test]
    fn person_names_are_errors() {
        let mut e = extraction(Some("Dr John Smith"));
        let result = Validator::new().validate(&mut e, &FactCheckResult::default(), None, None, &[]);
        assert!(!result.is_valid);
    }

    #[test]
    fn real_victim_passes_clean() {
        let mut e = extraction(Some("iiNet"));
        e.incident = IncidentInfo {
            date: Some("2024-06-10".to_string()),
            severity: Some("high".to_string()),
            records_affected: Some(280_000),
            ..Default::default()
        };
        let result = Validator::new().validate(
            &mut e,
            &FactCheckResult::default(),
            Some("iiNet Data Breach Exposes 280,000 Customers"),
            Some("https://example.com/iinet-breach"),
            &[],
        );
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn victim_absent_from_title_warns_harder_for_aggregates() {
        let mut e = extraction(Some("Qantas"));
        let result = Validator::new().validate(
            &mut e,
            &FactCheckResult::default(),
            Some("iiNet Data Breach Exposes 280,000 Customers"),
            Some("https://example.com/blog/august-2025-cyber-update.html"),
            &[],
        );
        assert!(result.is_valid);
        assert!(result.warnings[0].contains("aggregate content"));
    }

    #[test]
    fn impossible_date_ordering_is_an_error() {
        let mut e = extraction(Some("Acme"));
        e.incident = IncidentInfo {
            date: Some("2024-06-10".to_string()),
            discovery_date: Some("2024-06-01".to_string()),
            ..Default::default()
        };
        let result = Validator::new().validate(&mut e, &FactCheckResult::default(), None, None, &[]);
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("Discovery date"));
    }

    #[test]
    fn future_dates_are_errors() {
        let mut e = extraction(Some("Acme"));
        e.incident.date = Some("2099-01-01".to_string());
        let result = Validator::new().validate(&mut e, &FactCheckResult::default(), None, None, &[]);
        assert!(!result.is_valid);
    }

    #[test]
    fn severity_records_mismatch_warns() {
        let mut e = extraction(Some("Acme"));
        e.incident = IncidentInfo {
            severity: Some("critical".to_string()),
            records_affected: Some(200),
            ..Default::default()
        };
        let result = Validator::new().validate(
            &mut e,
            &FactCheckResult::default(),
            Some("Acme critical breach"),
            None,
            &[],
        );
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("critical")));
    }

    #[test]
    fn known_org_industry_mismatch_warns() {
        let mut e = extraction(Some("Medibank Private"));
        e.victim.industry = Some("TECHNOLOGY".to_string());
        let result = Validator::new().validate(
            &mut e,
            &FactCheckResult::default(),
            Some("Medibank Private breach"),
            None,
            &[],
        );
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("expected HEALTHCARE")));
    }

    #[test]
    fn specificity_forced_true_with_concrete_anchors() {
        let mut e = extraction(Some("iiNet"));
        e.specificity.is_specific_incident = false;
        e.incident.records_affected = Some(280_000);
        let result = Validator::new().validate(
            &mut e,
            &FactCheckResult::default(),
            Some("iiNet Data Breach Exposes 280,000 Customers"),
            Some("https://example.com/blog/august-2025-cyber-update.html"),
            &[],
        );
        assert_eq!(result.overrides.len(), 1);
        assert!(e.specificity.is_specific_incident);
        assert!(e.specificity.reasoning.contains("VALIDATOR OVERRIDE"));
    }

    #[test]
    fn educational_titles_forced_non_specific() {
        let mut e = extraction(None);
        e.specificity.is_specific_incident = true;
        let result = Validator::new().validate(
            &mut e,
            &FactCheckResult::default(),
            Some("How to protect your business from phishing"),
            None,
            &[],
        );
        assert_eq!(result.overrides.len(), 1);
        assert!(!e.specificity.is_specific_incident);
        assert!(result.is_valid);
    }

    #[test]
    fn confidence_formula_matches_spec() {
        let errors = vec!["e1".to_string()];
        let warnings = vec!["w1".to_string(), "w2".to_string()];
        let fc = FactCheckResult::default();
        // 1 - 0.3 - 0.2 = 0.5, no fact-check averaging
        assert!((validation_confidence(&errors, &warnings, &fc) - 0.5).abs() < 1e-9);

        let fc = FactCheckResult {
            checks_performed: 2,
            checks_passed: 2,
            ..Default::default()
        };
        // (0.5 + 1.0) / 2
        assert!((validation_confidence(&errors, &warnings, &fc) - 0.75).abs() < 1e-9);
    }
}
