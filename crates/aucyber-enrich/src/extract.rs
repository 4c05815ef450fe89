//! Stage 2: primary extraction.
//!
//! One call to the reasoning LLM with a long, constrained prompt populates
//! the structured incident record. The prompt carries the negative
//! examples and title-prioritisation rules that stop the model extracting
//! context mentions from aggregate articles, and the unit-parsing rules
//! for records-affected. A provider or parse failure yields a sentinel
//! extraction with zero confidence; the pipeline continues and validation
//! forces the reject.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use aucyber_core::EventSeverity;
use aucyber_llm::{LlmProvider, LlmRequest};

use crate::content::AcquiredContent;
use crate::records::validate_records_affected;

/// Fixed industry enumeration (NIST-aligned, 20 categories).
pub const INDUSTRY_CATEGORIES: &[&str] = &[
    "GOVERNMENT",
    "FINANCIAL_SERVICES",
    "HEALTHCARE",
    "EDUCATION",
    "TECHNOLOGY",
    "MEDIA_COMMUNICATIONS",
    "RETAIL_COMMERCE",
    "TELECOMMUNICATIONS",
    "TRANSPORTATION",
    "ENERGY_UTILITIES",
    "MANUFACTURING",
    "NON_PROFIT",
    "LEGAL_SERVICES",
    "REAL_ESTATE",
    "AGRICULTURE",
    "MINING",
    "CONSTRUCTION",
    "HOSPITALITY",
    "ENTERTAINMENT",
    "OTHER",
];

/// Characters of article text handed to the model.
const ARTICLE_TEXT_BUDGET: usize = 8_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VictimInfo {
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub is_australian: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackerInfo {
    #[serde(default = "unknown_name")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub attacker_type: String,
    #[serde(default)]
    pub malware: Option<String>,
    #[serde(default)]
    pub attack_vector: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

impl Default for AttackerInfo {
    fn default() -> Self {
        Self {
            name: unknown_name(),
            attacker_type: "unknown".to_string(),
            malware: None,
            attack_vector: None,
            confidence: 0.0,
            reasoning: String::new(),
        }
    }
}

impl AttackerInfo {
    /// Whether the extraction actually named a threat actor.
    pub fn is_named(&self) -> bool {
        !self.name.is_empty() && !self.name.eq_ignore_ascii_case("unknown")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentInfo {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub discovery_date: Option<String>,
    #[serde(default)]
    pub disclosure_date: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub records_affected: Option<i64>,
    #[serde(default)]
    pub data_types: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl IncidentInfo {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_iso_date(self.date.as_deref())
    }

    pub fn parsed_discovery_date(&self) -> Option<NaiveDate> {
        parse_iso_date(self.discovery_date.as_deref())
    }

    pub fn parsed_disclosure_date(&self) -> Option<NaiveDate> {
        parse_iso_date(self.disclosure_date.as_deref())
    }

    pub fn severity_level(&self) -> EventSeverity {
        EventSeverity::parse(self.severity.as_deref().unwrap_or("unknown"))
    }
}

pub fn parse_iso_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AustralianRelevance {
    #[serde(default)]
    pub is_australian_event: bool,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Specificity {
    #[serde(default)]
    pub is_specific_incident: bool,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiVictim {
    #[serde(default)]
    pub has_multiple_victims: bool,
    #[serde(default)]
    pub victim_organizations: Option<Vec<String>>,
    #[serde(default)]
    pub reasoning: String,
}

/// The strict JSON object the prompt demands: six sub-objects plus the
/// overall confidence and notes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub victim: VictimInfo,
    #[serde(default)]
    pub attacker: AttackerInfo,
    #[serde(default)]
    pub incident: IncidentInfo,
    #[serde(default)]
    pub australian_relevance: AustralianRelevance,
    #[serde(default)]
    pub specificity: Specificity,
    #[serde(default)]
    pub multi_victim: MultiVictim,
    #[serde(default)]
    pub overall_confidence: f64,
    #[serde(default)]
    pub extraction_notes: String,
}

impl Extraction {
    /// Sentinel returned when the provider or parsing failed. Zero
    /// confidence guarantees a reject at stage 5.
    pub fn sentinel(error: &str) -> Self {
        Self {
            extraction_notes: format!("ERROR: {error}"),
            ..Default::default()
        }
    }

    pub fn failed(&self) -> bool {
        self.extraction_notes.starts_with("ERROR:")
    }
}

/// Call metadata recorded alongside the extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub model: String,
    pub tokens_used: Option<u32>,
    pub latency_ms: u64,
}

/// Stage-2 service.
pub struct PrimaryExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl PrimaryExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn extract(
        &self,
        title: &str,
        article_url: Option<&str>,
        content: &AcquiredContent,
    ) -> (Extraction, ExtractionMetadata) {
        let prompt = build_extraction_prompt(title, article_url, content);
        let request = LlmRequest {
            system: "You are a precise cybersecurity incident analyst. Always respond with \
valid JSON only. Be extremely conservative and accurate in your extractions."
                .to_string(),
            prompt,
            temperature: 0.1,
            max_tokens: 2048,
            json_mode: true,
        };

        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(error = %error, "Primary extraction call failed");
                return (Extraction::sentinel(&error.to_string()), ExtractionMetadata::default());
            }
        };

        let metadata = ExtractionMetadata {
            model: response.model.clone(),
            tokens_used: response.tokens_used,
            latency_ms: response.latency_ms,
        };

        let mut extraction: Extraction = match serde_json::from_str(&response.content) {
            Ok(extraction) => extraction,
            Err(error) => {
                tracing::error!(error = %error, "Extraction response was not valid JSON");
                return (Extraction::sentinel(&format!("JSON parsing error: {error}")), metadata);
            }
        };

        // Post-parse pass: the records rule applies regardless of what the
        // model claimed.
        let validated = validate_records_affected(extraction.incident.records_affected, title);
        if validated != extraction.incident.records_affected {
            tracing::warn!(
                original = ?extraction.incident.records_affected,
                validated = ?validated,
                title = %title,
                "Adjusted records_affected after validation"
            );
            extraction.incident.records_affected = validated;
        }

        tracing::info!(
            victim = ?extraction.victim.organization,
            confidence = extraction.overall_confidence,
            specific = extraction.specificity.is_specific_incident,
            "Primary extraction complete"
        );
        (extraction, metadata)
    }
}

/// Build the constrained extraction prompt.
pub fn build_extraction_prompt(
    title: &str,
    article_url: Option<&str>,
    content: &AcquiredContent,
) -> String {
    let categories = INDUSTRY_CATEGORIES.join(", ");
    let mut cut = content.full_text.len().min(ARTICLE_TEXT_BUDGET);
    while !content.full_text.is_char_boundary(cut) {
        cut -= 1;
    }
    let article_text = &content.full_text[..cut];
    let publication_date = content
        .publication_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        r#"You are a cybersecurity incident analyst extracting structured data from news articles about cyber attacks.

ARTICLE CONTENT:
Title: {title}
URL: {url}
Publication Date: {publication_date}
Source Reliability: {reliability:.2}

Full Article Text:
{article_text}

EXTRACTION TASK: extract the following about this cyber security incident. Be EXTREMELY precise and conservative.

1. VICTIM ORGANIZATION

Check the TITLE first: it names the primary victim. Strongly prefer organizations mentioned in the title over organizations named only in the body.

Aggregate articles (URLs containing blog/, weekly, roundup, digest, or bodies discussing 5+ separate organizations) cover MULTIPLE separate incidents:
- If the TITLE names a specific organization, extract ONLY that organization, even though the body mentions others.
- If the TITLE is generic ("Weekly Cyber News Roundup"), set victim to null and is_specific_incident to false.
- Never extract organizations from the body that the title does not mention.

Example: URL "https://example.com.au/blog/august-2025-cyber-update.html" with title "iiNet Data Breach Exposes 280,000 Customers" and a body that also covers Optus litigation, Dutch telecoms attacked by Salt Typhoon, and a university DDoS. Correct victim: "iiNet" (in the title); is_specific_incident: true. Wrong: "Dutch telecommunications companies" (body-only, and generic).

DO NOT extract:
- Organizations mentioned only for comparison or context ("similar to the Optus breach last year")
- Clients/customers of the breached vendor ("HWL Ebsworth breach exposes Home Affairs data" -> victim is HWL Ebsworth, not Home Affairs)
- Security researchers or experts quoted in the article (people are not victim organizations)
- Generic descriptors ("an Australian healthcare provider", "multiple organizations") -> use null
- Parent companies unless they were directly breached (either parent or subsidiary is acceptable when the title names both)

victim fields: organization (exact name or null), industry (one of: {categories}, or null), is_australian (boolean), confidence (0.0-1.0), reasoning (cite specific text).

2. ATTACKER

Extract the threat actor name only if EXPLICITLY stated (e.g. "LockBit", "APT29"); otherwise use "Unknown". No speculation. type is one of nation_state|ransomware_gang|hacktivist|cybercriminal|insider|unknown. Also extract malware (or null) and attack_vector (or null).

3. INCIDENT DETAILS

Distinguish date (when the attack occurred), discovery_date, and disclosure_date; each "YYYY-MM-DD" or null. severity: critical (national impact, millions affected) | high (thousands affected, sensitive data) | medium | low | unknown.

records_affected: the number of PEOPLE/accounts whose data was compromised, or null. This is NOT transactions, database rows, files, bytes, or dollars.
UNIT PARSING IS CRITICAL:
- "6 million records" -> 6000000 (NOT 6)
- "280 thousand customers" -> 280000 (NOT 280)
- "1.5 million users" -> 1500000 (NOT 15 or 1500)
Always multiply by the stated unit. Minimum plausible value is 50; maximum is 1000000000. "3 million transactions", "500 GB", "$2.5 million fine" -> null. If unsure whether the number counts people, use null.

data_types: list like ["personal_information", "financial_data", "health_records"].

4. AUSTRALIAN RELEVANCE

is_australian_event is true if the victim is Australian, Australian citizens' data was exposed, or Australian infrastructure was targeted. relevance_score 0.0-1.0.

5. SPECIFICITY

Decision rule - after reading the article, can you name:
  (1) WHICH organization was attacked, (2) WHAT type of attack, (3) approximately WHEN?
All three yes -> is_specific_incident: true. Any no -> false.
Analysis, follow-ups, and lessons-learned pieces about one concrete incident are SPECIFIC. General advice, trends, statistics, and multi-incident roundups without a title focus are NOT.

6. MULTI-VICTIM

has_multiple_victims is true only when ONE attack simultaneously hit multiple distinct organizations (supply-chain style). A vendor breach exposing client data is single-victim (the vendor). Aggregate articles covering separate incidents are NOT multi-victim.

Respond with ONLY a valid JSON object, no markdown:

{{
  "victim": {{"organization": "... or null", "industry": "... or null", "is_australian": true, "confidence": 0.0, "reasoning": "..."}},
  "attacker": {{"name": "... or Unknown", "type": "unknown", "malware": null, "attack_vector": null, "confidence": 0.0, "reasoning": "..."}},
  "incident": {{"date": null, "discovery_date": null, "disclosure_date": null, "severity": "unknown", "records_affected": null, "data_types": [], "confidence": 0.0, "reasoning": "..."}},
  "australian_relevance": {{"is_australian_event": false, "relevance_score": 0.0, "reasoning": "..."}},
  "specificity": {{"is_specific_incident": false, "reasoning": "..."}},
  "multi_victim": {{"has_multiple_victims": false, "victim_organizations": null, "reasoning": "..."}},
  "overall_confidence": 0.0,
  "extraction_notes": "..."
}}"#,
        title = title,
        url = article_url.unwrap_or("N/A"),
        publication_date = publication_date,
        reliability = content.source_reliability,
        article_text = article_text,
        categories = categories,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ExtractionMethod;
    use aucyber_llm::MockProvider;

    fn content_with(text: &str) -> AcquiredContent {
        AcquiredContent {
            full_text: text.to_string(),
            clean_summary: String::new(),
            publication_date: NaiveDate::from_ymd_opt(2024, 6, 12),
            source_domain: "itnews.com.au".to_string(),
            source_reliability: 0.9,
            content_length: text.split_whitespace().count(),
            extraction_method: ExtractionMethod::ArticleParser,
            extraction_success: true,
            error: None,
        }
    }

    #[test]
    fn prompt_contains_constraints_and_budgeted_text() {
        let long_text = "word ".repeat(5_000);
        let content = content_with(&long_text);
        let prompt = build_extraction_prompt(
            "iiNet Data Breach Exposes 280,000 Customers",
            Some("https://example.com/article"),
            &content,
        );
        assert!(prompt.contains("UNIT PARSING IS CRITICAL"));
        assert!(prompt.contains("WHICH organization was attacked"));
        assert!(prompt.contains("GOVERNMENT, FINANCIAL_SERVICES"));
        // Article text is clipped to the budget.
        assert!(prompt.len() < long_text.len());
    }

    #[tokio::test]
    async fn valid_response_parses_and_applies_records_rule() {
        let response = serde_json::json!({
            "victim": {"organization": "iiNet", "industry": "TELECOMMUNICATIONS",
                        "is_australian": true, "confidence": 0.9, "reasoning": "title"},
            "attacker": {"name": "Unknown", "type": "unknown", "malware": null,
                          "attack_vector": null, "confidence": 0.3, "reasoning": "not stated"},
            "incident": {"date": "2024-06-10", "discovery_date": null, "disclosure_date": null,
                          "severity": "high", "records_affected": 6,
                          "data_types": ["personal_information"], "confidence": 0.8,
                          "reasoning": "6 million reported"},
            "australian_relevance": {"is_australian_event": true, "relevance_score": 0.95,
                                      "reasoning": "Australian ISP"},
            "specificity": {"is_specific_incident": true, "reasoning": "named victim"},
            "multi_victim": {"has_multiple_victims": false, "victim_organizations": null,
                              "reasoning": "single org"},
            "overall_confidence": 0.85,
            "extraction_notes": ""
        });
        let extractor = PrimaryExtractor::new(std::sync::Arc::new(MockProvider::constant(
            &response.to_string(),
        )));
        let content = content_with("body text ");
        let (extraction, metadata) = extractor
            .extract("iiNet Data Breach", Some("https://example.com/a"), &content)
            .await;

        assert_eq!(extraction.victim.organization.as_deref(), Some("iiNet"));
        assert_eq!(
            extraction.incident.parsed_date(),
            NaiveDate::from_ymd_opt(2024, 6, 10)
        );
        // 6 is below the plausibility floor: the shared rule nulls it.
        assert_eq!(extraction.incident.records_affected, None);
        assert_eq!(extraction.incident.severity_level(), EventSeverity::High);
        assert!(!extraction.failed());
        assert_eq!(metadata.model, "mock-1");
    }

    #[tokio::test]
    async fn unparsable_response_yields_sentinel() {
        let extractor =
            PrimaryExtractor::new(std::sync::Arc::new(MockProvider::constant("not json at all")));
        let content = content_with("body");
        let (extraction, _) = extractor.extract("Title", None, &content).await;
        assert!(extraction.failed());
        assert_eq!(extraction.overall_confidence, 0.0);
        assert!(!extraction.specificity.is_specific_incident);
    }
}
