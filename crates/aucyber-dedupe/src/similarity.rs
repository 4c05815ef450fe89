//! Weighted content similarity between two enriched events.
//!
//! The score combines title, description, and key-term similarity with
//! date-proximity and type factors. Strong incident indicators (same
//! system, same in-body date, same data types, same threat actor) switch
//! to a more lenient weighting and threshold.

use chrono::Datelike;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use aucyber_core::EnrichedWithRaw;

use crate::text::sequence_ratio;

/// Regexes marking aggregate-report headlines. Two of these with shared
/// terms are the same summary, not two incidents.
fn generic_summary_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)\b(?:multiple|several|various)\b.*\b(?:breach|attack|incident)",
            r"(?i)\b(?:australian|australia)\b.*\b(?:data\s+breach|breach|attack|incident|cyber)",
            r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\b.*\b(?:202\d|201\d)\b",
            r"(?i)\b(?:q1|q2|q3|q4)\b.*\b(?:202\d|201\d)\b",
            r"(?i)\b(?:202\d|201\d)\b.*\b(?:breach|attack|incident|cyber)",
            r"(?i)\b(?:office.*australian.*information.*commissioner|oaic)\b.*\b(?:report|notification)",
            r"(?i)\b(?:covid|coronavirus)\b.*\b(?:themed|campaign|activity|cyber|phishing)",
            r"(?i)\b(?:phishing\s+campaign|malicious\s+cyber\s+activity)\b.*\b(?:targeting|australian)",
            r"(?i)\b\d+\s+(?:cybercrime|cyber\s+security|incident)\s+reports?\b",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("static regex"))
        .collect()
    })
}

/// Terms shared between generic summaries of the same period.
const SUMMARY_TERMS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "2020", "2021", "2022", "2023", "2024", "2025",
    "australia", "australian", "data breach", "ransomware", "malware", "oaic", "commissioner",
    "multiple", "several", "various", "covid", "phishing", "campaign", "themed", "malicious",
    "targeting", "acsc", "reports",
];

/// Key cyber-incident patterns for the Jaccard term similarity.
fn key_term_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)(?:contact\s+centre|call\s+center|contact\s+center)",
            r"(?i)(?:third[- ]party|3rd[- ]party)",
            r"(?i)(?:platform|system|service)",
            r"(?i)(?:unusual\s+activity|suspicious\s+activity)",
            r"(?i)(?:personal\s+data|customer\s+data|sensitive\s+data)",
            r"(?i)(?:email\s+addresses?|phone\s+numbers?|frequent\s+flyer)",
            r"(?i)(?:ransomware|phishing|malware|breach|hack|attack)",
            r"(?i)(?:scattered\s+spider|killsec|qilin|akira|lockbit|alphv|clop)",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("static regex"))
        .collect()
    })
}

/// Domain vocabulary for the description boost.
const DESC_KEY_TERMS: &[&str] = &[
    "optus", "telstra", "medibank", "canva", "toll", "defence", "white", "pages", "directory",
    "sensis", "customers", "personal", "details", "disclosed", "published", "breach", "data",
    "compromised", "names", "addresses", "phone", "numbers", "unlisted", "api", "coding",
    "error", "records", "exposed", "stolen", "leaked",
];

/// Systems specific enough that both events naming one is strong evidence.
fn specific_system_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)(?:contact\s+centre|call\s+center|contact\s+center)",
            r"(?i)third[- ]party\s+platform",
            r"(?i)airline\s+contact\s+centre",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("static regex"))
        .collect()
    })
}

fn data_type_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)email\s+addresses?",
            r"(?i)phone\s+numbers?",
            r"(?i)frequent\s+flyer",
            r"(?i)birth\s+dates?",
            r"(?i)customer\s+records?",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("static regex"))
        .collect()
    })
}

fn threat_actor_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)scattered\s+spider",
            r"(?i)phishing",
            r"(?i)social\s+engineering",
            r"(?i)mfa\s+bombing",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("static regex"))
        .collect()
    })
}

fn in_body_date_mentions() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}\b|\b\d{1,2}\s+(?:january|february|march|april|may|june|july|august|september|october|november|december)\b",
        )
        .expect("static regex")
    })
}

/// Everything the pairwise decision needs to explain itself.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub title_similarity: f64,
    pub description_similarity: f64,
    pub key_terms_similarity: f64,
    pub date_factor: f64,
    pub type_factor: f64,
    pub strong_indicators: f64,
    pub score: f64,
    pub threshold: f64,
}

impl ScoreBreakdown {
    pub fn passes(&self) -> bool {
        self.score >= self.threshold
    }
}

fn combined_text(event: &EnrichedWithRaw) -> String {
    format!("{} {}", event.title, event.description).to_lowercase()
}

/// Both headlines are aggregate-report summaries sharing enough terms to
/// be the same report.
pub fn are_both_generic_summaries(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> bool {
    let title_a = a.title.to_lowercase();
    let title_b = b.title.to_lowercase();
    let generic = |title: &str| generic_summary_patterns().iter().any(|re| re.is_match(title));
    if !(generic(&title_a) && generic(&title_b)) {
        return false;
    }

    let desc_a: String = a.description.to_lowercase().chars().take(200).collect();
    let desc_b: String = b.description.to_lowercase().chars().take(200).collect();
    let common = SUMMARY_TERMS
        .iter()
        .filter(|term| {
            (title_a.contains(**term) || desc_a.contains(**term))
                && (title_b.contains(**term) || desc_b.contains(**term))
        })
        .count();
    common >= 3
}

/// Same company but demonstrably different incidents: affected counts more
/// than 10x apart and clearly distinct attack anchors. Structured fields
/// are consulted first; free-text anchors only when both sides lack them.
pub fn are_different_incidents(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> bool {
    let (Some(records_a), Some(records_b)) = (a.records_affected, b.records_affected) else {
        return false;
    };
    if records_a <= 0 || records_b <= 0 || records_a == records_b {
        return false;
    }
    let ratio = records_a.max(records_b) as f64 / records_a.min(records_b) as f64;
    if ratio <= 10.0 {
        return false;
    }

    // Structured attack methods win when both sides carry them.
    if let (Some(method_a), Some(method_b)) = (a.attack_method.as_deref(), b.attack_method.as_deref())
    {
        let method_a = method_a.to_lowercase();
        let method_b = method_b.to_lowercase();
        if !method_a.is_empty() && !method_b.is_empty() && method_a != method_b {
            let years_differ = match (a.event_date, b.event_date) {
                (Some(date_a), Some(date_b)) => date_a.year() != date_b.year(),
                _ => false,
            };
            if years_differ {
                return true;
            }
        }
    }

    // Free-text fallback: distinct method/timeframe anchor pairs.
    let text_a = combined_text(a);
    let text_b = combined_text(b);
    let anchor_pairs = [
        ("white pages", "api", "2020", "2022"),
        ("directory", "coding error", "2020", "2022"),
    ];
    for (method1, method2, year1, year2) in anchor_pairs {
        if (text_a.contains(method1)
            && text_b.contains(method2)
            && text_a.contains(year1)
            && text_b.contains(year2))
            || (text_b.contains(method1)
                && text_a.contains(method2)
                && text_b.contains(year1)
                && text_a.contains(year2))
        {
            return true;
        }
    }
    false
}

/// Same incident reported with revised impact numbers: shared indicators
/// with a plausible revision ratio.
fn incident_update_boost(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> f64 {
    let (Some(records_a), Some(records_b)) = (a.records_affected, b.records_affected) else {
        return 0.0;
    };
    if records_a <= 0 || records_b <= 0 || records_a == records_b {
        return 0.0;
    }
    let text_a = combined_text(a);
    let text_b = combined_text(b);
    let indicators = [
        "optus", "medibank", "canva", "toll", "telstra", "data breach", "cyber attack",
        "security incident", "customers", "personal details", "compromised",
    ];
    let common = indicators
        .iter()
        .filter(|term| text_a.contains(**term) && text_b.contains(**term))
        .count();
    if common < 4 {
        return 0.0;
    }
    let ratio = records_a.max(records_b) as f64 / records_a.min(records_b) as f64;
    if (2.0..=50.0).contains(&ratio) {
        0.9
    } else {
        0.0
    }
}

fn title_similarity(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> f64 {
    let title_a = a.title.to_lowercase();
    let title_b = b.title.to_lowercase();
    let mut similarity = sequence_ratio(&title_a, &title_b);

    // Truncated-title boost: one word set contained in the other.
    let words_a: HashSet<&str> = title_a.split_whitespace().collect();
    let words_b: HashSet<&str> = title_b.split_whitespace().collect();
    if words_a.len() != words_b.len() {
        let (shorter, longer) = if words_a.len() < words_b.len() {
            (&words_a, &words_b)
        } else {
            (&words_b, &words_a)
        };
        if shorter.is_subset(longer) && shorter.len() as f64 / longer.len() as f64 > 0.7 {
            similarity = similarity.max(0.9);
        }
    }

    // Matching openings are common for follow-up reporting.
    let min_length = title_a.chars().count().min(title_b.chars().count());
    if min_length > 20 {
        let prefix_a: String = title_a.chars().take(min_length).collect();
        let prefix_b: String = title_b.chars().take(min_length).collect();
        let prefix_similarity = sequence_ratio(&prefix_a, &prefix_b);
        if prefix_similarity > 0.8 {
            similarity = similarity.max(prefix_similarity);
        }
    }
    similarity
}

fn description_similarity(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> f64 {
    let desc_a: String = a.description.to_lowercase().chars().take(300).collect();
    let desc_b: String = b.description.to_lowercase().chars().take(300).collect();
    let mut similarity = sequence_ratio(&desc_a, &desc_b);

    if similarity > 0.3 {
        let words_a: HashSet<&str> = a.description.split_whitespace().collect();
        let words_b: HashSet<&str> = b.description.split_whitespace().collect();
        let lower_a: HashSet<String> = words_a.iter().map(|w| w.to_lowercase()).collect();
        let lower_b: HashSet<String> = words_b.iter().map(|w| w.to_lowercase()).collect();
        let common = DESC_KEY_TERMS
            .iter()
            .filter(|term| lower_a.contains(**term) && lower_b.contains(**term))
            .count();
        if common >= 4 {
            similarity = (similarity + (common as f64 / 10.0).min(0.3)).min(1.0);
        }
    }
    similarity
}

fn key_terms_similarity(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> f64 {
    let text_a = combined_text(a);
    let text_b = combined_text(b);
    let matches_a: HashSet<usize> = key_term_patterns()
        .iter()
        .enumerate()
        .filter(|(_, re)| re.is_match(&text_a))
        .map(|(i, _)| i)
        .collect();
    let matches_b: HashSet<usize> = key_term_patterns()
        .iter()
        .enumerate()
        .filter(|(_, re)| re.is_match(&text_b))
        .map(|(i, _)| i)
        .collect();

    let union = matches_a.union(&matches_b).count();
    if union == 0 {
        return 0.0;
    }
    matches_a.intersection(&matches_b).count() as f64 / union as f64
}

/// Date proximity ladder. Breaches are routinely disclosed months late, so
/// distance scales the score instead of gating it.
fn date_factor(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> f64 {
    let (Some(date_a), Some(date_b)) = (a.event_date, b.event_date) else {
        return 0.8;
    };
    let days = (date_a - date_b).num_days().abs();
    match days {
        0 => 1.0,
        1..=7 => 0.98,
        8..=30 => 0.90,
        31..=90 => 0.80,
        91..=180 => 0.70,
        181..=365 => 0.60,
        _ => (1.0 - days as f64 / 1000.0).max(0.4),
    }
}

fn strong_incident_indicators(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> f64 {
    let text_a = combined_text(a);
    let text_b = combined_text(b);
    let mut total: f64 = 0.0;

    for pattern in specific_system_patterns() {
        if pattern.is_match(&text_a) && pattern.is_match(&text_b) {
            total += 0.3;
        }
    }

    // The same precise date string appearing in both bodies.
    let dates_a: HashSet<String> = in_body_date_mentions()
        .find_iter(&text_a)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    let dates_b: HashSet<String> = in_body_date_mentions()
        .find_iter(&text_b)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    if dates_a.intersection(&dates_b).next().is_some() {
        total += 0.4;
    }

    let data_matches = data_type_patterns()
        .iter()
        .filter(|re| re.is_match(&text_a) && re.is_match(&text_b))
        .count();
    if data_matches >= 2 {
        total += 0.3;
    }

    if text_a.contains("unusual activity") && text_b.contains("unusual activity") {
        total += 0.2;
    }

    for pattern in threat_actor_patterns() {
        if pattern.is_match(&text_a) && pattern.is_match(&text_b) {
            total += 0.3;
        }
    }

    total.min(1.0)
}

/// Compute the weighted content score for a pair that already passed the
/// entity gate.
pub fn content_similarity(a: &EnrichedWithRaw, b: &EnrichedWithRaw) -> ScoreBreakdown {
    let title_sim = title_similarity(a, b);
    let desc_sim = description_similarity(a, b);
    let key_terms_sim = key_terms_similarity(a, b);

    let mut date = date_factor(a, b);
    if a.title == b.title {
        date = date.max(0.95);
    }
    let type_factor = if a.event_type == b.event_type { 1.0 } else { 0.7 };

    let mut strong = strong_incident_indicators(a, b);
    strong = strong.max(incident_update_boost(a, b));

    let (score, threshold) = if strong >= 0.8 {
        (
            (title_sim * 0.2 + desc_sim.max(0.3) * 0.1 + key_terms_sim * 0.5 + strong * 0.2)
                * date,
            0.60,
        )
    } else {
        (
            (title_sim * 0.3 + desc_sim * 0.2 + key_terms_sim * 0.4 + type_factor * 0.1) * date,
            0.70,
        )
    };

    ScoreBreakdown {
        title_similarity: title_sim,
        description_similarity: desc_sim,
        key_terms_similarity: key_terms_sim,
        date_factor: date,
        type_factor,
        strong_indicators: strong,
        score,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    pub(crate) fn event(title: &str, description: &str, date: Option<NaiveDate>) -> EnrichedWithRaw {
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
            victim_organization_name: None,
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

    #[test]
    fn generic_summaries_of_same_period_match() {
        let a = event(
            "Multiple Australian organisations hit by data breaches in June 2023",
            "OAIC notifications rose as ransomware campaigns targeted australian business",
            None,
        );
        let b = event(
            "Several breaches reported across Australia, June 2023 roundup",
            "The australian information commissioner logged ransomware incident reports",
            None,
        );
        assert!(are_both_generic_summaries(&a, &b));

        let c = event("Optus data breach", "Optus confirmed a breach", None);
        assert!(!are_both_generic_summaries(&a, &c));
    }

    #[test]
    fn structured_attack_methods_split_different_incidents() {
        let mut a = event(
            "Optus data breach 2020",
            "White Pages directory disclosure in 2020 affected customers",
            NaiveDate::from_ymd_opt(2020, 3, 1),
        );
        let mut b = event(
            "Optus data breach 2022",
            "API coding error in 2022 exposed customers",
            NaiveDate::from_ymd_opt(2022, 9, 22),
        );
        a.records_affected = Some(50_000);
        b.records_affected = Some(2_100_000);
        a.attack_method = Some("directory disclosure".to_string());
        b.attack_method = Some("unauthenticated api".to_string());
        assert!(are_different_incidents(&a, &b));

        // Similar scale is never "different incidents".
        b.records_affected = Some(60_000);
        assert!(!are_different_incidents(&a, &b));
    }

    #[test]
    fn date_factor_follows_the_ladder() {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let factors = [
            (0i64, 1.0),
            (5, 0.98),
            (20, 0.90),
            (60, 0.80),
            (120, 0.70),
            (300, 0.60),
        ];
        for (days, expected) in factors {
            let a = event("t", "d", Some(base));
            let b = event("t2", "d2", base.checked_add_signed(chrono::Duration::days(days)));
            assert_eq!(date_factor(&a, &b), expected, "at {days} days");
        }
        let a = event("t", "d", Some(base));
        let b = event("t", "d", None);
        assert_eq!(date_factor(&a, &b), 0.8);
    }

    #[test]
    fn identical_titles_floor_the_date_factor() {
        let a = event("Qantas contact centre breach", "d", NaiveDate::from_ymd_opt(2022, 1, 1));
        let b = event("Qantas contact centre breach", "d", NaiveDate::from_ymd_opt(2024, 1, 1));
        let breakdown = content_similarity(&a, &b);
        assert!(breakdown.date_factor >= 0.95);
    }

    #[test]
    fn truncated_titles_boost_similarity() {
        let a = event("Medibank confirms data breach affecting customers", "d", None);
        let b = event("Medibank confirms data breach", "d", None);
        let breakdown = content_similarity(&a, &b);
        assert!(breakdown.title_similarity >= 0.9);
    }

    #[test]
    fn strong_indicators_switch_to_lenient_weighting() {
        let body_a = "Attackers accessed the airline contact centre through a third-party \
platform on June 30. Email addresses, phone numbers and frequent flyer details \
were exposed after unusual activity was detected.";
        let body_b = "The carrier said its contact centre was breached via a third-party \
platform on June 30, exposing email addresses, phone numbers and frequent flyer \
numbers. Unusual activity was detected the same day.";
        let a = event("Qantas cyber attack exposes customer data", body_a,
            NaiveDate::from_ymd_opt(2025, 6, 30));
        let b = event("Qantas contact centre incident", body_b,
            NaiveDate::from_ymd_opt(2025, 7, 2));
        let breakdown = content_similarity(&a, &b);
        assert!(breakdown.strong_indicators >= 0.8);
        assert_eq!(breakdown.threshold, 0.60);
        assert!(breakdown.passes());
    }

    #[test]
    fn distant_dates_with_weak_signals_fail() {
        // Same victim, same attack type, 120 days apart, thin descriptions:
        // the 0.70 factor drags a weak score under threshold.
        let a = event(
            "Acme Corp data breach",
            "Acme Corp reported a data breach.",
            NaiveDate::from_ymd_opt(2024, 1, 10),
        );
        let b = event(
            "Acme Corp discloses incident",
            "An incident at Acme Corp was disclosed to the regulator.",
            NaiveDate::from_ymd_opt(2024, 5, 9),
        );
        let breakdown = content_similarity(&a, &b);
        assert_eq!(breakdown.date_factor, 0.70);
        assert!(!breakdown.passes());
    }
}
