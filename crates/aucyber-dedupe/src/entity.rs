//! Primary-entity extraction and similarity: the hard gate in front of
//! every pairwise comparison.

use regex::Regex;
use std::sync::OnceLock;

use crate::text::sequence_ratio;

/// Patterns that pull an organisation name out of a cyber headline, tried
/// in order.
fn title_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^([^:]+(?:Inc|Corp|Ltd|Limited|Company|LLC|Pty|Group|Bank|Insurance|University|College|Hospital|Health|Airways|Telecom))\s*[:\-\s]",
            r"(?i)^([A-Za-z][a-zA-Z\s&]+?)\s+(?:suffers?|confirms?|experiences?|reports?|admits?|reveals?|discloses?|investigates?)",
            r"(?i)^([A-Za-z][a-zA-Z\s&]+?)\s+(?:cyber|data\s+breach|hack|attack|incident)",
            r"(?i)^([A-Za-z][a-zA-Z\s&]+?)\s+(?:hit|struck|targeted|affected|impacted)",
            r"(?i)^([A-Za-z][a-zA-Z\s&]+?)\s+held\s+to\s+ransom",
            r"(?i)^([A-Za-z][a-zA-Z\s&]+?)\s+tight-lipped",
            r"(?i)^([A-Za-z][a-zA-Z\s&]+?)\s+shuts?",
            r"(?i)(?:Ransomware\s+Attack\s+on|Attack\s+on)\s+([A-Za-z][a-zA-Z\s&]+?)(?:\s|$)",
            r"(?i)The\s+([A-Za-z][a-zA-Z\s&]+?)\s+hack",
            r"(?i)(?:details\s+of\s+|private\s+details\s+of\s+)?([A-Za-z][a-zA-Z\s&]+?\s+(?:Force|Forces|Department|Ministry|Agency|Service))\s+members?\s+compromised",
            r"(?i)(?:details\s+of\s+)?([A-Za-z][a-zA-Z\s&]+?)\s+(?:members?|employees?|customers?|staff|personnel)\s+(?:compromised|affected|exposed)",
            r"(?i)(?:data\s+breach|breach|incident)\s+involving\s+([A-Za-z][a-zA-Z\s&]+?)(?:\s|,|\.|$)",
            r"(?i)\b([A-Za-z][a-zA-Z\s&]+?)\s+(?:data\s+breach|breach|cyber\s+attack|attack)",
            r"(?i)^([A-Za-z][a-zA-Z\s&]+?)\s+facing\s+(?:class\s+action|lawsuit|legal\s+action)",
            r"(?i)([A-Za-z][a-zA-Z\s&]+?)\s+(?:Contact\s+Centre|Call\s+Center|Contact\s+Center)",
            r"(?i)^([A-Za-z][a-zA-Z\s&]+?)\s+(?:Security\s+Incident|Privacy\s+Incident)",
            r"(?i)^([A-Za-z][a-zA-Z\s&]{2,15}?)\s*[:\-–]\s*(?:Security|Data|Breach|Incident|Cyber|Privacy|FAQ)",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("static regex"))
        .collect()
    })
}

/// Corporate suffixes dropped before comparing names.
const CORPORATE_SUFFIXES: &[&str] = &[
    "group", "company", "corp", "corporation", "inc", "incorporated", "ltd", "limited", "llc",
    "pty", "bank", "insurance", "holding", "holdings",
];

/// Known alias table: abbreviation to full name. Compiled in; updates ship
/// with a release.
const KNOWN_ALIASES: &[(&str, &str)] = &[
    ("boa", "bank of america"),
    ("bofa", "bank of america"),
    ("jpmc", "jpmorgan chase"),
    ("jpm", "jpmorgan"),
    ("anz", "australia and new zealand banking group"),
    ("nab", "national australia bank"),
    ("cba", "commonwealth bank"),
    ("westpac", "westpac banking corporation"),
];

/// Words skipped when building acronyms.
const ACRONYM_STOPWORDS: &[&str] = &["of", "the", "and", "for", "in", "on", "at", "to", "a", "an"];

const ORG_INDICATORS: &[&str] = &[
    "inc", "corp", "ltd", "limited", "company", "llc", "pty", "group", "bank", "insurance",
    "university", "college", "hospital", "health", "airways", "telecom", "technologies",
];

/// Extract the organisation name from a headline. Returns `None` when no
/// pattern matches and the conservative fallbacks find nothing
/// organisation-shaped.
pub fn extract_entity_from_title(title: &str) -> Option<String> {
    for pattern in title_patterns() {
        if let Some(captures) = pattern.captures(title) {
            if let Some(entity) = captures.get(1) {
                if let Some(cleaned) = clean_extracted_entity(entity.as_str()) {
                    return Some(cleaned);
                }
            }
        }
    }

    // Fallback: a leading span ending in an organisational indicator.
    let words: Vec<&str> = title.split_whitespace().collect();
    if words.len() >= 2 {
        for i in 0..words.len().min(4) {
            let word = words[i].to_lowercase();
            if ORG_INDICATORS.iter().any(|ind| word.contains(ind)) {
                return Some(words[..=i].join(" "));
            }
        }
        // Two leading proper nouns look enough like a name.
        let proper = |w: &str| {
            w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false) && w.len() > 2
        };
        if proper(words[0]) && proper(words[1]) {
            return Some(words[..2].join(" "));
        }
    }
    None
}

/// Attack nouns that headline patterns sometimes capture in place of a
/// name.
const NON_ENTITY_WORDS: &[&str] = &[
    "ransomware", "cyber", "data", "breach", "attack", "phishing", "malware", "hack",
    "exclusive", "breaking", "multiple", "several",
];

fn clean_extracted_entity(raw: &str) -> Option<String> {
    let mut cleaned = Regex::new(r"(?i)^(Exclusive|Breaking):\s*")
        .expect("static regex")
        .replace(raw.trim(), "")
        .trim()
        .to_string();
    if let Some(rest) = cleaned.strip_prefix("The ") {
        cleaned = rest.to_string();
    }
    if cleaned.is_empty()
        || NON_ENTITY_WORDS.contains(&cleaned.to_lowercase().as_str())
        || !cleaned.chars().any(|c| c.is_uppercase())
    {
        return None;
    }
    Some(cleaned)
}

fn normalize_entity(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();
    while words
        .last()
        .is_some_and(|w| CORPORATE_SUFFIXES.contains(w))
    {
        words.pop();
    }
    let filtered: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !CORPORATE_SUFFIXES.contains(w))
        .collect();
    if filtered.is_empty() {
        words.join(" ")
    } else {
        filtered.join(" ")
    }
}

fn acronym_of(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| w.len() > 1 && !ACRONYM_STOPWORDS.contains(&w.to_lowercase().as_str()))
        .filter_map(|w| w.chars().next())
        .collect()
}

/// Acronym match: one side short, the other long, initials line up.
fn acronym_similarity(name1: &str, name2: &str) -> f64 {
    let check = |short: &str, long: &str| -> bool {
        short.len() <= 5 && long.len() > 10 && short.replace(' ', "") == acronym_of(long)
    };
    if check(name1, name2) || check(name2, name1) {
        0.98
    } else {
        0.0
    }
}

/// Entity similarity: the maximum of exact match, acronym match, alias
/// match, containment, and normalised sequence similarity.
pub fn entity_similarity(entity1: &str, entity2: &str) -> f64 {
    let lower1 = entity1.to_lowercase().trim().to_string();
    let lower2 = entity2.to_lowercase().trim().to_string();

    if lower1 == lower2 {
        return 1.0;
    }

    let acronym = acronym_similarity(&lower1, &lower2);
    if acronym > 0.9 {
        return acronym;
    }

    for (abbrev, full_name) in KNOWN_ALIASES {
        if (lower1.contains(abbrev) && lower2.contains(full_name))
            || (lower2.contains(abbrev) && lower1.contains(full_name))
        {
            return 0.95;
        }
    }

    let normalized1 = normalize_entity(&lower1);
    let normalized2 = normalize_entity(&lower2);

    // "Toll" vs "Toll Group" and friends.
    if !normalized1.is_empty()
        && !normalized2.is_empty()
        && (normalized1.contains(&normalized2) || normalized2.contains(&normalized1))
    {
        return 0.95;
    }
    if normalized1 == normalized2 {
        return 0.95;
    }

    sequence_ratio(&normalized1, &normalized2).max(sequence_ratio(&lower1, &lower2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headline_patterns_find_the_victim() {
        assert_eq!(
            extract_entity_from_title("Optus suffers massive data breach").as_deref(),
            Some("Optus")
        );
        assert_eq!(
            extract_entity_from_title("Toll Group hit by ransomware again").as_deref(),
            Some("Toll Group")
        );
        assert_eq!(
            extract_entity_from_title("Ransomware Attack on Frontier").as_deref(),
            Some("Frontier")
        );
        assert_eq!(
            extract_entity_from_title("The Medibank hack explained").as_deref(),
            Some("Medibank")
        );
    }

    #[test]
    fn vague_titles_extract_nothing() {
        assert_eq!(extract_entity_from_title("lessons from recent incidents"), None);
    }

    #[test]
    fn alias_table_links_anz_to_full_name() {
        let similarity = entity_similarity(
            "ANZ Bank",
            "Australia and New Zealand Banking Group",
        );
        assert!(similarity >= 0.95);
        assert!(entity_similarity("CBA", "Commonwealth Bank") >= 0.95);
    }

    #[test]
    fn suffix_stripped_containment_scores_high() {
        assert!(entity_similarity("Toll", "Toll Group") >= 0.95);
        assert!(entity_similarity("Medibank Private Limited", "Medibank") >= 0.95);
    }

    #[test]
    fn acronyms_match_their_expansions() {
        assert!(entity_similarity("FBI", "Federal Bureau of Investigation") >= 0.95);
    }

    #[test]
    fn unrelated_entities_score_low() {
        assert!(entity_similarity("Optus", "Medibank Private") < 0.7);
        assert!(entity_similarity("Qantas", "Woolworths Group") < 0.7);
    }
}
