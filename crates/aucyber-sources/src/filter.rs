//! Two-stage progressive filter gating obvious non-cyber noise.
//!
//! Stage one runs at discovery over title/description/URL, before anything
//! is stored or scraped. Stage two runs after scraping, against full
//! content, where a single keyword hit is no longer enough. Both stages
//! err permissive: when in doubt the event flows on and the enrichment
//! pipeline makes the call.

use std::sync::atomic::{AtomicU64, Ordering};

/// Terms that indicate cyber-security relevance.
const CYBER_TERMS: &[&str] = &[
    "data breach",
    "security breach",
    "cyber breach",
    "ransomware",
    "malware",
    "cyber attack",
    "cyberattack",
    "cyber incident",
    "phishing",
    "ddos",
    "denial of service",
    "credential",
    "hack",
    "hacked",
    "hacker",
    "vulnerability",
    "exploit",
    "data leak",
    "compromised",
    "exfiltrat",
];

/// Terms that mark obvious non-cyber noise in event feeds.
const EXCLUSION_TERMS: &[&str] = &[
    "firework",
    "celebration",
    "new year",
    "holiday",
    "festival",
    "concert",
    "sports",
    "football",
    "cricket",
    "election",
    "referendum",
];

/// Outcome of one filter decision.
#[derive(Debug, Clone)]
pub struct FilterDecision {
    pub is_cyber_relevant: bool,
    pub confidence_score: f64,
    pub reasoning: Vec<String>,
}

/// Shared filter with per-stage statistics.
#[derive(Debug, Default)]
pub struct ProgressiveFilter {
    discovery_passed: AtomicU64,
    discovery_rejected: AtomicU64,
    content_passed: AtomicU64,
    content_rejected: AtomicU64,
}

impl ProgressiveFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovery-stage gate over title/description/URL.
    pub fn should_discover(&self, title: &str, description: &str, url: &str) -> FilterDecision {
        let text = format!("{} {} {}", title, description, url).to_lowercase();
        let mut reasoning = Vec::new();

        let excluded: Vec<&str> = EXCLUSION_TERMS
            .iter()
            .filter(|term| text.contains(**term))
            .copied()
            .collect();
        let hits: Vec<&str> = CYBER_TERMS
            .iter()
            .filter(|term| text.contains(**term))
            .copied()
            .collect();

        if !excluded.is_empty() && hits.is_empty() {
            reasoning.push(format!("excluded terms: {}", excluded.join(", ")));
            self.discovery_rejected.fetch_add(1, Ordering::Relaxed);
            return FilterDecision {
                is_cyber_relevant: false,
                confidence_score: 0.1,
                reasoning,
            };
        }

        let score = (hits.len() as f64 * 0.3).min(1.0);
        let relevant = !hits.is_empty();
        if relevant {
            reasoning.push(format!("cyber terms: {}", hits.join(", ")));
            self.discovery_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            reasoning.push("no cyber terms in title/description/url".to_string());
            self.discovery_rejected.fetch_add(1, Ordering::Relaxed);
        }

        FilterDecision {
            is_cyber_relevant: relevant,
            confidence_score: score,
            reasoning,
        }
    }

    /// Post-scrape gate over full content. Requires either a relevant
    /// title or repeated hits in the body.
    pub fn should_process_content(
        &self,
        title: &str,
        content: &str,
        url: &str,
    ) -> FilterDecision {
        let title_decision = self.should_discover(title, "", url);
        let body = content.to_lowercase();
        let body_hits: usize = CYBER_TERMS
            .iter()
            .map(|term| body.matches(term).count())
            .sum();

        let relevant = title_decision.is_cyber_relevant || body_hits >= 3;
        let score = (title_decision.confidence_score + (body_hits as f64 * 0.1).min(0.7)).min(1.0);

        let mut reasoning = title_decision.reasoning;
        reasoning.push(format!("{body_hits} cyber-term hits in content"));

        if relevant {
            self.content_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.content_rejected.fetch_add(1, Ordering::Relaxed);
        }

        FilterDecision {
            is_cyber_relevant: relevant,
            confidence_score: score,
            reasoning,
        }
    }

    /// (discovery passed, discovery rejected, content passed, content rejected)
    pub fn statistics(&self) -> (u64, u64, u64, u64) {
        (
            self.discovery_passed.load(Ordering::Relaxed),
            self.discovery_rejected.load(Ordering::Relaxed),
            self.content_passed.load(Ordering::Relaxed),
            self.content_rejected.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_rejects_fireworks_and_sports() {
        let filter = ProgressiveFilter::new();
        let decision = filter.should_discover(
            "New Year fireworks celebration draws record crowd",
            "Sydney harbour festival",
            "https://news.example.com/nye",
        );
        assert!(!decision.is_cyber_relevant);
    }

    #[test]
    fn discovery_accepts_breach_headlines() {
        let filter = ProgressiveFilter::new();
        let decision = filter.should_discover(
            "Medibank confirms data breach affecting 9.7 million customers",
            "",
            "https://example.com/medibank",
        );
        assert!(decision.is_cyber_relevant);
        assert!(decision.confidence_score > 0.2);
    }

    #[test]
    fn content_stage_needs_repeated_hits_for_vague_titles() {
        let filter = ProgressiveFilter::new();
        let thin = filter.should_process_content(
            "Company statement",
            "We are pleased to announce our quarterly results.",
            "https://example.com/ir",
        );
        assert!(!thin.is_cyber_relevant);

        let solid = filter.should_process_content(
            "Company statement",
            "The ransomware attack encrypted systems. The hack exposed data. \
             A vulnerability was exploited and credentials were compromised.",
            "https://example.com/ir",
        );
        assert!(solid.is_cyber_relevant);
    }

    #[test]
    fn statistics_count_both_stages() {
        let filter = ProgressiveFilter::new();
        filter.should_discover("data breach at Acme", "", "");
        filter.should_discover("flower show", "", "");
        let (passed, rejected, _, _) = filter.statistics();
        assert_eq!((passed, rejected), (1, 1));
    }
}
