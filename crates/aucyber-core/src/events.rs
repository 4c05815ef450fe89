//! Event and entity types shared across the pipeline tiers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a raw event was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// CAMEO-coded global events store
    NewsEvents,
    /// LLM with web search, prompted per time window
    LlmSearch,
    /// Paged custom web search
    WebSearch,
    /// Privacy-regulator newsroom scrape
    RegulatorScrape,
    /// Curated month-sectioned breach list
    CuratedList,
    /// One-off research query (manual backfill)
    ResearchQuery,
}

impl SourceType {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::NewsEvents => "NewsEvents",
            SourceType::LlmSearch => "LlmSearch",
            SourceType::WebSearch => "WebSearch",
            SourceType::RegulatorScrape => "RegulatorScrape",
            SourceType::CuratedList => "CuratedList",
            SourceType::ResearchQuery => "ResearchQuery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NewsEvents" => Some(SourceType::NewsEvents),
            "LlmSearch" => Some(SourceType::LlmSearch),
            "WebSearch" => Some(SourceType::WebSearch),
            "RegulatorScrape" => Some(SourceType::RegulatorScrape),
            "CuratedList" => Some(SourceType::CuratedList),
            "ResearchQuery" => Some(SourceType::ResearchQuery),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standardized cyber event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyberEventType {
    Ransomware,
    DataBreach,
    Phishing,
    Malware,
    VulnerabilityExploit,
    StateSponsoredAttack,
    SupplyChainAttack,
    InsiderThreat,
    DenialOfService,
    FinancialFraud,
    IdentityTheft,
    InfrastructureAttack,
    Other,
}

impl CyberEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyberEventType::Ransomware => "Ransomware",
            CyberEventType::DataBreach => "Data Breach",
            CyberEventType::Phishing => "Phishing",
            CyberEventType::Malware => "Malware",
            CyberEventType::VulnerabilityExploit => "Vulnerability Exploit",
            CyberEventType::StateSponsoredAttack => "State-Sponsored Attack",
            CyberEventType::SupplyChainAttack => "Supply Chain Attack",
            CyberEventType::InsiderThreat => "Insider Threat",
            CyberEventType::DenialOfService => "Denial of Service",
            CyberEventType::FinancialFraud => "Financial Fraud",
            CyberEventType::IdentityTheft => "Identity Theft",
            CyberEventType::InfrastructureAttack => "Infrastructure Attack",
            CyberEventType::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Ransomware" => CyberEventType::Ransomware,
            "Data Breach" => CyberEventType::DataBreach,
            "Phishing" => CyberEventType::Phishing,
            "Malware" => CyberEventType::Malware,
            "Vulnerability Exploit" => CyberEventType::VulnerabilityExploit,
            "State-Sponsored Attack" => CyberEventType::StateSponsoredAttack,
            "Supply Chain Attack" => CyberEventType::SupplyChainAttack,
            "Insider Threat" => CyberEventType::InsiderThreat,
            "Denial of Service" => CyberEventType::DenialOfService,
            "Financial Fraud" => CyberEventType::FinancialFraud,
            "Identity Theft" => CyberEventType::IdentityTheft,
            "Infrastructure Attack" => CyberEventType::InfrastructureAttack,
            _ => CyberEventType::Other,
        }
    }

    /// Best-effort classification from a headline.
    pub fn from_title(title: &str) -> Self {
        let t = title.to_lowercase();
        if t.contains("ransomware") || t.contains("ransom") {
            CyberEventType::Ransomware
        } else if t.contains("data breach") || t.contains("breach") || t.contains("leak") {
            CyberEventType::DataBreach
        } else if t.contains("ddos") || t.contains("denial of service") {
            CyberEventType::DenialOfService
        } else if t.contains("phishing") || t.contains("email scam") {
            CyberEventType::Phishing
        } else if t.contains("malware") || t.contains("virus") || t.contains("trojan") {
            CyberEventType::Malware
        } else if t.contains("vulnerability") || t.contains("exploit") {
            CyberEventType::VulnerabilityExploit
        } else if t.contains("state-sponsored") || t.contains("nation-state") {
            CyberEventType::StateSponsoredAttack
        } else {
            CyberEventType::Other
        }
    }
}

impl std::fmt::Display for CyberEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSeverity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Critical => "Critical",
            EventSeverity::High => "High",
            EventSeverity::Medium => "Medium",
            EventSeverity::Low => "Low",
            EventSeverity::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => EventSeverity::Critical,
            "high" => EventSeverity::High,
            "medium" => EventSeverity::Medium,
            "low" => EventSeverity::Low,
            _ => EventSeverity::Unknown,
        }
    }
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an enriched or deduplicated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Active,
    Superseded,
    Rejected,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Active => "Active",
            EventStatus::Superseded => "Superseded",
            EventStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Superseded" => EventStatus::Superseded,
            "Rejected" => EventStatus::Rejected,
            _ => EventStatus::Active,
        }
    }
}

/// Kind of a named entity referenced by incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Government,
    Business,
    NotForProfit,
    Individual,
    ThreatActor,
    Other,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Government => "government",
            EntityKind::Business => "business",
            EntityKind::NotForProfit => "not-for-profit",
            EntityKind::Individual => "individual",
            EntityKind::ThreatActor => "threat-actor",
            EntityKind::Other => "other",
        }
    }
}

/// Role a contributor plays inside a deduplication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributionType {
    Primary,
    Supporting,
    Duplicate,
}

impl ContributionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionType::Primary => "primary",
            ContributionType::Supporting => "supporting",
            ContributionType::Duplicate => "duplicate",
        }
    }
}

/// A normalised discovery record before it has a database identity.
///
/// Collectors produce these; the store turns them into [`RawEvent`] rows,
/// silently skipping drafts whose `(source_type, source_url, title)` key
/// already exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEventDraft {
    pub source_type: SourceType,
    /// External ID from the source system, if it has one
    pub source_event_id: Option<String>,
    pub title: String,
    pub description: String,
    /// Full scraped content when the collector already fetched it
    pub content: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub source_url: Option<String>,
    /// Source-specific extras, kept verbatim for provenance
    pub metadata: serde_json::Value,
}

impl RawEventDraft {
    pub fn new(source_type: SourceType, title: impl Into<String>) -> Self {
        Self {
            source_type,
            source_event_id: None,
            title: title.into(),
            description: String::new(),
            content: None,
            event_date: None,
            source_url: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// Immutable discovery record. Created by a collector, mutated only to set
/// processing status or late-fetched content, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub raw_event_id: Uuid,
    pub source_type: SourceType,
    pub source_event_id: Option<String>,
    pub title: String,
    pub description: String,
    pub content: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub source_url: Option<String>,
    pub source_metadata: serde_json::Value,
    pub discovered_at: DateTime<Utc>,
    pub is_processed: bool,
    pub processing_attempted_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,
}

impl RawEvent {
    /// Whether the record carries enough signal for the enrichment pipeline:
    /// a URL, or a title plus a non-trivial description.
    pub fn is_enrichable(&self) -> bool {
        self.source_url.is_some() || (!self.title.is_empty() && self.description.len() > 40)
    }
}

/// Structured incident with provenance to exactly one [`RawEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub enriched_event_id: Uuid,
    pub raw_event_id: Uuid,
    pub title: String,
    pub description: String,
    pub summary: Option<String>,
    pub event_type: CyberEventType,
    pub severity: EventSeverity,
    pub event_date: Option<NaiveDate>,
    pub records_affected: Option<i64>,
    pub victim_organization_name: Option<String>,
    pub victim_organization_industry: Option<String>,
    pub attacking_entity_name: Option<String>,
    pub attack_method: Option<String>,
    pub is_australian_event: bool,
    pub is_specific_event: bool,
    pub confidence_score: f64,
    pub australian_relevance_score: f64,
    pub perplexity_validated: bool,
    pub perplexity_enrichment_data: Option<serde_json::Value>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical incident: one per distinct real-world event, aggregating all
/// contributing raw and enriched records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicatedEvent {
    pub deduplicated_event_id: Uuid,
    pub master_enriched_event_id: Uuid,
    pub title: String,
    pub description: String,
    pub summary: Option<String>,
    pub event_type: CyberEventType,
    pub severity: EventSeverity,
    pub event_date: Option<NaiveDate>,
    pub records_affected: Option<i64>,
    pub victim_organization_name: Option<String>,
    pub victim_organization_industry: Option<String>,
    pub attacking_entity_name: Option<String>,
    pub attack_method: Option<String>,
    pub is_australian_event: bool,
    pub is_specific_event: bool,
    pub confidence_score: f64,
    pub australian_relevance_score: f64,
    pub total_data_sources: i64,
    pub contributing_raw_events: i64,
    pub contributing_enriched_events: i64,
    /// Mean pairwise title similarity inside the cluster
    pub similarity_score: f64,
    pub deduplication_method: String,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Named organization / person / threat actor referenced by incidents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: Uuid,
    pub entity_name: String,
    pub entity_type: EntityKind,
    pub industry: Option<String>,
    pub turnover: Option<f64>,
    pub employee_count: Option<i64>,
    pub is_australian: bool,
    pub headquarters_location: Option<String>,
    pub website_url: Option<String>,
    pub confidence_score: f64,
}

/// A consolidated data source attached to a deduplicated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    pub source_url: String,
    pub source_type: SourceType,
    pub credibility_score: f64,
    pub content_snippet: Option<String>,
    pub discovered_at: Option<DateTime<Utc>>,
}

/// An Active enriched event joined with its owning raw event, the unit the
/// deduplication engine works over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedWithRaw {
    pub enriched_event_id: Uuid,
    pub raw_event_id: Uuid,
    pub title: String,
    pub description: String,
    pub summary: Option<String>,
    pub event_type: CyberEventType,
    pub severity: EventSeverity,
    pub event_date: Option<NaiveDate>,
    pub records_affected: Option<i64>,
    pub victim_organization_name: Option<String>,
    pub victim_organization_industry: Option<String>,
    pub attacking_entity_name: Option<String>,
    pub attack_method: Option<String>,
    pub is_australian_event: bool,
    pub is_specific_event: bool,
    pub confidence_score: f64,
    pub australian_relevance_score: f64,
    pub created_at: DateTime<Utc>,
    pub source_url: Option<String>,
    pub source_type: SourceType,
    pub discovered_at: DateTime<Utc>,
}
