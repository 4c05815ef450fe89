//! Collector over a CAMEO-coded global events store.
//!
//! The columnar store itself is an injected capability
//! ([`NewsEventsQuery`]); this adapter owns the query shape (Australian
//! country filter, cyber keyword and exclusion sets, multi-source
//! corroboration) and the deterministic mapping from provider event codes
//! to the internal incident-type enum.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use aucyber_core::{
    CyberEventType, DataSourceConfig, DateRange, RawEventDraft, SourceType,
};
use aucyber_llm::ServiceRateLimiter;

use crate::error::SourceError;
use crate::filter::ProgressiveFilter;
use crate::source::{DataSource, SourceInfo};

/// Keyword set the provider query must cover.
pub const CYBER_KEYWORDS: &[&str] = &[
    "data breach",
    "cyber breach",
    "security breach",
    "ransomware",
    "malware",
    "cyber attack",
    "cyberattack",
    "phishing",
    "ddos",
    "credential",
    "hack",
    "vulnerability",
    "exploit",
];

/// Exclusion set filtering obvious non-cyber event codes.
pub const EXCLUSION_KEYWORDS: &[&str] = &[
    "firework",
    "celebration",
    "new year",
    "holiday",
    "festival",
    "concert",
    "sports",
    "election",
];

/// Event-code prefixes with cyber meaning in the CAMEO taxonomy.
pub const CYBER_EVENT_CODE_PREFIXES: &[&str] = &["141", "172", "210"];

/// Minimum corroborating sources before a hit is credible.
pub const MIN_SOURCES: u32 = 2;

/// One hit from the events store.
#[derive(Debug, Clone)]
pub struct NewsHit {
    pub external_id: String,
    pub actor1_name: Option<String>,
    pub actor2_name: Option<String>,
    pub event_code: String,
    pub source_url: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub num_sources: u32,
    pub location_name: Option<String>,
    pub australian: bool,
}

/// Query parameters handed to the injected store client.
#[derive(Debug, Clone)]
pub struct NewsQuerySpec {
    pub range: DateRange,
    pub country_code: String,
    pub keywords: Vec<String>,
    pub exclusions: Vec<String>,
    pub event_code_prefixes: Vec<String>,
    pub min_sources: u32,
    pub max_records: usize,
}

/// Columnar event data access, injected at startup.
#[async_trait]
pub trait NewsEventsQuery: Send + Sync {
    async fn query(&self, spec: &NewsQuerySpec) -> Result<Vec<NewsHit>, SourceError>;
}

/// Reference implementation over an HTTP gateway in front of the columnar
/// store. The gateway takes the query spec as JSON and returns hits in the
/// shape of [`NewsHit`].
#[derive(Debug)]
pub struct HttpNewsEventsQuery {
    endpoint: String,
    project: String,
    client: reqwest::Client,
}

#[derive(Debug, serde::Serialize)]
struct GatewayRequest<'a> {
    project: &'a str,
    start_date: String,
    end_date: String,
    country_code: &'a str,
    keywords: &'a [String],
    exclusions: &'a [String],
    event_code_prefixes: &'a [String],
    min_sources: u32,
    max_records: usize,
}

#[derive(Debug, serde::Deserialize)]
struct GatewayHit {
    external_id: String,
    #[serde(default)]
    actor1_name: Option<String>,
    #[serde(default)]
    actor2_name: Option<String>,
    event_code: String,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    event_date: Option<String>,
    #[serde(default)]
    num_sources: u32,
    #[serde(default)]
    location_name: Option<String>,
    #[serde(default)]
    australian: bool,
}

impl HttpNewsEventsQuery {
    pub fn new(endpoint: &str, project: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            project: project.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NewsEventsQuery for HttpNewsEventsQuery {
    async fn query(&self, spec: &NewsQuerySpec) -> Result<Vec<NewsHit>, SourceError> {
        let request = GatewayRequest {
            project: &self.project,
            start_date: spec.range.start.format("%Y-%m-%d").to_string(),
            end_date: spec.range.end_or_today().format("%Y-%m-%d").to_string(),
            country_code: &spec.country_code,
            keywords: &spec.keywords,
            exclusions: &spec.exclusions,
            event_code_prefixes: &spec.event_code_prefixes,
            min_sources: spec.min_sources,
            max_records: spec.max_records,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(std::time::Duration::from_secs(30))
            .json(&request)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SourceError::Auth(format!("events gateway returned {status}")));
        }
        if !status.is_success() {
            return Err(SourceError::Http(format!("events gateway returned {status}")));
        }

        let hits: Vec<GatewayHit> = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|hit| NewsHit {
                external_id: hit.external_id,
                actor1_name: hit.actor1_name,
                actor2_name: hit.actor2_name,
                event_code: hit.event_code,
                source_url: hit.source_url,
                event_date: hit
                    .event_date
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
                num_sources: hit.num_sources,
                location_name: hit.location_name,
                australian: hit.australian,
            })
            .collect())
    }
}

/// Map a CAMEO event code to the internal incident-type enum.
pub fn map_event_code(event_code: &str) -> CyberEventType {
    if event_code.starts_with("172") {
        CyberEventType::StateSponsoredAttack
    } else if event_code.starts_with("210") {
        CyberEventType::InfrastructureAttack
    } else if event_code.starts_with("141") {
        CyberEventType::DataBreach
    } else {
        CyberEventType::Other
    }
}

pub struct NewsEventsCollector {
    query: Arc<dyn NewsEventsQuery>,
    config: DataSourceConfig,
    filter: Arc<ProgressiveFilter>,
    rate_limiter: Arc<ServiceRateLimiter>,
    /// Provider project id (env: NEWSEVENTS_PROJECT)
    project: Option<String>,
}

impl NewsEventsCollector {
    pub fn new(
        query: Arc<dyn NewsEventsQuery>,
        config: DataSourceConfig,
        filter: Arc<ProgressiveFilter>,
        rate_limiter: Arc<ServiceRateLimiter>,
        project: Option<String>,
    ) -> Self {
        Self {
            query,
            config,
            filter,
            rate_limiter,
            project,
        }
    }

    fn hit_to_draft(&self, hit: &NewsHit) -> Option<RawEventDraft> {
        let title = hit
            .actor1_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Cyber event {}", hit.external_id));

        let mut description = String::new();
        if let Some(actor1) = &hit.actor1_name {
            description.push_str(&format!("Event involving {actor1}"));
        }
        if let Some(actor2) = &hit.actor2_name {
            if description.is_empty() {
                description.push_str(&format!("Event involving {actor2}"));
            } else {
                description.push_str(&format!(" and {actor2}"));
            }
        }
        if description.is_empty() {
            description = format!("Cyber event detected (code: {})", hit.event_code);
        }

        let decision = self.filter.should_discover(
            &title,
            &description,
            hit.source_url.as_deref().unwrap_or(""),
        );
        let code_is_cyber = CYBER_EVENT_CODE_PREFIXES
            .iter()
            .any(|prefix| hit.event_code.starts_with(prefix));
        if !decision.is_cyber_relevant && !code_is_cyber {
            tracing::debug!(
                external_id = %hit.external_id,
                score = decision.confidence_score,
                "Discovery filter rejected hit"
            );
            return None;
        }

        Some(RawEventDraft {
            source_type: SourceType::NewsEvents,
            source_event_id: Some(hit.external_id.clone()),
            title,
            description,
            content: None,
            event_date: hit.event_date,
            source_url: hit.source_url.clone(),
            metadata: serde_json::json!({
                "event_code": hit.event_code,
                "event_type": map_event_code(&hit.event_code).as_str(),
                "num_sources": hit.num_sources,
                "location": hit.location_name,
            }),
        })
    }
}

#[async_trait]
impl DataSource for NewsEventsCollector {
    fn name(&self) -> &'static str {
        "news-events"
    }

    fn source_type(&self) -> SourceType {
        SourceType::NewsEvents
    }

    fn rate_limit_key(&self) -> &'static str {
        "news-events"
    }

    fn validate_config(&self) -> bool {
        if self.project.is_none() {
            tracing::error!("NEWSEVENTS_PROJECT not set, disabling news-events collector");
            return false;
        }
        self.config.enabled
    }

    async fn collect(&self, range: &DateRange) -> Result<Vec<RawEventDraft>, SourceError> {
        self.rate_limiter.wait(self.rate_limit_key()).await;

        let spec = NewsQuerySpec {
            range: range.clone(),
            country_code: "AS".to_string(),
            keywords: CYBER_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            exclusions: EXCLUSION_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            event_code_prefixes: CYBER_EVENT_CODE_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_sources: MIN_SOURCES,
            max_records: self.config.max_records,
        };

        let hits = self.query.query(&spec).await?;
        let drafts: Vec<RawEventDraft> = hits
            .iter()
            .filter(|hit| hit.australian && hit.num_sources >= MIN_SOURCES)
            .filter_map(|hit| self.hit_to_draft(hit))
            .collect();

        tracing::info!(
            hits = hits.len(),
            kept = drafts.len(),
            "News-events collection complete"
        );
        Ok(drafts)
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            name: "Global news events store",
            description: "CAMEO-coded global events with Australian cyber focus",
            update_frequency: "15 minutes",
            coverage: "Global events, filtered to Australia",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedQuery(Vec<NewsHit>);

    #[async_trait]
    impl NewsEventsQuery for FixedQuery {
        async fn query(&self, _spec: &NewsQuerySpec) -> Result<Vec<NewsHit>, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn hit(id: &str, actor: &str, code: &str, sources: u32, australian: bool) -> NewsHit {
        NewsHit {
            external_id: id.to_string(),
            actor1_name: Some(actor.to_string()),
            actor2_name: None,
            event_code: code.to_string(),
            source_url: Some(format!("https://news.example.com/{id}")),
            event_date: NaiveDate::from_ymd_opt(2024, 6, 5),
            num_sources: sources,
            location_name: Some("Sydney, New South Wales, Australia".to_string()),
            australian,
        }
    }

    fn collector(hits: Vec<NewsHit>) -> NewsEventsCollector {
        NewsEventsCollector::new(
            Arc::new(FixedQuery(hits)),
            DataSourceConfig::default(),
            Arc::new(ProgressiveFilter::new()),
            Arc::new(ServiceRateLimiter::with_default_limits()),
            Some("project-id".to_string()),
        )
    }

    #[test]
    fn cameo_codes_map_deterministically() {
        assert_eq!(map_event_code("1411"), CyberEventType::DataBreach);
        assert_eq!(map_event_code("1723"), CyberEventType::StateSponsoredAttack);
        assert_eq!(map_event_code("2101"), CyberEventType::InfrastructureAttack);
        assert_eq!(map_event_code("0231"), CyberEventType::Other);
    }

    #[tokio::test]
    async fn collect_keeps_corroborated_australian_cyber_hits() {
        let collector = collector(vec![
            hit("1", "ransomware attack on hospital", "141", 3, true),
            // Under the corroboration floor
            hit("2", "data breach at retailer", "141", 1, true),
            // Not Australian
            hit("3", "cyber attack on utility", "141", 4, false),
            // No cyber signal and a non-cyber code
            hit("4", "trade delegation visit", "042", 5, true),
        ]);

        let range = DateRange::for_month(2024, 6).unwrap();
        let drafts = collector.collect(&range).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].source_event_id.as_deref(), Some("1"));
        assert_eq!(drafts[0].metadata["event_type"], "Data Breach");
    }

    #[tokio::test]
    async fn missing_project_disables_collector() {
        let mut collector = collector(vec![]);
        collector.project = None;
        assert!(!collector.validate_config());
    }
}
