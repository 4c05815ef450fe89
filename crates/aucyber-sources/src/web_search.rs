//! Collector over a paged custom web search capability.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use aucyber_core::{CyberEventType, DataSourceConfig, DateRange, RawEventDraft, SourceType};
use aucyber_llm::ServiceRateLimiter;

use crate::error::SourceError;
use crate::filter::ProgressiveFilter;
use crate::source::{DataSource, SourceInfo};

/// One result from the search capability.
#[derive(Debug, Clone)]
pub struct WebSearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// Paged web search, injected at startup.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Fetch one page of results; `start_index` is 1-based.
    async fn search(&self, query: &str, start_index: u32)
        -> Result<Vec<WebSearchResult>, SourceError>;
}

/// Google Custom Search JSON API client.
#[derive(Debug)]
pub struct GoogleCseClient {
    api_key: String,
    cx: String,
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

impl GoogleCseClient {
    pub fn new(api_key: &str, cx: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            cx: cx.to_string(),
            client: reqwest::Client::new(),
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
        }
    }
}

#[async_trait]
impl WebSearch for GoogleCseClient {
    async fn search(
        &self,
        query: &str,
        start_index: u32,
    ) -> Result<Vec<WebSearchResult>, SourceError> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(Duration::from_secs(30))
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cx.as_str()),
                ("q", query),
                ("start", &start_index.to_string()),
                ("num", "10"),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SourceError::Auth(format!("search API returned {status}")));
        }
        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(SourceError::Http(format!("search API returned {status}")));
        }

        let body: CseResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        Ok(body
            .items
            .into_iter()
            .map(|item| WebSearchResult {
                title: item.title,
                link: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}

/// Query templates covering Australian cyber phrasings.
const QUERY_TEMPLATES: &[&str] = &[
    "Australia data breach {window}",
    "Australian company cyber attack {window}",
    "ransomware attack Australia {window}",
    "Australian organisation hacked {window}",
    "OAIC notifiable data breach {window}",
];

const PAGES_PER_QUERY: u32 = 2;

pub struct WebSearchCollector {
    search: Arc<dyn WebSearch>,
    config: DataSourceConfig,
    filter: Arc<ProgressiveFilter>,
    rate_limiter: Arc<ServiceRateLimiter>,
    configured: bool,
}

impl WebSearchCollector {
    pub fn new(
        search: Arc<dyn WebSearch>,
        config: DataSourceConfig,
        filter: Arc<ProgressiveFilter>,
        rate_limiter: Arc<ServiceRateLimiter>,
        configured: bool,
    ) -> Self {
        Self {
            search,
            config,
            filter,
            rate_limiter,
            configured,
        }
    }

    /// Australian-relevance gate applied during normalisation: `.au`
    /// domains pass outright, anything else needs a country keyword in
    /// title or snippet.
    fn is_australian_result(result: &WebSearchResult) -> bool {
        let domain_au = url::Url::parse(&result.link)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.ends_with(".au")))
            .unwrap_or(false);
        if domain_au {
            return true;
        }
        let text = format!("{} {}", result.title, result.snippet).to_lowercase();
        text.contains("australia") || text.contains("australian")
    }

    fn result_to_draft(&self, result: &WebSearchResult, query: &str) -> Option<RawEventDraft> {
        if !Self::is_australian_result(result) {
            return None;
        }
        let decision = self
            .filter
            .should_discover(&result.title, &result.snippet, &result.link);
        if !decision.is_cyber_relevant {
            return None;
        }

        Some(RawEventDraft {
            source_type: SourceType::WebSearch,
            source_event_id: None,
            title: result.title.clone(),
            description: result.snippet.clone(),
            content: None,
            event_date: None,
            source_url: Some(result.link.clone()),
            metadata: serde_json::json!({
                "query": query,
                "event_type": CyberEventType::from_title(&result.title).as_str(),
            }),
        })
    }
}

#[async_trait]
impl DataSource for WebSearchCollector {
    fn name(&self) -> &'static str {
        "web-search"
    }

    fn source_type(&self) -> SourceType {
        SourceType::WebSearch
    }

    fn rate_limit_key(&self) -> &'static str {
        "web-search"
    }

    fn validate_config(&self) -> bool {
        if !self.configured {
            tracing::error!("WEBSEARCH_API_KEY/WEBSEARCH_CX not set, disabling web-search collector");
            return false;
        }
        self.config.enabled
    }

    async fn collect(&self, range: &DateRange) -> Result<Vec<RawEventDraft>, SourceError> {
        let window = format!(
            "{} to {}",
            range.start.format("%B %Y"),
            range.end_or_today().format("%B %Y")
        );

        let mut drafts = Vec::new();
        for template in QUERY_TEMPLATES {
            let query = template.replace("{window}", &window);
            for page in 0..PAGES_PER_QUERY {
                self.rate_limiter.wait(self.rate_limit_key()).await;
                let start_index = page * 10 + 1;
                match self.search.search(&query, start_index).await {
                    Ok(results) => {
                        if results.is_empty() {
                            break;
                        }
                        drafts.extend(
                            results
                                .iter()
                                .filter_map(|r| self.result_to_draft(r, &query)),
                        );
                    }
                    Err(error) if error.is_fatal_for_run() => return Err(error),
                    Err(error) => {
                        tracing::warn!(query = %query, page, error = %error, "web-search page failed");
                        break;
                    }
                }
            }
        }

        tracing::info!(kept = drafts.len(), "Web-search collection complete");
        Ok(drafts)
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            name: "Custom web search",
            description: "Paged web search over Australian cyber phrasings",
            update_frequency: "on demand",
            coverage: "Open web, filtered to Australian results",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSearch(Vec<WebSearchResult>);

    #[async_trait]
    impl WebSearch for FixedSearch {
        async fn search(
            &self,
            _query: &str,
            start_index: u32,
        ) -> Result<Vec<WebSearchResult>, SourceError> {
            if start_index == 1 {
                Ok(self.0.clone())
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn result(title: &str, link: &str, snippet: &str) -> WebSearchResult {
        WebSearchResult {
            title: title.to_string(),
            link: link.to_string(),
            snippet: snippet.to_string(),
        }
    }

    #[test]
    fn au_tld_passes_without_country_keyword() {
        assert!(WebSearchCollector::is_australian_result(&result(
            "Hospital network hit by ransomware",
            "https://www.itnews.com.au/news/123",
            "Systems encrypted overnight.",
        )));
        assert!(!WebSearchCollector::is_australian_result(&result(
            "Hospital network hit by ransomware",
            "https://www.bbc.co.uk/news/123",
            "Systems encrypted overnight.",
        )));
        assert!(WebSearchCollector::is_australian_result(&result(
            "Australian hospital network hit by ransomware",
            "https://www.bbc.co.uk/news/123",
            "Systems encrypted overnight.",
        )));
    }

    #[tokio::test]
    async fn collect_filters_non_cyber_and_foreign_results() {
        let collector = WebSearchCollector::new(
            Arc::new(FixedSearch(vec![
                result(
                    "Optus data breach exposes customer records",
                    "https://www.abc.net.au/news/optus",
                    "Millions of Australians affected.",
                ),
                result(
                    "Sydney festival program announced",
                    "https://www.smh.com.au/culture/festival",
                    "Concerts across the harbour.",
                ),
                result(
                    "US retailer hacked",
                    "https://www.example.com/us-retail",
                    "No Australian link.",
                ),
            ])),
            DataSourceConfig::default(),
            Arc::new(ProgressiveFilter::new()),
            Arc::new(ServiceRateLimiter::with_default_limits()),
            true,
        );

        let range = DateRange::for_month(2024, 6).unwrap();
        let drafts = collector.collect(&range).await.unwrap();
        // One Australian cyber result, repeated across the 5 query templates.
        assert!(!drafts.is_empty());
        assert!(drafts
            .iter()
            .all(|d| d.title.contains("Optus")));
    }
}
