//! Collector prompting an LLM-with-web-search capability per time window.
//!
//! Each calendar month in the requested range gets a templated prompt
//! demanding a JSON response matching a fixed event schema. Auth failures
//! disable the source for the run; rate-limit and server errors retry with
//! backoff and feed the circuit breaker.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;

use aucyber_core::{DataSourceConfig, DateRange, RawEventDraft, SourceType};
use aucyber_llm::{classify, CircuitBreaker, ErrorClass, RetryPolicy, SearchProvider, ServiceRateLimiter};

use crate::error::SourceError;
use crate::source::{DataSource, SourceInfo};

/// Fixed response schema the prompt demands.
#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    events: Vec<SearchEvent>,
}

#[derive(Debug, Deserialize)]
struct SearchEvent {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

pub struct LlmSearchCollector {
    search: Arc<dyn SearchProvider>,
    config: DataSourceConfig,
    rate_limiter: Arc<ServiceRateLimiter>,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
    configured: bool,
}

impl LlmSearchCollector {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        config: DataSourceConfig,
        rate_limiter: Arc<ServiceRateLimiter>,
        breaker: Arc<CircuitBreaker>,
        configured: bool,
    ) -> Self {
        Self {
            search,
            config,
            rate_limiter,
            breaker,
            policy: RetryPolicy::default(),
            configured,
        }
    }

    fn month_windows(range: &DateRange) -> Vec<(i32, u32)> {
        let mut windows = Vec::new();
        let end = range.end_or_today();
        let mut year = range.start.year();
        let mut month = range.start.month();
        loop {
            windows.push((year, month));
            if (year, month) >= (end.year(), end.month()) {
                break;
            }
            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }
        windows
    }

    fn window_prompt(year: i32, month: u32) -> String {
        let month_name = NaiveDate::from_ymd_opt(year, month, 1)
            .map(|d| d.format("%B %Y").to_string())
            .unwrap_or_else(|| format!("{year}-{month:02}"));
        format!(
            "Search for Australian cyber security incidents that occurred or were \
disclosed during {month_name}: data breaches, ransomware attacks, phishing \
campaigns, DDoS attacks, and credential theft affecting Australian \
organisations or Australian citizens' data.\n\n\
Respond with ONLY a JSON object in this exact shape:\n\
{{\n  \"events\": [\n    {{\n      \"title\": \"headline naming the victim organisation\",\n      \"description\": \"2-3 sentence factual summary\",\n      \"organization\": \"victim organisation name or null\",\n      \"event_type\": \"Ransomware|Data Breach|Phishing|Malware|Denial of Service|Other\",\n      \"date\": \"YYYY-MM-DD or null\",\n      \"url\": \"source article URL or null\"\n    }}\n  ]\n}}\n\n\
Rules: only confirmed incidents with a named victim; no general commentary, \
statistics roundups, or advice articles; one entry per distinct incident; \
prefer Australian news sources for the url field."
        )
    }

    async fn search_window(&self, year: i32, month: u32) -> Result<Vec<RawEventDraft>, SourceError> {
        if self.breaker.should_skip().await {
            tracing::warn!(year, month, "Circuit open, skipping llm-search window");
            return Ok(Vec::new());
        }

        let prompt = Self::window_prompt(year, month);
        let mut attempt = 0u32;
        let value = loop {
            attempt += 1;
            self.rate_limiter.wait(self.rate_limit_key()).await;
            match self.search.search_json(&prompt).await {
                Ok(value) => {
                    self.breaker.record_success().await;
                    break value;
                }
                Err(error) => {
                    let class = classify(&error);
                    if class == ErrorClass::Auth {
                        // Bad credentials stop the whole source, not the window.
                        return Err(SourceError::Auth(error.to_string()));
                    }
                    if !class.is_retryable() {
                        return Err(SourceError::Provider(error));
                    }
                    self.breaker.record_failure().await;
                    if attempt > self.policy.max_retries || self.breaker.should_skip().await {
                        return Err(SourceError::Provider(error));
                    }
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                }
            }
        };

        let results: SearchResults = serde_json::from_value(value)
            .map_err(|e| SourceError::Parse(format!("event schema mismatch: {e}")))?;

        Ok(results
            .events
            .into_iter()
            .filter(|event| !event.title.is_empty())
            .map(|event| RawEventDraft {
                source_type: SourceType::LlmSearch,
                source_event_id: None,
                event_date: event
                    .date
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
                source_url: event.url.clone(),
                metadata: serde_json::json!({
                    "organization": event.organization,
                    "event_type": event.event_type,
                    "window": format!("{year}-{month:02}"),
                }),
                title: event.title,
                description: event.description,
                content: None,
            })
            .collect())
    }
}

#[async_trait]
impl DataSource for LlmSearchCollector {
    fn name(&self) -> &'static str {
        "llm-search"
    }

    fn source_type(&self) -> SourceType {
        SourceType::LlmSearch
    }

    fn rate_limit_key(&self) -> &'static str {
        "llm-search"
    }

    fn validate_config(&self) -> bool {
        if !self.configured {
            tracing::error!("PERPLEXITY_API_KEY not set, disabling llm-search collector");
            return false;
        }
        self.config.enabled
    }

    async fn collect(&self, range: &DateRange) -> Result<Vec<RawEventDraft>, SourceError> {
        let mut drafts = Vec::new();
        for (year, month) in Self::month_windows(range) {
            match self.search_window(year, month).await {
                Ok(mut window_drafts) => drafts.append(&mut window_drafts),
                Err(error) if error.is_fatal_for_run() => return Err(error),
                Err(error) => {
                    tracing::warn!(year, month, error = %error, "llm-search window failed");
                }
            }
        }
        tracing::info!(kept = drafts.len(), "LLM-search collection complete");
        Ok(drafts)
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            name: "LLM web search",
            description: "Search-grounded LLM prompted per month for Australian incidents",
            update_frequency: "on demand",
            coverage: "Australian incidents reported anywhere on the web",
        }
    }
}
