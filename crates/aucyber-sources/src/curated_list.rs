//! Collector for a curated month-sectioned breach list.
//!
//! The page groups incidents under `Vendor - Month Year` section headers;
//! entries inherit the section date when their own text carries none. When
//! a linked article fails to fetch, the LLM-search capability summarises
//! the incident from the URL instead of dropping it.

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use aucyber_core::{DataSourceConfig, DateRange, RawEventDraft, SourceType};
use aucyber_llm::{SearchProvider, ServiceRateLimiter};

use crate::error::SourceError;
use crate::filter::ProgressiveFilter;
use crate::regulator::{month_number, parse_detail};
use crate::source::{DataSource, SourceInfo};

const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// One list entry with its section-derived date.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListEntry {
    pub title: String,
    pub href: Option<String>,
    pub section_date: Option<NaiveDate>,
}

fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{4})",
        )
        .expect("static regex")
    })
}

/// Parse a `Vendor - Month Year` (or bare `Month Year`) section header
/// into the first day of that month.
pub(crate) fn parse_section_header_date(text: &str) -> Option<NaiveDate> {
    let captures = header_regex().captures(text)?;
    let month = month_number(captures.get(1)?.as_str())?;
    let year: i32 = captures.get(2)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Walk the page in document order, tracking the current section header and
/// tagging every list entry with it.
pub(crate) fn parse_month_sections(html: &str) -> Vec<ListEntry> {
    let document = Html::parse_document(html);
    let walker = Selector::parse("h2, h3, li").expect("static selector");
    let anchor = Selector::parse("a[href]").expect("static selector");

    let mut current_date: Option<NaiveDate> = None;
    let mut entries = Vec::new();

    for element in document.select(&walker) {
        let tag = element.value().name();
        let text = element.text().collect::<String>().trim().to_string();
        if tag == "h2" || tag == "h3" {
            if let Some(date) = parse_section_header_date(&text) {
                current_date = Some(date);
            }
            continue;
        }
        if text.len() < 10 {
            continue;
        }
        let href = element
            .select(&anchor)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|h| h.to_string());
        entries.push(ListEntry {
            title: text,
            href,
            section_date: current_date,
        });
    }
    entries
}

pub struct CuratedListScrapeCollector {
    list_url: String,
    client: reqwest::Client,
    config: DataSourceConfig,
    filter: Arc<ProgressiveFilter>,
    rate_limiter: Arc<ServiceRateLimiter>,
    /// Fallback summariser for entries whose article will not fetch
    search_fallback: Option<Arc<dyn SearchProvider>>,
}

impl CuratedListScrapeCollector {
    pub fn new(
        list_url: &str,
        config: DataSourceConfig,
        filter: Arc<ProgressiveFilter>,
        rate_limiter: Arc<ServiceRateLimiter>,
        search_fallback: Option<Arc<dyn SearchProvider>>,
    ) -> Self {
        Self {
            list_url: list_url.to_string(),
            client: reqwest::Client::builder()
                .user_agent(DESKTOP_USER_AGENT)
                .build()
                .unwrap_or_default(),
            config,
            filter,
            rate_limiter,
            search_fallback,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Http(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))
    }

    /// Summarise an unfetchable article via the search capability.
    async fn fallback_summary(&self, entry: &ListEntry, article_url: &str) -> Option<String> {
        let search = self.search_fallback.as_ref()?;
        let prompt = format!(
            "The article at {article_url} reports the cyber incident \"{}\" but the page \
is unavailable. Search for coverage of this incident and respond with ONLY a \
JSON object: {{\"summary\": \"2-3 factual sentences\", \"found\": true or false}}.",
            entry.title
        );
        match search.search_json(&prompt).await {
            Ok(value) if value["found"] == serde_json::json!(true) => value["summary"]
                .as_str()
                .map(|s| s.to_string()),
            Ok(_) => None,
            Err(error) => {
                tracing::warn!(url = %article_url, error = %error, "Fallback summary failed");
                None
            }
        }
    }
}

#[async_trait]
impl DataSource for CuratedListScrapeCollector {
    fn name(&self) -> &'static str {
        "curated-list"
    }

    fn source_type(&self) -> SourceType {
        SourceType::CuratedList
    }

    fn rate_limit_key(&self) -> &'static str {
        "curated-list"
    }

    fn validate_config(&self) -> bool {
        self.config.enabled && url::Url::parse(&self.list_url).is_ok()
    }

    async fn collect(&self, range: &DateRange) -> Result<Vec<RawEventDraft>, SourceError> {
        self.rate_limiter.wait("curated-list").await;
        let list_html = self.fetch(&self.list_url).await?;
        let entries = parse_month_sections(&list_html);
        tracing::info!(entries = entries.len(), "Parsed curated list");

        let mut drafts = Vec::new();
        for entry in entries.iter().take(self.config.max_records) {
            let Some(section_date) = entry.section_date else {
                continue;
            };
            if !range.contains(section_date) {
                continue;
            }
            let decision = self.filter.should_discover(&entry.title, "", "");
            if !decision.is_cyber_relevant {
                continue;
            }

            let mut description = String::new();
            let mut content = None;
            let mut event_date = Some(section_date);

            if let Some(href) = &entry.href {
                self.rate_limiter.wait("curated-detail").await;
                match self.fetch(href).await {
                    Ok(html) => {
                        let (_, body, published) = parse_detail(&html);
                        description = body.chars().take(500).collect();
                        content = Some(body);
                        if let Some(published) = published {
                            event_date = Some(published);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(url = %href, error = %error, "Article fetch failed, trying fallback");
                        if let Some(summary) = self.fallback_summary(entry, href).await {
                            description = summary;
                        }
                    }
                }
            }

            if description.is_empty() {
                description = entry.title.clone();
            }

            drafts.push(RawEventDraft {
                source_type: SourceType::CuratedList,
                source_event_id: None,
                title: entry.title.clone(),
                description,
                content,
                event_date,
                source_url: entry.href.clone(),
                metadata: serde_json::json!({
                    "section_month": section_date.format("%Y-%m").to_string(),
                }),
            });
        }

        tracing::info!(kept = drafts.len(), "Curated-list collection complete");
        Ok(drafts)
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            name: "Curated breach list",
            description: "Month-sectioned list of Australian data breaches",
            update_frequency: "monthly",
            coverage: "Australian incidents curated by an industry observer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_headers_yield_first_of_month() {
        assert_eq!(
            parse_section_header_date("Data Breaches — June 2024"),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert_eq!(
            parse_section_header_date("march 2023"),
            NaiveDate::from_ymd_opt(2023, 3, 1)
        );
        assert_eq!(parse_section_header_date("Latest incidents"), None);
    }

    #[test]
    fn entries_inherit_their_section_date() {
        let html = r#"
            <h2>Data Breaches — June 2024</h2>
            <ul>
              <li><a href="https://example.com/a">Acme Corp suffers ransomware attack</a></li>
              <li><a href="https://example.com/b">Beta Health data breach exposes patients</a></li>
            </ul>
            <h2>Data Breaches — May 2024</h2>
            <ul>
              <li><a href="https://example.com/c">Gamma Uni credential theft incident</a></li>
            </ul>"#;
        let entries = parse_month_sections(html);
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0].section_date,
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert_eq!(
            entries[2].section_date,
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert_eq!(entries[2].href.as_deref(), Some("https://example.com/c"));
    }
}
