//! Collector scraping the privacy regulator's newsroom.
//!
//! Listing page plus per-article detail scrape with publication-date
//! parsing. Article links may be redirect wrappers (`/s/redirect?url=...`)
//! needing one hop of resolution. Regulators disclose late, so the
//! requested window is widened by two months before the start.

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use aucyber_core::{DataSourceConfig, DateRange, RawEventDraft, SourceType};
use aucyber_llm::ServiceRateLimiter;

use crate::error::SourceError;
use crate::filter::ProgressiveFilter;
use crate::source::{DataSource, SourceInfo};

const LATE_DISCLOSURE_MONTHS: u32 = 2;

const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// A link pulled off the listing page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArticleLink {
    pub href: String,
    pub title: String,
    pub date_hint: Option<NaiveDate>,
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d{1,2})\s+(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{4})",
        )
        .expect("static regex")
    })
}

pub(crate) fn month_number(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "january" => Some(1),
        "february" => Some(2),
        "march" => Some(3),
        "april" => Some(4),
        "may" => Some(5),
        "june" => Some(6),
        "july" => Some(7),
        "august" => Some(8),
        "september" => Some(9),
        "october" => Some(10),
        "november" => Some(11),
        "december" => Some(12),
        _ => None,
    }
}

/// Find a `d Month yyyy` date anywhere in a text block.
pub(crate) fn parse_long_date(text: &str) -> Option<NaiveDate> {
    let captures = date_regex().captures(text)?;
    let day: u32 = captures.get(1)?.as_str().parse().ok()?;
    let month = month_number(captures.get(2)?.as_str())?;
    let year: i32 = captures.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Resolve a redirect-wrapper link to the real article URL (one hop).
pub(crate) fn resolve_article_url(base: &str, href: &str) -> Option<String> {
    let absolute = if href.starts_with("http") {
        href.to_string()
    } else {
        let base = url::Url::parse(base).ok()?;
        base.join(href).ok()?.to_string()
    };

    if absolute.contains("/s/redirect") {
        let parsed = url::Url::parse(&absolute).ok()?;
        for (key, value) in parsed.query_pairs() {
            if key == "url" || key == "u" {
                return Some(value.into_owned());
            }
        }
        return None;
    }
    Some(absolute)
}

/// Pull article links out of the listing page HTML. Synchronous on
/// purpose: `Html` is not `Send`, so parsing stays out of await scope.
pub(crate) fn parse_listing(html: &str) -> Vec<ArticleLink> {
    let document = Html::parse_document(html);
    let anchor = Selector::parse("a[href]").expect("static selector");

    let mut links = Vec::new();
    for element in document.select(&anchor) {
        let href = match element.value().attr("href") {
            Some(href) => href.to_string(),
            None => continue,
        };
        if !(href.contains("/news/") || href.contains("/media-centre/") || href.contains("/s/redirect"))
        {
            continue;
        }
        let title = element.text().collect::<String>().trim().to_string();
        if title.len() < 10 {
            continue;
        }
        // A publication date often sits in the surrounding list item text.
        let date_hint = element
            .parent()
            .and_then(scraper::ElementRef::wrap)
            .map(|parent| parent.text().collect::<String>())
            .as_deref()
            .and_then(parse_long_date);

        links.push(ArticleLink {
            href,
            title,
            date_hint,
        });
    }
    links
}

/// Extract title, body text, and publication date from a detail page.
pub(crate) fn parse_detail(html: &str) -> (Option<String>, String, Option<NaiveDate>) {
    let document = Html::parse_document(html);
    let h1 = Selector::parse("h1").expect("static selector");
    let time = Selector::parse("time").expect("static selector");
    let paragraph = Selector::parse("article p, main p, .content p, p").expect("static selector");

    let title = document
        .select(&h1)
        .next()
        .map(|h| h.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let date = document
        .select(&time)
        .next()
        .and_then(|t| {
            t.value()
                .attr("datetime")
                .and_then(|d| NaiveDate::parse_from_str(&d[..d.len().min(10)], "%Y-%m-%d").ok())
                .or_else(|| parse_long_date(&t.text().collect::<String>()))
        })
        .or_else(|| parse_long_date(html));

    let body: String = document
        .select(&paragraph)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    (title, body, date)
}

pub struct RegulatorScrapeCollector {
    base_url: String,
    listing_path: String,
    client: reqwest::Client,
    config: DataSourceConfig,
    filter: Arc<ProgressiveFilter>,
    rate_limiter: Arc<ServiceRateLimiter>,
}

impl RegulatorScrapeCollector {
    pub fn new(
        base_url: &str,
        config: DataSourceConfig,
        filter: Arc<ProgressiveFilter>,
        rate_limiter: Arc<ServiceRateLimiter>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            listing_path: "/newsroom".to_string(),
            client: reqwest::Client::builder()
                .user_agent(DESKTOP_USER_AGENT)
                .build()
                .unwrap_or_default(),
            config,
            filter,
            rate_limiter,
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
}

#[async_trait]
impl DataSource for RegulatorScrapeCollector {
    fn name(&self) -> &'static str {
        "regulator-scrape"
    }

    fn source_type(&self) -> SourceType {
        SourceType::RegulatorScrape
    }

    fn rate_limit_key(&self) -> &'static str {
        "regulator-list"
    }

    fn validate_config(&self) -> bool {
        self.config.enabled && url::Url::parse(&self.base_url).is_ok()
    }

    async fn collect(&self, range: &DateRange) -> Result<Vec<RawEventDraft>, SourceError> {
        // Regulator articles often land months after the incident.
        let widened = range.widened_back(LATE_DISCLOSURE_MONTHS);

        self.rate_limiter.wait("regulator-list").await;
        let listing_url = format!("{}{}", self.base_url, self.listing_path);
        let listing_html = self.fetch(&listing_url).await?;
        let links = parse_listing(&listing_html);
        tracing::info!(links = links.len(), "Parsed regulator listing");

        let mut drafts = Vec::new();
        for link in links.iter().take(self.config.max_records) {
            if let Some(hint) = link.date_hint {
                if !widened.contains(hint) {
                    continue;
                }
            }

            let article_url = match resolve_article_url(&self.base_url, &link.href) {
                Some(url) => url,
                None => continue,
            };

            self.rate_limiter.wait("regulator-detail").await;
            let detail_html = match self.fetch(&article_url).await {
                Ok(html) => html,
                Err(error) => {
                    tracing::warn!(url = %article_url, error = %error, "Detail fetch failed");
                    continue;
                }
            };

            let (detail_title, body, published) = parse_detail(&detail_html);
            let title = detail_title.unwrap_or_else(|| link.title.clone());
            let event_date = published.or(link.date_hint);

            if let Some(date) = event_date {
                if !widened.contains(date) {
                    continue;
                }
            }

            let decision = self.filter.should_process_content(&title, &body, &article_url);
            if !decision.is_cyber_relevant {
                continue;
            }

            let description = body.chars().take(500).collect::<String>();
            drafts.push(RawEventDraft {
                source_type: SourceType::RegulatorScrape,
                source_event_id: None,
                title,
                description,
                content: Some(body),
                event_date,
                source_url: Some(article_url),
                metadata: serde_json::json!({"listing": listing_url}),
            });
        }

        tracing::info!(kept = drafts.len(), "Regulator collection complete");
        Ok(drafts)
    }

    fn source_info(&self) -> SourceInfo {
        SourceInfo {
            name: "Privacy regulator newsroom",
            description: "Listing and detail scrape of regulator publications",
            update_frequency: "weekly",
            coverage: "Notifiable data breaches and enforcement actions",
        }
    }
}
