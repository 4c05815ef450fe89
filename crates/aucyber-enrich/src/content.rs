//! Stage 1: content acquisition.
//!
//! Fetch and clean full article text from a URL. Extractors run in a fixed
//! cascade until one yields at least 200 words; if every method falls
//! short, the best result of at least 100 words is still accepted. Source
//! reliability comes from a maintained domain-credibility table.

use async_trait::async_trait;
use chrono::NaiveDate;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;

use crate::error::EnrichError;

/// Domain credibility table. Government and major national outlets score
/// highest, specialised cyber press next, general press below that;
/// unknown domains default to 0.6.
const TRUSTED_SOURCES: &[(&str, f64)] = &[
    // Australian news
    ("abc.net.au", 1.0),
    ("smh.com.au", 0.95),
    ("theage.com.au", 0.95),
    ("afr.com", 0.95),
    ("theaustralian.com.au", 0.9),
    ("news.com.au", 0.85),
    ("9news.com.au", 0.85),
    ("7news.com.au", 0.85),
    // Tech press
    ("zdnet.com", 0.9),
    ("arstechnica.com", 0.9),
    ("techcrunch.com", 0.85),
    ("theverge.com", 0.85),
    // Cyber press
    ("krebsonsecurity.com", 0.95),
    ("itnews.com.au", 0.9),
    ("cyberdaily.au", 0.85),
    ("bleepingcomputer.com", 0.85),
    ("cyberscoop.com", 0.85),
    ("threatpost.com", 0.85),
    ("darkreading.com", 0.85),
    // Government
    ("oaic.gov.au", 1.0),
    ("cyber.gov.au", 1.0),
    ("acsc.gov.au", 1.0),
];

const DEFAULT_RELIABILITY: f64 = 0.6;
const ACCEPT_WORDS: usize = 200;
const FALLBACK_WORDS: usize = 100;
const SUMMARY_CHARS: usize = 500;

const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Which extractor produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    ArticleParser,
    MainContent,
    DomFallback,
    Pdf,
    HeadlessBrowser,
    RawDescription,
    None,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::ArticleParser => "article_parser",
            ExtractionMethod::MainContent => "main_content",
            ExtractionMethod::DomFallback => "dom_fallback",
            ExtractionMethod::Pdf => "pdf",
            ExtractionMethod::HeadlessBrowser => "headless_browser",
            ExtractionMethod::RawDescription => "raw_description",
            ExtractionMethod::None => "none",
        }
    }
}

/// Stage-1 output.
#[derive(Debug, Clone)]
pub struct AcquiredContent {
    pub full_text: String,
    pub clean_summary: String,
    pub publication_date: Option<NaiveDate>,
    pub source_domain: String,
    pub source_reliability: f64,
    /// Word count of `full_text`
    pub content_length: usize,
    pub extraction_method: ExtractionMethod,
    pub extraction_success: bool,
    pub error: Option<String>,
}

impl AcquiredContent {
    fn failure(error: String) -> Self {
        Self {
            full_text: String::new(),
            clean_summary: String::new(),
            publication_date: None,
            source_domain: "unknown".to_string(),
            source_reliability: 0.0,
            content_length: 0,
            extraction_method: ExtractionMethod::None,
            extraction_success: false,
            error: Some(error),
        }
    }

    /// Build directly from already-held text (raw events without a URL).
    pub fn from_text(text: &str) -> Self {
        let words = word_count(text);
        if words < FALLBACK_WORDS {
            return Self::failure(format!(
                "stored text too short ({words} words, need {FALLBACK_WORDS})"
            ));
        }
        Self {
            full_text: text.to_string(),
            clean_summary: summarise(text),
            publication_date: None,
            source_domain: "unknown".to_string(),
            source_reliability: DEFAULT_RELIABILITY,
            content_length: words,
            extraction_method: ExtractionMethod::RawDescription,
            extraction_success: true,
            error: None,
        }
    }
}

/// Headless-browser render for JavaScript-dependent pages. Injected; the
/// default deployment runs without one.
#[async_trait]
pub trait BrowserFetch: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, EnrichError>;
}

/// Placeholder browser that always reports itself unavailable.
#[derive(Debug, Default)]
pub struct DisabledBrowser;

#[async_trait]
impl BrowserFetch for DisabledBrowser {
    async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<String, EnrichError> {
        Err(EnrichError::BrowserUnavailable(
            "no headless browser configured".to_string(),
        ))
    }
}

pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First ~500 characters, broken at a sentence boundary when possible.
fn summarise(text: &str) -> String {
    if text.len() <= SUMMARY_CHARS {
        return text.trim().to_string();
    }
    let mut cut = SUMMARY_CHARS;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &text[..cut];
    match head.rfind('.') {
        Some(i) if i > SUMMARY_CHARS * 7 / 10 => head[..=i].trim().to_string(),
        _ => head.trim().to_string(),
    }
}

pub(crate) fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn source_reliability(domain: &str) -> f64 {
    TRUSTED_SOURCES
        .iter()
        .find(|(d, _)| domain == *d || domain.ends_with(&format!(".{d}")))
        .map(|(_, score)| *score)
        .unwrap_or(DEFAULT_RELIABILITY)
}

fn strip_boilerplate(document: &Html) -> Vec<String> {
    // scraper has no node removal, so boilerplate containers are skipped
    // by checking ancestry instead.
    let paragraph = Selector::parse("p").expect("static selector");
    let mut blocks = Vec::new();
    'outer: for p in document.select(&paragraph) {
        for ancestor in p.ancestors().filter_map(scraper::ElementRef::wrap) {
            if matches!(
                ancestor.value().name(),
                "nav" | "header" | "footer" | "aside" | "script" | "style" | "form"
            ) {
                continue 'outer;
            }
        }
        let text = p.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            blocks.push(text);
        }
    }
    blocks
}

/// Method 1: news-article parser. Reads article metadata (og:title,
/// article:published_time) and the `<article>` body.
fn extract_article(html: &str) -> (String, Option<NaiveDate>) {
    let document = Html::parse_document(html);
    let meta = Selector::parse("meta[property='article:published_time']").expect("static selector");
    let article = Selector::parse("article p").expect("static selector");

    let date = document.select(&meta).next().and_then(|m| {
        m.value()
            .attr("content")
            .and_then(|c| NaiveDate::parse_from_str(&c[..c.len().min(10)], "%Y-%m-%d").ok())
    });

    let text = document
        .select(&article)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    (text, date)
}

/// Method 2: heuristic boilerplate removal over the whole document. Keeps
/// paragraph blocks long enough to be prose and drops navigation chrome.
fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);
    strip_boilerplate(&document)
        .into_iter()
        .filter(|block| block.len() >= 60 || block.ends_with('.'))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Method 3: DOM fallback. Concatenate `<p>` within the first matching
/// known article container.
fn extract_dom_fallback(html: &str) -> String {
    let document = Html::parse_document(html);
    let containers = [
        "article",
        ".article-content",
        ".post-content",
        "main",
        "#content",
    ];
    for container in containers {
        let selector = match Selector::parse(&format!("{container} p")) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let text = document
            .select(&selector)
            .map(|p| p.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if !text.is_empty() {
            return text;
        }
    }
    // Last resort: every paragraph on the page.
    let paragraph = Selector::parse("p").expect("static selector");
    document
        .select(&paragraph)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Stage-1 service.
pub struct ContentAcquisition {
    client: reqwest::Client,
    browser: Arc<dyn BrowserFetch>,
    http_timeout: Duration,
}

impl ContentAcquisition {
    pub fn new(browser: Arc<dyn BrowserFetch>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(DESKTOP_USER_AGENT)
                .build()
                .unwrap_or_default(),
            browser,
            http_timeout: Duration::from_secs(30),
        }
    }

    /// Run the extractor cascade for a URL.
    pub async fn acquire(&self, article_url: &str) -> AcquiredContent {
        let domain = domain_of(article_url);
        let reliability = source_reliability(&domain);

        let (body, content_type) = match self.fetch_bytes(article_url).await {
            Ok(pair) => pair,
            Err(error) => return AcquiredContent::failure(error.to_string()),
        };

        let is_pdf = content_type.contains("application/pdf")
            || article_url.to_lowercase().ends_with(".pdf");

        let mut best: (String, ExtractionMethod, Option<NaiveDate>) =
            (String::new(), ExtractionMethod::None, None);

        if is_pdf {
            match pdf_extract::extract_text_from_mem(&body) {
                Ok(text) => best = (text, ExtractionMethod::Pdf, None),
                Err(error) => {
                    tracing::warn!(url = %article_url, error = %error, "PDF extraction failed");
                }
            }
        } else {
            let html = String::from_utf8_lossy(&body).into_owned();

            let (article_text, published) = extract_article(&html);
            if word_count(&article_text) >= ACCEPT_WORDS {
                best = (article_text, ExtractionMethod::ArticleParser, published);
            } else {
                if word_count(&article_text) > word_count(&best.0) {
                    best = (article_text, ExtractionMethod::ArticleParser, published);
                }
                let main_text = extract_main_content(&html);
                if word_count(&main_text) >= ACCEPT_WORDS {
                    best = (main_text, ExtractionMethod::MainContent, best.2);
                } else {
                    if word_count(&main_text) > word_count(&best.0) {
                        best = (main_text, ExtractionMethod::MainContent, best.2);
                    }
                    let dom_text = extract_dom_fallback(&html);
                    if word_count(&dom_text) > word_count(&best.0) {
                        best = (dom_text, ExtractionMethod::DomFallback, best.2);
                    }
                }
            }

            // JavaScript-rendered pages leave nothing in the static DOM;
            // try the browser capability last.
            if word_count(&best.0) < ACCEPT_WORDS {
                match self.browser.fetch(article_url, self.http_timeout).await {
                    Ok(rendered) => {
                        let rendered_text = extract_main_content(&rendered);
                        if word_count(&rendered_text) > word_count(&best.0) {
                            best = (rendered_text, ExtractionMethod::HeadlessBrowser, best.2);
                        }
                    }
                    Err(EnrichError::BrowserUnavailable(_)) => {}
                    Err(error) => {
                        tracing::warn!(url = %article_url, error = %error, "Browser render failed");
                    }
                }
            }
        }

        let (full_text, method, published) = best;
        let words = word_count(&full_text);
        if words < FALLBACK_WORDS {
            return AcquiredContent::failure(format!(
                "no extractor yielded {FALLBACK_WORDS} words from {article_url} (best: {words})"
            ));
        }

        tracing::info!(
            url = %article_url,
            method = method.as_str(),
            words,
            reliability,
            "Content acquired"
        );

        AcquiredContent {
            clean_summary: summarise(&full_text),
            content_length: words,
            full_text,
            publication_date: published,
            source_domain: domain,
            source_reliability: reliability,
            extraction_method: method,
            extraction_success: true,
            error: None,
        }
    }

    async fn fetch_bytes(&self, article_url: &str) -> Result<(Vec<u8>, String), EnrichError> {
        let response = self
            .client
            .get(article_url)
            .timeout(self.http_timeout)
            .send()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichError::Http(format!(
                "{article_url} returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| EnrichError::Http(e.to_string()))?;
        Ok((body.to_vec(), content_type))
    }
}
