//! Process wiring: environment, store, providers, collectors.
//!
//! Everything long-lived is constructed here once and passed explicitly to
//! collaborators; there are no ambient singletons.

use anyhow::Result;
use std::sync::Arc;

use aucyber_core::{CollectionConfig, DateRange, EnvConfig};
use aucyber_dedupe::{DedupeEngine, LlmArbiter, SearchArbiter};
use aucyber_enrich::{
    ContentAcquisition, DisabledBrowser, EnrichmentPipeline, FactChecker, PrimaryExtractor,
};
use aucyber_llm::{
    CircuitBreaker, OpenAiProvider, PerplexityProvider, Resilient, RetryPolicy,
    ServiceRateLimiter,
};
use aucyber_persist::{EventStore, SqliteConfig};
use aucyber_runtime::Orchestrator;
use aucyber_sources::{
    CuratedListScrapeCollector, DataSource, GoogleCseClient, HttpNewsEventsQuery,
    LlmSearchCollector, NewsEventsCollector, ProgressiveFilter, RegulatorScrapeCollector,
    WebSearchCollector,
};

const REGULATOR_BASE_URL: &str = "https://www.oaic.gov.au";
const CURATED_LIST_URL: &str = "https://www.webberinsurance.com.au/data-breaches-list";
const NEWS_EVENTS_GATEWAY: &str = "https://events-gateway.aucyber.internal/query";

/// A missing or invalid configuration value; exits with code 2.
#[derive(Debug)]
pub struct ConfigProblem(pub String);

impl std::fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigProblem {}

/// Long-lived process state.
pub struct AppContext {
    pub env: EnvConfig,
    pub store: EventStore,
    pub rate_limiter: Arc<ServiceRateLimiter>,
    pub filter: Arc<ProgressiveFilter>,
}

impl AppContext {
    /// Read the environment and open the store.
    pub async fn connect() -> Result<Self> {
        let env = EnvConfig::from_env();
        let path = env.database_path();
        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = EventStore::connect(SqliteConfig::at_path(&path)).await?;
        Ok(Self {
            env,
            store,
            rate_limiter: Arc::new(ServiceRateLimiter::with_default_limits()),
            filter: Arc::new(ProgressiveFilter::new()),
        })
    }

    fn perplexity(&self) -> Option<Arc<PerplexityProvider>> {
        self.env
            .perplexity_api_key
            .as_deref()
            .map(|key| Arc::new(PerplexityProvider::new(key)))
    }

    /// Every collector whose configuration is present. Missing credentials
    /// disable a collector; they never abort the run.
    pub fn sources(&self) -> Vec<Arc<dyn DataSource>> {
        let defaults = CollectionConfig::for_range(DateRange {
            start: chrono::Utc::now().date_naive(),
            end: None,
        });
        let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();

        match &self.env.news_events_project {
            Some(project) => {
                sources.push(Arc::new(NewsEventsCollector::new(
                    Arc::new(HttpNewsEventsQuery::new(NEWS_EVENTS_GATEWAY, project)),
                    defaults.news_events.clone(),
                    self.filter.clone(),
                    self.rate_limiter.clone(),
                    Some(project.clone()),
                )));
            }
            None => tracing::warn!("NEWSEVENTS_PROJECT not set, news-events collector disabled"),
        }

        match self.perplexity() {
            Some(search) => {
                sources.push(Arc::new(LlmSearchCollector::new(
                    search,
                    defaults.llm_search.clone(),
                    self.rate_limiter.clone(),
                    Arc::new(CircuitBreaker::with_defaults("llm-search")),
                    true,
                )));
            }
            None => tracing::warn!("PERPLEXITY_API_KEY not set, llm-search collector disabled"),
        }

        match (&self.env.web_search_api_key, &self.env.web_search_cx) {
            (Some(key), Some(cx)) => {
                sources.push(Arc::new(WebSearchCollector::new(
                    Arc::new(GoogleCseClient::new(key, cx)),
                    defaults.web_search.clone(),
                    self.filter.clone(),
                    self.rate_limiter.clone(),
                    true,
                )));
            }
            _ => tracing::warn!("WEBSEARCH_API_KEY/WEBSEARCH_CX not set, web-search collector disabled"),
        }

        sources.push(Arc::new(RegulatorScrapeCollector::new(
            REGULATOR_BASE_URL,
            defaults.regulator.clone(),
            self.filter.clone(),
            self.rate_limiter.clone(),
        )));

        sources.push(Arc::new(CuratedListScrapeCollector::new(
            CURATED_LIST_URL,
            defaults.curated_list.clone(),
            self.filter.clone(),
            self.rate_limiter.clone(),
            self.perplexity().map(|p| p as _),
        )));

        sources
    }

    /// The enrichment pipeline. Both provider keys are hard requirements
    /// here: without them there is no extraction or fact-checking.
    pub fn pipeline(&self) -> Result<Arc<EnrichmentPipeline>> {
        let openai_key = self.env.openai_api_key.as_deref().ok_or_else(|| {
            anyhow::Error::new(ConfigProblem(
                "OPENAI_API_KEY is required for enrichment".to_string(),
            ))
        })?;
        let perplexity = self.perplexity().ok_or_else(|| {
            anyhow::Error::new(ConfigProblem(
                "PERPLEXITY_API_KEY is required for fact-checking".to_string(),
            ))
        })?;

        let llm = Resilient::new(
            OpenAiProvider::gpt4o(openai_key),
            RetryPolicy::default(),
            Arc::new(CircuitBreaker::with_defaults("openai")),
        );

        Ok(Arc::new(EnrichmentPipeline::new(
            ContentAcquisition::new(Arc::new(DisabledBrowser)),
            PrimaryExtractor::new(Arc::new(llm)),
            FactChecker::new(perplexity).with_rate_limiter(self.rate_limiter.clone()),
            self.store.clone(),
            self.rate_limiter.clone(),
        )))
    }

    /// The deduplication engine, with whichever arbiters have credentials.
    pub fn dedupe_engine(&self) -> DedupeEngine {
        let search_arbiter = self
            .perplexity()
            .map(|p| Box::new(SearchArbiter::new(p)) as _);
        let llm_arbiter = self.env.openai_api_key.as_deref().map(|key| {
            Box::new(LlmArbiter::new(Arc::new(OpenAiProvider::gpt4o_mini(key)))) as _
        });
        DedupeEngine::new(search_arbiter, llm_arbiter)
    }

    /// Pipeline that never gets called: discovery and scraping work on a
    /// minimal configuration without LLM keys.
    pub fn pipeline_or_inert(&self) -> Arc<EnrichmentPipeline> {
        self.pipeline().unwrap_or_else(|_| {
            tracing::info!("LLM keys absent; building pipeline-free orchestrator");
            let inert = Arc::new(aucyber_llm::MockProvider::scripted(Vec::new()));
            Arc::new(EnrichmentPipeline::new(
                ContentAcquisition::new(Arc::new(DisabledBrowser)),
                PrimaryExtractor::new(inert.clone()),
                FactChecker::new(inert),
                self.store.clone(),
                self.rate_limiter.clone(),
            ))
        })
    }

    /// Full orchestrator for phases that need everything.
    pub fn orchestrator(&self, workers: usize) -> Result<Orchestrator> {
        Ok(Orchestrator::new(
            self.store.clone(),
            self.sources(),
            self.pipeline()?,
            self.dedupe_engine(),
            Arc::new(ContentAcquisition::new(Arc::new(DisabledBrowser))),
            workers,
        ))
    }

    /// Orchestrator for phases that never touch the LLM pipeline.
    pub fn orchestrator_lenient(&self, workers: usize) -> Orchestrator {
        Orchestrator::new(
            self.store.clone(),
            self.sources(),
            self.pipeline_or_inert(),
            self.dedupe_engine(),
            Arc::new(ContentAcquisition::new(Arc::new(DisabledBrowser))),
            workers,
        )
    }

    pub fn workers(&self) -> usize {
        self.env.batch_size.unwrap_or(4).clamp(1, 16)
    }
}
