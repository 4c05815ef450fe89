//! The phase driver.
//!
//! Discovery runs sequentially per source (rate limits dominate), scraping
//! runs up to five pages concurrently, enrichment runs under a
//! configurable worker bound. Deduplication runs only after enrichment for
//! the window completes and rebuilds the canonical tier from the Active
//! enriched set, so re-runs over a stable set are reproducible.

use std::sync::Arc;
use tokio::sync::Semaphore;

use aucyber_core::DateRange;
use aucyber_dedupe::{engine::superseded_ids, DedupeEngine};
use aucyber_enrich::{ContentAcquisition, EnrichError, EnrichmentPipeline};
use aucyber_persist::{EventStore, StorageError};
use aucyber_sources::{DataSource, SourceError};

const SCRAPE_CONCURRENCY: usize = 5;

/// Errors surfaced by phase drivers.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),
}

/// Per-phase progress counters.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PhaseStats {
    pub discovered: u64,
    pub scraped: u64,
    pub enriched: u64,
    pub rejected: u64,
    pub errors: u64,
}

impl PhaseStats {
    pub fn merge(&mut self, other: &PhaseStats) {
        self.discovered += other.discovered;
        self.scraped += other.scraped;
        self.enriched += other.enriched;
        self.rejected += other.rejected;
        self.errors += other.errors;
    }
}

impl std::fmt::Display for PhaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "discovered={} scraped={} enriched={} rejected={} errors={}",
            self.discovered, self.scraped, self.enriched, self.rejected, self.errors
        )
    }
}

/// Drives the pipeline phases over a shared store.
pub struct Orchestrator {
    store: EventStore,
    sources: Vec<Arc<dyn DataSource>>,
    pipeline: Arc<EnrichmentPipeline>,
    engine: DedupeEngine,
    content: Arc<ContentAcquisition>,
    enrichment_workers: usize,
}

impl Orchestrator {
    pub fn new(
        store: EventStore,
        sources: Vec<Arc<dyn DataSource>>,
        pipeline: Arc<EnrichmentPipeline>,
        engine: DedupeEngine,
        content: Arc<ContentAcquisition>,
        enrichment_workers: usize,
    ) -> Self {
        Self {
            store,
            sources,
            pipeline,
            engine,
            content,
            enrichment_workers: enrichment_workers.max(1),
        }
    }

    /// Discovery phase: each enabled source in turn, duplicate gate at
    /// insert time. A failing source is logged and skipped; the run
    /// continues.
    pub async fn discover(
        &self,
        range: &DateRange,
        source_filter: Option<&[&str]>,
        max_events: Option<usize>,
    ) -> Result<PhaseStats, OrchestratorError> {
        let mut stats = PhaseStats::default();

        for source in &self.sources {
            if let Some(filter) = source_filter {
                if !filter.contains(&source.name()) {
                    continue;
                }
            }
            if !source.validate_config() {
                tracing::warn!(source = source.name(), "Source disabled by config check");
                continue;
            }

            tracing::info!(source = source.name(), "Collecting");
            match source.collect(range).await {
                Ok(drafts) => {
                    for draft in drafts {
                        if let Some(cap) = max_events {
                            if stats.discovered as usize >= cap {
                                tracing::info!(cap, "Discovery cap reached");
                                return Ok(stats);
                            }
                        }
                        match self.store.add_raw_event(&draft).await {
                            Ok(Some(_)) => stats.discovered += 1,
                            Ok(None) => {}
                            Err(error) => {
                                tracing::error!(error = %error, "Raw insert failed");
                                stats.errors += 1;
                            }
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(source = source.name(), error = %error, "Collection failed");
                    stats.errors += 1;
                }
            }
        }

        tracing::info!(%stats, "Discovery complete");
        Ok(stats)
    }

    /// Scrape phase: fetch full content for unprocessed raw events that
    /// have a URL but no stored text yet. Up to five pages in flight.
    pub async fn scrape(&self, limit: i64) -> Result<PhaseStats, OrchestratorError> {
        let pending = self.store.unprocessed_raw_events(limit).await?;
        let semaphore = Arc::new(Semaphore::new(SCRAPE_CONCURRENCY));
        let mut handles = Vec::new();

        for raw in pending {
            let Some(url) = raw.source_url.clone() else {
                continue;
            };
            if raw.content.is_some() {
                continue;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("scrape semaphore closed");
            let content = self.content.clone();
            let store = self.store.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let acquired = content.acquire(&url).await;
                if !acquired.extraction_success {
                    return false;
                }
                store
                    .set_raw_content(raw.raw_event_id, &acquired.full_text)
                    .await
                    .is_ok()
            }));
        }

        let mut stats = PhaseStats::default();
        for handle in handles {
            match handle.await {
                Ok(true) => stats.scraped += 1,
                Ok(false) => stats.errors += 1,
                Err(_) => stats.errors += 1,
            }
        }
        tracing::info!(%stats, "Scrape complete");
        Ok(stats)
    }

    /// Enrichment phase: pull unprocessed raw events and run the pipeline
    /// under the worker bound.
    pub async fn enrich(&self, limit: i64) -> Result<PhaseStats, OrchestratorError> {
        let pending = self.store.unprocessed_raw_events(limit).await?;
        let eligible: Vec<_> = pending.into_iter().filter(|raw| raw.is_enrichable()).collect();
        tracing::info!(events = eligible.len(), workers = self.enrichment_workers, "Enriching");

        let semaphore = Arc::new(Semaphore::new(self.enrichment_workers));
        let mut handles = Vec::new();
        for raw in eligible {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("enrichment semaphore closed");
            let pipeline = self.pipeline.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                pipeline.enrich_event(&raw).await
            }));
        }

        let mut stats = PhaseStats::default();
        for handle in handles {
            match handle.await {
                Ok(Ok(outcome)) => {
                    if outcome.enriched_event_id.is_some() {
                        stats.enriched += 1;
                    } else {
                        stats.rejected += 1;
                    }
                }
                Ok(Err(error)) => {
                    tracing::error!(error = %error, "Pipeline run failed");
                    stats.errors += 1;
                }
                Err(_) => stats.errors += 1,
            }
        }
        tracing::info!(%stats, "Enrichment complete");
        Ok(stats)
    }

    /// Deduplication phase: rebuild the canonical tier from the Active
    /// enriched set.
    pub async fn dedupe(&self) -> Result<(usize, usize), OrchestratorError> {
        let events = self.store.active_enriched_with_raw().await?;
        tracing::info!(events = events.len(), "Deduplicating");

        self.store.clear_canonical().await?;
        let (writes, stats) = self.engine.deduplicate(&events).await;
        for write in &writes {
            self.store.insert_canonical(write).await?;
        }
        let superseded = superseded_ids(&writes);
        self.store
            .mark_enriched_status(&superseded, aucyber_core::EventStatus::Superseded)
            .await?;

        tracing::info!(
            input = stats.input_events,
            canonical = writes.len(),
            merged_groups = stats.merged_groups,
            arbiter_calls = stats.arbiter_calls,
            "Deduplication complete"
        );
        Ok((stats.input_events, writes.len()))
    }

    /// Month-by-month backfill. Completed months are skipped unless
    /// forced; each finished month records its stats in the ledger.
    pub async fn backfill(
        &self,
        start: (i32, u32),
        end: (i32, u32),
        force: bool,
        priority_only: bool,
    ) -> Result<PhaseStats, OrchestratorError> {
        let priority_sources: &[&str] = &["news-events", "regulator-scrape"];
        let mut totals = PhaseStats::default();

        let mut year = start.0;
        let mut month = start.1;
        loop {
            if (year, month) > (end.0, end.1) {
                break;
            }

            if !force && self.store.is_month_processed(year, month).await? {
                tracing::info!(year, month, "Month already processed, skipping");
            } else {
                let range = DateRange::for_month(year, month).map_err(|e| {
                    OrchestratorError::Source(SourceError::Config(e.to_string()))
                })?;
                let filter = priority_only.then_some(priority_sources);

                let mut month_stats = self.discover(&range, filter, None).await?;
                month_stats.merge(&self.scrape(i64::MAX).await?);
                month_stats.merge(&self.enrich(i64::MAX).await?);

                self.store
                    .mark_month_processed(
                        year,
                        month,
                        &serde_json::to_value(month_stats).unwrap_or_default(),
                    )
                    .await?;
                tracing::info!(year, month, stats = %month_stats, "Month complete");
                totals.merge(&month_stats);
            }

            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }
        Ok(totals)
    }
}
