//! # aucyber-sources
//!
//! Source collectors for the discovery layer. Five adapters share the
//! [`DataSource`] contract and normalise everything they find into
//! [`aucyber_core::RawEventDraft`] records:
//!
//! | Collector | Feed |
//! |-----------|------|
//! | [`NewsEventsCollector`] | CAMEO-coded global events store |
//! | [`LlmSearchCollector`] | LLM with web search, prompted per month |
//! | [`WebSearchCollector`] | Paged custom web search |
//! | [`RegulatorScrapeCollector`] | Privacy-regulator newsroom |
//! | [`CuratedListScrapeCollector`] | Curated month-sectioned breach list |
//!
//! The [`ProgressiveFilter`] gates obvious non-cyber noise in two stages:
//! at discovery (cheap, before anything is stored) and after scraping
//! (against full content). Insert-time duplicate suppression is the
//! store's job; collectors only normalise.

pub mod curated_list;
pub mod error;
pub mod filter;
pub mod llm_search;
pub mod news_events;
pub mod regulator;
pub mod source;
pub mod web_search;

pub use curated_list::CuratedListScrapeCollector;
pub use error::SourceError;
pub use filter::{FilterDecision, ProgressiveFilter};
pub use llm_search::LlmSearchCollector;
pub use news_events::{
    HttpNewsEventsQuery, NewsEventsCollector, NewsEventsQuery, NewsHit, NewsQuerySpec,
};
pub use regulator::RegulatorScrapeCollector;
pub use source::{DataSource, SourceInfo};
pub use web_search::{GoogleCseClient, WebSearch, WebSearchCollector, WebSearchResult};
