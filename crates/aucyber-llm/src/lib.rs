//! # aucyber-llm
//!
//! External reasoning and search capabilities the pipeline consumes, plus
//! the resilience plumbing every outbound call goes through.
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`provider`] | `LlmProvider` / `SearchProvider` traits and wire types |
//! | [`openai`] | Reasoning LLM over the OpenAI chat API |
//! | [`perplexity`] | Search-grounded LLM over the Perplexity API |
//! | [`mock`] | Scriptable provider for tests |
//! | [`rate_limit`] | Per-service dual-window rate limiter |
//! | [`resilient`] | Error classification, retry with backoff, circuit breaker |
//!
//! The core never talks to a vendor directly: collectors and pipeline
//! stages hold `Arc<dyn LlmProvider>` / `Arc<dyn SearchProvider>` and the
//! concrete providers are wired up at startup.

pub mod mock;
pub mod openai;
pub mod perplexity;
pub mod provider;
pub mod rate_limit;
pub mod resilient;

pub use mock::{MockProvider, ScriptedOutcome};
pub use openai::OpenAiProvider;
pub use perplexity::PerplexityProvider;
pub use provider::{parse_json_content, LlmError, LlmProvider, LlmRequest, LlmResponse, SearchProvider};
pub use rate_limit::ServiceRateLimiter;
pub use resilient::{classify, CircuitBreaker, ErrorClass, Resilient, RetryPolicy};
