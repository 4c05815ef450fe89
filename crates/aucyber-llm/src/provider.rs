//! Provider traits and common wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from LLM and search providers, shaped so the retry layer can
/// classify them without string matching.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },
    #[error("Rate limited")]
    RateLimited,
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Provider not available")]
    NotAvailable,
}

impl LlmError {
    /// Map an HTTP status plus response body onto the right variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => LlmError::Auth(body),
            429 => LlmError::RateLimited,
            400..=499 => LlmError::Client {
                status,
                message: body,
            },
            _ => LlmError::Server {
                status,
                message: body,
            },
        }
    }
}

/// A request to a reasoning LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// System prompt (role/persona)
    pub system: String,
    /// User message
    pub prompt: String,
    /// Temperature (0.0 = deterministic)
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Ask the provider to guarantee a JSON object response
    pub json_mode: bool,
}

impl LlmRequest {
    /// Low-temperature request for structured extraction work.
    pub fn extraction(system: &str, prompt: &str) -> Self {
        Self {
            system: system.to_string(),
            prompt: prompt.to_string(),
            temperature: 0.1,
            max_tokens: 2048,
            json_mode: true,
        }
    }

    /// Tiny request for single-token verdicts (arbiter calls).
    pub fn verdict(system: &str, prompt: &str) -> Self {
        Self {
            system: system.to_string(),
            prompt: prompt.to_string(),
            temperature: 0.1,
            max_tokens: 10,
            json_mode: false,
        }
    }
}

/// Response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,
    /// Model that produced it
    pub model: String,
    /// Tokens used (if reported)
    pub tokens_used: Option<u32>,
    /// Time taken in milliseconds
    pub latency_ms: u64,
}

/// Reasoning LLM with temperature control and a JSON-mode guarantee.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Provider name, also used as the rate-limit key
    fn name(&self) -> &str;

    /// Generate a completion
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Search-grounded LLM: answers backed by live web sources, constrained to
/// a JSON object.
#[async_trait]
pub trait SearchProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Run a search-grounded prompt and parse the JSON object it returns.
    async fn search_json(&self, prompt: &str) -> Result<serde_json::Value, LlmError>;
}

/// Parse a provider response into JSON, stripping the markdown code fences
/// some models wrap around their output.
pub fn parse_json_content(content: &str) -> Result<serde_json::Value, LlmError> {
    let mut text = content.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    serde_json::from_str(text.trim()).map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_distinguishes_auth_and_rate_limit() {
        assert!(matches!(
            LlmError::from_status(401, "no key".into()),
            LlmError::Auth(_)
        ));
        assert!(matches!(
            LlmError::from_status(429, String::new()),
            LlmError::RateLimited
        ));
        assert!(matches!(
            LlmError::from_status(404, String::new()),
            LlmError::Client { status: 404, .. }
        ));
        assert!(matches!(
            LlmError::from_status(503, String::new()),
            LlmError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn json_parsing_strips_markdown_fences() {
        let fenced = "```json\n{\"verified\": true}\n```";
        let value = parse_json_content(fenced).unwrap();
        assert_eq!(value["verified"], serde_json::json!(true));

        let bare = "{\"a\": 1}";
        assert_eq!(parse_json_content(bare).unwrap()["a"], serde_json::json!(1));

        assert!(parse_json_content("not json").is_err());
    }
}
