//! Search-grounded provider over the Perplexity API.
//!
//! Used by the fact checker, the LLM-search collector, and the
//! deduplication arbiter. Answers come back grounded in live web sources;
//! we always constrain the prompt to a JSON object and strip the markdown
//! fences the model sometimes wraps around it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::provider::{parse_json_content, LlmError, SearchProvider};

#[derive(Debug, Serialize)]
struct SonarRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct SonarResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: String,
}

/// Perplexity provider.
#[derive(Debug)]
pub struct PerplexityProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
    api_url: String,
}

impl PerplexityProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: "sonar-pro".to_string(),
            client: reqwest::Client::new(),
            api_url: "https://api.perplexity.ai/chat/completions".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }
}

#[async_trait]
impl SearchProvider for PerplexityProvider {
    fn name(&self) -> &str {
        "perplexity"
    }

    async fn search_json(&self, prompt: &str) -> Result<serde_json::Value, LlmError> {
        let body = SonarRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: 1000,
            temperature: 0.1,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(60))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        let api_response: SonarResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = api_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))?;

        parse_json_content(content)
    }
}
