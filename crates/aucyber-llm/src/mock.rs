//! Scriptable mock provider for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::provider::{
    parse_json_content, LlmError, LlmProvider, LlmRequest, LlmResponse, SearchProvider,
};

/// One scripted call outcome. The mock cycles through its script, repeating
/// the final entry once exhausted.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Ok(String),
    AuthError,
    ClientError(u16),
    RateLimited,
    ServerError,
    NetworkError,
}

impl ScriptedOutcome {
    pub fn ok(content: &str) -> Self {
        ScriptedOutcome::Ok(content.to_string())
    }

    pub fn auth_error() -> Self {
        ScriptedOutcome::AuthError
    }

    pub fn server_error() -> Self {
        ScriptedOutcome::ServerError
    }

    fn to_result(&self) -> Result<String, LlmError> {
        match self {
            ScriptedOutcome::Ok(content) => Ok(content.clone()),
            ScriptedOutcome::AuthError => Err(LlmError::Auth("invalid api key".into())),
            ScriptedOutcome::ClientError(status) => Err(LlmError::Client {
                status: *status,
                message: "client error".into(),
            }),
            ScriptedOutcome::RateLimited => Err(LlmError::RateLimited),
            ScriptedOutcome::ServerError => Err(LlmError::Server {
                status: 500,
                message: "internal error".into(),
            }),
            ScriptedOutcome::NetworkError => Err(LlmError::Network("connection reset".into())),
        }
    }
}

/// A mock provider that replays predefined outcomes. Implements both the
/// reasoning and search-grounded traits so every pipeline stage can run
/// against it.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    script: Vec<ScriptedOutcome>,
    index: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn scripted(script: Vec<ScriptedOutcome>) -> Self {
        Self {
            name: "mock".to_string(),
            script,
            index: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always returns the same content.
    pub fn constant(content: &str) -> Self {
        Self::scripted(vec![ScriptedOutcome::ok(content)])
    }

    /// Counter of calls made so far (shared handle, usable after moving the
    /// mock into a wrapper).
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.index.clone()
    }

    fn next_outcome(&self) -> Result<String, LlmError> {
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .get(i)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(ScriptedOutcome::NetworkError);
        outcome.to_result()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let content = self.next_outcome()?;
        Ok(LlmResponse {
            content,
            model: "mock-1".to_string(),
            tokens_used: Some(64),
            latency_ms: 1,
        })
    }
}

#[async_trait]
impl SearchProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search_json(&self, _prompt: &str) -> Result<serde_json::Value, LlmError> {
        let content = self.next_outcome()?;
        parse_json_content(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_cycles_and_repeats_last_entry() {
        let mock = MockProvider::scripted(vec![
            ScriptedOutcome::ok("first"),
            ScriptedOutcome::ok("second"),
        ]);
        let req = LlmRequest::verdict("s", "p");
        assert_eq!(mock.complete(req.clone()).await.unwrap().content, "first");
        assert_eq!(mock.complete(req.clone()).await.unwrap().content, "second");
        assert_eq!(mock.complete(req).await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn search_json_parses_scripted_content() {
        let mock = MockProvider::constant("{\"incident_confirmed\": true}");
        let value = mock.search_json("did it happen?").await.unwrap();
        assert_eq!(value["incident_confirmed"], serde_json::json!(true));
    }
}
