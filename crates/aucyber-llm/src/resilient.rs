//! Retry with exponential backoff plus a per-service circuit breaker.
//!
//! Applied as a decorator to outbound calls (LLM, search, scraping). Auth
//! and non-429 client errors propagate immediately; rate-limit, server,
//! network, and unknown errors retry with jittered exponential backoff.
//! After enough consecutive failures the breaker opens and callers skip the
//! service for the cooldown period; a single success resets it.

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::provider::{LlmError, LlmProvider, LlmRequest, LlmResponse};

/// Error classes driving the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Auth,
    Client,
    RateLimit,
    Server,
    Network,
    Unknown,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::RateLimit | ErrorClass::Server | ErrorClass::Network | ErrorClass::Unknown
        )
    }
}

/// Classify a provider error.
pub fn classify(error: &LlmError) -> ErrorClass {
    match error {
        LlmError::Auth(_) => ErrorClass::Auth,
        LlmError::Client { .. } => ErrorClass::Client,
        LlmError::RateLimited => ErrorClass::RateLimit,
        LlmError::Server { .. } => ErrorClass::Server,
        LlmError::Network(_) => ErrorClass::Network,
        LlmError::InvalidResponse(_) => ErrorClass::Unknown,
        LlmError::NotAvailable => ErrorClass::Unknown,
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (1-based):
    /// `min(base · mult^(attempt-1), max)` plus up to 10% jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter = rand::rng().random_range(0.0..capped * 0.1);
        Duration::from_secs_f64(capped + jitter)
    }
}

/// Circuit breaker for one service: an atomic consecutive-failure counter
/// and the instants of the last failure and success.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: AtomicU32,
    last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.to_string(),
            threshold,
            cooldown,
            consecutive_failures: AtomicU32::new(0),
            last_failure: RwLock::new(None),
        }
    }

    /// Breaker with the production defaults: trip after 5 consecutive
    /// failures, skip for 5 minutes.
    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, 5, Duration::from_secs(300))
    }

    /// True while the breaker is open: the failure count reached the
    /// threshold and the cooldown since the tripping failure has not
    /// elapsed. After the cooldown, calls flow again; the counter only
    /// resets on success.
    pub async fn should_skip(&self) -> bool {
        if self.consecutive_failures.load(Ordering::Relaxed) < self.threshold {
            return false;
        }
        match *self.last_failure.read().await {
            Some(at) => at.elapsed() < self.cooldown,
            None => false,
        }
    }

    pub async fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_failure.write().await = Some(Instant::now());
        if failures == self.threshold {
            tracing::warn!(
                service = %self.name,
                failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Circuit opened"
            );
        }
    }

    pub async fn record_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::Relaxed);
        if previous >= self.threshold {
            tracing::info!(service = %self.name, "Circuit closed after success");
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

/// Resilient wrapper composing retry and circuit breaking around any
/// provider.
#[derive(Debug)]
pub struct Resilient<P> {
    inner: P,
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl<P: LlmProvider> Resilient<P> {
    pub fn new(inner: P, policy: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    pub fn wrap(inner: P) -> Self {
        let name = inner.name().to_string();
        Self::new(
            inner,
            RetryPolicy::default(),
            Arc::new(CircuitBreaker::with_defaults(&name)),
        )
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[async_trait]
impl<P: LlmProvider> LlmProvider for Resilient<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        if self.breaker.should_skip().await {
            return Err(LlmError::NotAvailable);
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inner.complete(request.clone()).await {
                Ok(response) => {
                    self.breaker.record_success().await;
                    return Ok(response);
                }
                Err(error) => {
                    let class = classify(&error);
                    if !class.is_retryable() {
                        tracing::warn!(
                            provider = %self.inner.name(),
                            error = %error,
                            "Non-retryable error, propagating"
                        );
                        return Err(error);
                    }
                    self.breaker.record_failure().await;
                    if attempt > self.policy.max_retries || self.breaker.should_skip().await {
                        return Err(error);
                    }
                    let delay = self.policy.delay(attempt);
                    tracing::debug!(
                        provider = %self.inner.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProvider, ScriptedOutcome};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
        };
        // attempt 4 would be 8s uncapped; jitter adds at most 10%
        let d = policy.delay(4);
        assert!(d >= Duration::from_secs(4));
        assert!(d <= Duration::from_millis(4400));
    }

    #[test]
    fn classification_matches_retry_table() {
        assert!(!classify(&LlmError::Auth("bad key".into())).is_retryable());
        assert!(!classify(&LlmError::Client {
            status: 404,
            message: String::new()
        })
        .is_retryable());
        assert!(classify(&LlmError::RateLimited).is_retryable());
        assert!(classify(&LlmError::Server {
            status: 500,
            message: String::new()
        })
        .is_retryable());
        assert!(classify(&LlmError::Network("reset".into())).is_retryable());
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let mock = MockProvider::scripted(vec![ScriptedOutcome::auth_error()]);
        let calls = mock.call_counter();
        let resilient = Resilient::new(
            mock,
            fast_policy(),
            Arc::new(CircuitBreaker::with_defaults("mock")),
        );
        let result = resilient.complete(LlmRequest::verdict("s", "p")).await;
        assert!(matches!(result, Err(LlmError::Auth(_))));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn server_errors_retry_then_succeed() {
        let mock = MockProvider::scripted(vec![
            ScriptedOutcome::server_error(),
            ScriptedOutcome::server_error(),
            ScriptedOutcome::ok("{\"fine\": true}"),
        ]);
        let calls = mock.call_counter();
        let resilient = Resilient::new(
            mock,
            fast_policy(),
            Arc::new(CircuitBreaker::with_defaults("mock")),
        );
        let result = resilient.complete(LlmRequest::verdict("s", "p")).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn five_consecutive_failures_trip_the_breaker() {
        // Scenario: inject five consecutive 500s, observe the halt, wait out
        // the cooldown, then confirm a single success resets the counter.
        let breaker = Arc::new(CircuitBreaker::new(
            "llm-search",
            5,
            Duration::from_millis(200),
        ));
        let mock = MockProvider::scripted(vec![
            ScriptedOutcome::server_error(),
            ScriptedOutcome::server_error(),
            ScriptedOutcome::server_error(),
            ScriptedOutcome::server_error(),
            ScriptedOutcome::server_error(),
            ScriptedOutcome::ok("{}"),
        ]);
        let resilient = Resilient::new(
            mock,
            RetryPolicy {
                max_retries: 10,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 1.0,
            },
            breaker.clone(),
        );

        // The call loop stops as soon as the breaker trips mid-retry.
        let result = resilient.complete(LlmRequest::verdict("s", "p")).await;
        assert!(result.is_err());
        assert!(breaker.should_skip().await);

        // Callers skip the service while the cooldown runs.
        let skipped = resilient.complete(LlmRequest::verdict("s", "p")).await;
        assert!(matches!(skipped, Err(LlmError::NotAvailable)));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!breaker.should_skip().await);

        // First success resets the failure count.
        let result = resilient.complete(LlmRequest::verdict("s", "p")).await;
        assert!(result.is_ok());
        assert_eq!(breaker.consecutive_failures(), 0);
    }
}
