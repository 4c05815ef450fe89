//! Per-service rate limiting for outbound API calls.
//!
//! Each named service gets a sliding window of admission timestamps with two
//! limits: requests per second and requests per minute. `wait` suspends the
//! caller until both limits admit one more request; callers on the same
//! service are serialized so the accounting stays accurate under
//! concurrency.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Limits for one service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceLimit {
    pub per_minute: f64,
    pub per_second: f64,
}

impl Default for ServiceLimit {
    fn default() -> Self {
        Self {
            per_minute: 60.0,
            per_second: 1.0,
        }
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    limit: ServiceLimit,
    /// Admission times within the last 60 s, oldest first
    history: VecDeque<Instant>,
}

/// Rate limiter shared by every collector and pipeline stage. One instance
/// is constructed at pipeline start and passed explicitly to collaborators.
#[derive(Debug, Default)]
pub struct ServiceRateLimiter {
    services: Mutex<HashMap<String, Arc<Mutex<ServiceState>>>>,
}

impl ServiceRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter preloaded with the production limit table.
    pub fn with_default_limits() -> Self {
        let limiter = Self::new();
        let table = [
            ("news-events", 60.0, 1.0),
            ("llm-search", 50.0, 1.0),
            ("web-search", 100.0, 10.0),
            ("regulator-list", 30.0, 1.0),
            ("regulator-detail", 30.0, 1.0),
            ("curated-list", 30.0, 1.0),
            ("curated-detail", 30.0, 0.5),
            ("openai", 200.0, 5.0),
            ("perplexity", 50.0, 1.0),
        ];
        // Constructor context: no other handles exist yet, so blocking_lock
        // is unnecessary; seed synchronously through try_lock.
        {
            let mut services = limiter
                .services
                .try_lock()
                .expect("fresh limiter is uncontended");
            for (name, per_minute, per_second) in table {
                services.insert(
                    name.to_string(),
                    Arc::new(Mutex::new(ServiceState {
                        limit: ServiceLimit {
                            per_minute,
                            per_second,
                        },
                        history: VecDeque::new(),
                    })),
                );
            }
        }
        limiter
    }

    async fn state_for(&self, service: &str) -> Arc<Mutex<ServiceState>> {
        let mut services = self.services.lock().await;
        services
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ServiceState::default())))
            .clone()
    }

    /// Set limits for a service. Idempotent; may be called before first use.
    pub async fn set_limit(
        &self,
        service: &str,
        per_minute: Option<f64>,
        per_second: Option<f64>,
    ) {
        let state = self.state_for(service).await;
        let mut state = state.lock().await;
        if let Some(per_minute) = per_minute {
            state.limit.per_minute = per_minute;
        }
        if let Some(per_second) = per_second {
            state.limit.per_second = per_second;
        }
    }

    /// Suspend until both limits admit one more request, then record the
    /// admission. Always returns after finite delay.
    pub async fn wait(&self, service: &str) {
        let state = self.state_for(service).await;
        // Holding the per-service lock for the whole wait serializes
        // callers: one pending waiter advances at a time.
        let mut state = state.lock().await;
        loop {
            let now = Instant::now();
            while state
                .history
                .front()
                .is_some_and(|t| now.duration_since(*t) >= Duration::from_secs(60))
            {
                state.history.pop_front();
            }

            if state.history.len() as f64 >= state.limit.per_minute {
                let oldest = *state.history.front().expect("non-empty at limit");
                let sleep = Duration::from_secs(60).saturating_sub(now.duration_since(oldest));
                if !sleep.is_zero() {
                    tokio::time::sleep(sleep).await;
                    continue;
                }
            }

            let recent = state
                .history
                .iter()
                .filter(|t| now.duration_since(**t) < Duration::from_secs(1))
                .count();
            if recent as f64 >= state.limit.per_second {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            state.history.push_back(now);
            return;
        }
    }

    /// Admissions currently inside the 60 s window (for tests and stats).
    pub async fn window_len(&self, service: &str) -> usize {
        let state = self.state_for(service).await;
        let state = state.lock().await;
        let now = Instant::now();
        state
            .history
            .iter()
            .filter(|t| now.duration_since(**t) < Duration::from_secs(60))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn per_second_limit_delays_excess_calls() {
        let limiter = ServiceRateLimiter::new();
        limiter.set_limit("svc", Some(1000.0), Some(2.0)).await;

        let start = Instant::now();
        limiter.wait("svc").await;
        limiter.wait("svc").await;
        assert!(start.elapsed() < Duration::from_millis(500));

        limiter.wait("svc").await;
        // Third call had to sit out the one-second window
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn window_never_exceeds_per_minute_limit() {
        let limiter = ServiceRateLimiter::new();
        limiter.set_limit("svc", Some(5.0), Some(100.0)).await;
        for _ in 0..5 {
            limiter.wait("svc").await;
        }
        assert_eq!(limiter.window_len("svc").await, 5);
    }

    #[tokio::test]
    async fn set_limit_is_idempotent_and_partial() {
        let limiter = ServiceRateLimiter::new();
        limiter.set_limit("svc", Some(10.0), None).await;
        limiter.set_limit("svc", Some(10.0), None).await;
        limiter.set_limit("svc", None, Some(3.0)).await;
        // Unknown services get defaults on first use
        limiter.wait("never-configured").await;
        assert_eq!(limiter.window_len("never-configured").await, 1);
    }

    #[tokio::test]
    async fn concurrent_waiters_are_serialized() {
        let limiter = Arc::new(ServiceRateLimiter::new());
        limiter.set_limit("svc", Some(100.0), Some(50.0)).await;
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.wait("svc").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(limiter.window_len("svc").await, 20);
    }
}
