//! Retry decorator: repeats a fetch on transport failures with linear backoff.

use super::basic::{Fetch, Fetched};
use super::models::FetchLog;
use crate::config::FetchSettings;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep before attempt `n + 1` is `n * backoff_step`.
    pub backoff_step: Duration,
}

impl RetryPolicy {
    pub fn new(settings: &FetchSettings) -> Self {
        Self {
            max_attempts: settings.retries.max(1),
            backoff_step: Duration::from_millis(settings.retry_backoff_ms),
        }
    }

    pub fn backoff(&self, attempts_made: u32) -> Duration {
        self.backoff_step * attempts_made
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(500),
        }
    }
}

pub struct RetryFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: Fetch> RetryFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<F: Fetch> Fetch for RetryFetcher<F> {
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched {
        let mut attempts_made = 0;
        loop {
            let fetched = self.inner.fetch(url, log);
            attempts_made += 1;
            if !fetched.outcome.is_retryable() || attempts_made >= self.policy.max_attempts {
                return fetched;
            }
            let backoff = self.policy.backoff(attempts_made);
            debug!(
                url,
                attempt = attempts_made,
                backoff_ms = backoff.as_millis() as u64,
                "Retrying after network error"
            );
            if !backoff.is_zero() {
                std::thread::sleep(backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::basic::BasicFetcher;
    use crate::fetch::models::ResponseOutcome;
    use crate::fetch::testing::ScriptedTransport;
    use crate::fetch::transport::Headers;
    use std::sync::Arc;

    fn retrying(transport: Arc<ScriptedTransport>, max_attempts: u32) -> RetryFetcher<BasicFetcher> {
        RetryFetcher::new(
            BasicFetcher::new(transport, Headers::new(), Duration::from_secs(1)),
            RetryPolicy {
                max_attempts,
                backoff_step: Duration::ZERO,
            },
        )
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..10 {
            transport.push_failure();
        }
        let err = retrying(transport.clone(), 4).download("https://a").unwrap_err();

        assert_eq!(transport.request_count(), 4);
        assert_eq!(err.outcome, ResponseOutcome::NetworkError);
        assert_eq!(err.log.len(), 4);
    }

    #[test]
    fn test_stops_on_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_failure();
        transport.push_failure();
        transport.push_status(200);
        transport.push_status(200);

        let response = retrying(transport.clone(), 4).download("https://a").unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(transport.request_count(), 3);
    }

    #[test]
    fn test_content_failures_are_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_failure();
        transport.push_status(404);
        transport.push_status(200);

        let err = retrying(transport.clone(), 5).download("https://a").unwrap_err();
        assert_eq!(err.outcome, ResponseOutcome::InvalidContent);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn test_quota_exceeded_surfaces_without_retry() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(429);
        let err = retrying(transport.clone(), 3).download("https://a").unwrap_err();
        assert_eq!(err.outcome, ResponseOutcome::QuotaExceeded);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
    }
}
