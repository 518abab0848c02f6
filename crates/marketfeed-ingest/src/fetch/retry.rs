//! Single-page fetching with bounded retry and backoff
//!
//! Transport failures back off linearly (`base_delay * attempt`); explicit
//! rate limiting backs off exponentially with a hard cap. An empty `data`
//! payload is ambiguous — it may be a transient gap — so it is retried like
//! a failure and only accepted as genuine emptiness once attempts run out.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::api::{ApiClient, FetchRequest, PageEnvelope, PageResult};
use crate::config::ApiConfig;
use crate::error::{IngestError, Result};

/// Shared retry configuration. Not mutated at runtime.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Unit delay for transport-failure backoff (`base_delay * attempt`).
    pub base_delay: Duration,
    /// Unit for rate-limit backoff (`unit * 2^attempt`, capped).
    pub rate_limit_unit: Duration,
    /// Ceiling on any single rate-limit delay.
    pub rate_limit_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_unit: Duration::from_secs(1),
            rate_limit_cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_api_config(config: &ApiConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            base_delay: config.retry_base_delay(),
            ..Self::default()
        }
    }

    /// Delay after a transport-level failure on `attempt` (1-based).
    pub fn transport_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Delay after an explicit rate-limit signal on `attempt` (1-based).
    /// Non-decreasing in the attempt number and never above the cap.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.rate_limit_unit
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
            .min(self.rate_limit_cap)
    }
}

/// Blocking (with respect to its caller) single-page fetcher. This is the
/// unit the concurrent pool schedules and the fallback path leans on.
#[derive(Debug, Clone)]
pub struct RetryingSingleFetcher {
    client: ApiClient,
    policy: RetryPolicy,
}

impl RetryingSingleFetcher {
    pub fn new(client: ApiClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch a page, retrying until data arrives or attempts run out.
    ///
    /// Never fails past this boundary: exhausted attempts yield either a
    /// legitimately-empty result (an empty payload was seen at least once)
    /// or an error-marked result.
    pub async fn fetch(&self, request: &FetchRequest) -> PageResult {
        let mut saw_empty = false;

        for attempt in 1..=self.policy.max_attempts {
            match self.client.get_page(request).await {
                Ok(envelope) if !envelope.data.is_empty() => {
                    return PageResult::data(request.page, envelope.data);
                }
                Ok(_) => {
                    saw_empty = true;
                    debug!(
                        endpoint = %request.entity,
                        page = request.page,
                        attempt,
                        "empty payload, retrying before accepting emptiness"
                    );
                    if attempt < self.policy.max_attempts {
                        sleep(self.policy.transport_delay(attempt)).await;
                    }
                }
                Err(IngestError::RateLimited) => {
                    let delay = self.policy.rate_limit_delay(attempt);
                    warn!(
                        endpoint = %request.entity,
                        page = request.page,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    debug!(
                        endpoint = %request.entity,
                        page = request.page,
                        attempt,
                        error = %err,
                        "page fetch failed"
                    );
                    if attempt < self.policy.max_attempts {
                        sleep(self.policy.transport_delay(attempt)).await;
                    }
                }
            }
        }

        if saw_empty {
            PageResult::empty(request.page)
        } else {
            PageResult::error(request.page)
        }
    }

    /// Fetch the raw envelope, retrying on any failure but returning the
    /// first successful response even when its `data` array is empty.
    /// Pagination discovery needs the `meta` block, not the records.
    pub async fn fetch_envelope(&self, request: &FetchRequest) -> Result<PageEnvelope> {
        let mut last_err = IngestError::queue("no fetch attempt was made");

        for attempt in 1..=self.policy.max_attempts {
            match self.client.get_page(request).await {
                Ok(envelope) => return Ok(envelope),
                Err(IngestError::RateLimited) => {
                    let delay = self.policy.rate_limit_delay(attempt);
                    warn!(
                        endpoint = %request.entity,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited during pagination discovery, backing off"
                    );
                    sleep(delay).await;
                    last_err = IngestError::RateLimited;
                }
                Err(err) => {
                    debug!(endpoint = %request.entity, attempt, error = %err, "discovery fetch failed");
                    if attempt < self.policy.max_attempts {
                        sleep(self.policy.transport_delay(attempt)).await;
                    }
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.transport_delay(1), Duration::from_secs(1));
        assert_eq!(policy.transport_delay(2), Duration::from_secs(2));
        assert_eq!(policy.transport_delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_rate_limit_delay_monotonic_and_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<Duration> = (1..=6).map(|a| policy.rate_limit_delay(a)).collect();

        for window in delays.windows(2) {
            assert!(window[1] >= window[0], "delays must be non-decreasing");
        }
        for delay in &delays {
            assert!(*delay <= Duration::from_secs(60));
        }
        assert_eq!(delays[0], Duration::from_secs(2));
        assert_eq!(delays[4], Duration::from_secs(32));
        assert_eq!(delays[5], Duration::from_secs(60));
    }

    #[test]
    fn test_rate_limit_delay_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_policy_from_api_config() {
        let config = ApiConfig {
            base_url: "http://localhost".to_string(),
            api_key: "k".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 5,
            retry_base_delay_ms: 250,
        };
        let policy = RetryPolicy::from_api_config(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.rate_limit_cap, Duration::from_secs(60));
    }
}
