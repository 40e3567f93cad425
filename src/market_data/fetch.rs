//! Rate-limited request helper shared by market-data providers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use tracing::warn;

use crate::config::MarketDataConfig;

/// Fixed-interval limiter: at most one outbound call per interval.
#[derive(Clone)]
pub struct Pacer {
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl Pacer {
    /// A zero interval disables pacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            limiter: Quota::with_period(interval).map(|quota| Arc::new(RateLimiter::direct(quota))),
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { limiter: None }
    }

    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first throttled response.
    pub max_retries: u32,
    /// Wait used when the response carries no usable retry hint.
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            default_retry_after: Duration::from_secs(65),
        }
    }
}

/// A response that may signal throttling.
pub trait Throttled {
    fn is_throttled(&self) -> bool;

    /// Retry hint carried by the response, if any.
    fn retry_after(&self) -> Option<Duration>;
}

impl Throttled for reqwest::Response {
    fn is_throttled(&self) -> bool {
        self.status() == StatusCode::TOO_MANY_REQUESTS
    }

    fn retry_after(&self) -> Option<Duration> {
        self.headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after)
    }
}

/// Parse a `Retry-After` value given in whole seconds. Zero is ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => None,
    }
}

/// Paces every outbound request and sleeps through throttling responses.
#[derive(Clone)]
pub struct RateLimitedFetcher {
    pacer: Pacer,
    policy: RetryPolicy,
}

impl RateLimitedFetcher {
    pub fn new(pacer: Pacer, policy: RetryPolicy) -> Self {
        Self { pacer, policy }
    }

    pub fn from_config(config: &MarketDataConfig) -> Self {
        Self::new(
            Pacer::new(Duration::from_millis(config.request_interval_ms)),
            RetryPolicy {
                max_retries: config.max_retries,
                default_retry_after: Duration::from_secs(config.default_retry_after_secs),
            },
        )
    }

    /// Send a request built by `send`, retrying while it is throttled.
    ///
    /// The last response is returned as-is once the retry budget is spent,
    /// throttled or not; the caller inspects its status.
    pub async fn send<R, E, F, Fut>(&self, mut send: F) -> Result<R, E>
    where
        R: Throttled,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let mut retries = 0;
        loop {
            self.pacer.until_ready().await;
            let response = send().await?;

            if !response.is_throttled() || retries >= self.policy.max_retries {
                return Ok(response);
            }

            let wait = response
                .retry_after()
                .unwrap_or(self.policy.default_retry_after);
            retries += 1;
            warn!(
                wait_secs = wait.as_secs(),
                attempt = retries,
                max_retries = self.policy.max_retries,
                "throttled by market data provider, waiting before retry"
            );
            tokio::time::sleep(wait).await;
        }
    }
}
