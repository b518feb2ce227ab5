//! Timeout and capped exponential backoff around single provider calls.

use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::GameProvider;
use crate::error::ProviderError;
use crate::models::{Game, League, Scope};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Per-attempt deadline
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay before retry `n` (0-based): `min(base * 2^n, max)`.
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Jittered into `[ceiling / 2, ceiling]` so pollers don't retry in lockstep.
    pub fn backoff(&self, retry: u32) -> Duration {
        let ceiling = self.backoff_ceiling(retry);
        let floor = ceiling / 2;
        if ceiling <= floor {
            return ceiling;
        }
        let jitter = rand::thread_rng().gen_range(0..=(ceiling - floor).as_millis() as u64);
        floor + Duration::from_millis(jitter)
    }
}

/// Call the provider until it succeeds, fails for good, or retries run out.
pub async fn fetch_with_retry(
    provider: &dyn GameProvider,
    league: League,
    scope: &Scope,
    policy: &RetryPolicy,
) -> Result<Vec<Game>, ProviderError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, provider.fetch(league, scope)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(policy.timeout)),
        };

        match result {
            Ok(games) => {
                debug!(
                    "[{}] {} {} returned {} games (attempt {})",
                    provider.name(),
                    league,
                    scope,
                    games.len(),
                    attempt
                );
                return Ok(games);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt > policy.max_retries => {
                return Err(ProviderError::FetchFailed {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt - 1);
                warn!(
                    "[{}] {} {} failed (attempt {}/{}): {}; retrying in {:?}",
                    provider.name(),
                    league,
                    scope,
                    attempt,
                    policy.max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
