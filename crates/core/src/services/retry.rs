use std::future::Future;
use std::time::Duration;

use crate::errors::CoreError;

/// Caller-side retry with exponential backoff, layered above the gateway.
///
/// - Throttling errors: up to `throttle_retries` retries, delay
///   `min(throttle_base * 2^attempt, max_delay)`.
/// - Other 4xx: never retried.
/// - Everything else: up to `retries` retries, delay
///   `min(base * 2^attempt, max_delay)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub throttle_retries: u32,
    pub throttle_base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(1000),
            throttle_retries: 2,
            throttle_base_delay: Duration::from_millis(5000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            retries: 0,
            throttle_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based) after `error`, or `None`
    /// when the error must be surfaced.
    pub fn delay_for(&self, attempt: u32, error: &CoreError) -> Option<Duration> {
        let (limit, base) = if error.is_rate_limited() {
            (self.throttle_retries, self.throttle_base_delay)
        } else if error.is_client_error() || error.is_rejected_command() {
            return None;
        } else {
            (self.retries, self.base_delay)
        };
        if attempt >= limit {
            return None;
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(base.saturating_mul(factor).min(self.max_delay))
    }

    /// Run `op` until it succeeds or the policy gives up.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => match self.delay_for(attempt, &e) {
                    Some(delay) => {
                        tracing::warn!(
                            op = label,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying upstream call"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}
