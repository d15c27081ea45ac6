//! Exponential backoff around model calls.

use deskpilot_config::RetryConfig;
use deskpilot_core::error::ProviderError;
use deskpilot_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): doubling, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Call the provider, retrying retryable failures with backoff.
///
/// Non-retryable errors (auth, 400s, overflow) return immediately so the
/// caller can handle them.
pub async fn complete_with_retry(
    provider: &dyn Provider,
    request: &ProviderRequest,
    policy: &RetryPolicy,
) -> Result<ProviderResponse, ProviderError> {
    let mut attempt = 1;
    loop {
        match provider.complete(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let mut delay = policy.delay_for(attempt);
                if let ProviderError::RateLimited { retry_after_secs } = &e {
                    delay = delay.max(Duration::from_secs(*retry_after_secs)).min(policy.max_delay);
                }
                warn!(
                    provider = provider.name(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Model call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
