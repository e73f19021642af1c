//! Retrying provider: bounded exponential backoff around another provider.
//!
//! Retryable failures (rate limits, timeouts, network errors, 5xx) are tried
//! again after `base_delay * 2^attempt`, capped at `max_delay`. Anything else
//! is returned to the caller immediately.

use agentrelay_core::error::ProviderError;
use agentrelay_core::provider::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&agentrelay_config::RetryConfig> for RetryPolicy {
    fn from(config: &agentrelay_config::RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// A provider that retries its inner provider on transient failures.
pub struct RetryProvider {
    inner: Arc<dyn agentrelay_core::Provider>,
    policy: RetryPolicy,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn agentrelay_core::Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl agentrelay_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!(provider = %self.inner.name(), attempt, "Retry: succeeded");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        provider = %self.inner.name(),
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retry: transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrelay_core::Provider;
    use agentrelay_core::message::Message;
    use std::sync::Mutex;

    /// Fails with the given error `failures` times, then succeeds.
    struct FlakyProvider {
        failures: usize,
        error: ProviderError,
        call_count: Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(failures: usize, error: ProviderError) -> Self {
            Self {
                failures,
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            if *count <= self.failures {
                return Err(self.error.clone());
            }
            Ok(ProviderResponse {
                message: Message::assistant("ok"),
                usage: None,
                model: request.model,
            })
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = fast_policy(5);
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for(40), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let inner = Arc::new(FlakyProvider::new(2, ProviderError::Network("reset".into())));
        let provider = RetryProvider::new(inner.clone(), fast_policy(3));

        let response = provider
            .complete(ProviderRequest::new("m", "s", "u"))
            .await
            .unwrap();
        assert_eq!(response.message.content, "ok");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(FlakyProvider::new(
            10,
            ProviderError::Timeout("slow".into()),
        ));
        let provider = RetryProvider::new(inner.clone(), fast_policy(2));

        let err = provider
            .complete(ProviderRequest::new("m", "s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_return_immediately() {
        let inner = Arc::new(FlakyProvider::new(
            10,
            ProviderError::AuthenticationFailed("bad key".into()),
        ));
        let provider = RetryProvider::new(inner.clone(), fast_policy(3));

        assert!(provider.complete(ProviderRequest::new("m", "s", "u")).await.is_err());
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn policy_from_config() {
        let policy = RetryPolicy::from(&agentrelay_config::RetryConfig::default());
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
    }
}
