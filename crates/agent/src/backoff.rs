use std::future::Future;
use std::time::Duration;

use parley_core::config::ProvidersConfig;
use tracing::warn;

use crate::llm::ProviderError;

/// A throttled call is retried at most this many times. A second consecutive
/// 429 is returned to the caller as an ordinary provider failure.
pub const MAX_THROTTLE_RETRIES: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub default_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_millis(2_000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl ThrottlePolicy {
    pub fn from_config(providers: &ProvidersConfig) -> Self {
        Self {
            default_delay: Duration::from_millis(providers.rate_limit_default_delay_ms),
            max_delay: Duration::from_millis(providers.rate_limit_max_delay_ms),
        }
    }

    /// Provider hint when present, otherwise the default, never above the maximum.
    pub fn delay_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.default_delay).min(self.max_delay)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ThrottleState {
    FirstAttempt,
    Retrying { retries_used: u32 },
}

impl ThrottleState {
    fn retries_used(self) -> u32 {
        match self {
            Self::FirstAttempt => 0,
            Self::Retrying { retries_used } => retries_used,
        }
    }

    fn can_retry(self) -> bool {
        self.retries_used() < MAX_THROTTLE_RETRIES
    }

    fn next(self) -> Self {
        Self::Retrying { retries_used: self.retries_used() + 1 }
    }
}

/// Runs `attempt`, sleeping and retrying when it reports a rate limit, for at
/// most [`MAX_THROTTLE_RETRIES`] retries. Every other outcome is returned as is.
pub async fn with_throttle_retry<F, Fut>(
    policy: ThrottlePolicy,
    mut attempt: F,
) -> Result<String, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, ProviderError>>,
{
    let mut state = ThrottleState::FirstAttempt;

    loop {
        match attempt().await {
            Err(ProviderError::RateLimited { provider, retry_after }) if state.can_retry() => {
                let delay = policy.delay_for(retry_after);
                warn!(
                    event_name = "agent.provider.rate_limited",
                    provider = %provider,
                    delay_ms = delay.as_millis() as u64,
                    retry = state.retries_used() + 1,
                    "provider throttled, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                state = state.next();
            }
            outcome => return outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{with_throttle_retry, ThrottlePolicy, MAX_THROTTLE_RETRIES};
    use crate::llm::ProviderError;

    fn throttled(retry_after: Option<Duration>) -> ProviderError {
        ProviderError::RateLimited { provider: "grok".to_string(), retry_after }
    }

    #[test]
    fn delay_prefers_hint_and_is_clamped() {
        let policy = ThrottlePolicy {
            default_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(Some(Duration::from_secs(3))), Duration::from_secs(3));
        assert_eq!(policy.delay_for(Some(Duration::from_secs(600))), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn single_throttle_is_retried_after_hinted_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let counter = Arc::clone(&calls);
        let result = with_throttle_retry(ThrottlePolicy::default(), || {
            let counter = Arc::clone(&counter);
            async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(throttled(Some(Duration::from_secs(3)))),
                    _ => Ok("Salam".to_string()),
                }
            }
        })
        .await;

        assert_eq!(result.expect("second attempt succeeds"), "Salam");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn second_consecutive_throttle_propagates() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result = with_throttle_retry(ThrottlePolicy::default(), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(throttled(None))
            }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_THROTTLE_RETRIES + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result = with_throttle_retry(ThrottlePolicy::default(), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Http {
                    provider: "openai".to_string(),
                    status: 500,
                    body: String::new(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Http { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
