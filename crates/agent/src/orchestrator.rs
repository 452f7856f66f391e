//! Sequential provider fallback.
//!
//! Providers are tried one at a time in a language-aware order; the first
//! success is verified and returned, and nothing after it is called. Total
//! failure is a value, never an error.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use parley_core::session::Message;
use parley_core::Language;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::{with_throttle_retry, ThrottlePolicy};
use crate::llm::{CompletionRequest, ProgressCallback, ProviderAdapter, ProviderError};
use crate::supervision::{Supervisor, Verification};

/// Provider calls slower than this are logged at `warn`.
pub const SLOW_PROVIDER_MS: u64 = 800;

#[derive(Clone, Default)]
pub struct RespondOptions {
    /// Provider names to skip as if they had failed. Debugging aid.
    pub force_fail: HashSet<String>,
    pub progress: Option<ProgressCallback>,
    pub session_id: Option<String>,
}

impl RespondOptions {
    pub fn force_failing<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_fail.extend(providers.into_iter().map(Into::into));
        self
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

impl std::fmt::Debug for RespondOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespondOptions")
            .field("force_fail", &self.force_fail)
            .field("progress", &self.progress.is_some())
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub class: &'static str,
    pub message: String,
}

impl From<&ProviderError> for ProviderFailure {
    fn from(error: &ProviderError) -> Self {
        Self {
            provider: error.provider().to_string(),
            class: error.class(),
            message: error.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrchestrationResult {
    Success {
        text: String,
        provider: String,
        latency_ms: u64,
        /// `None` when supervision is disabled.
        verification: Option<Verification>,
        fallbacks_used: usize,
    },
    Failure {
        error: String,
        errors: Vec<ProviderFailure>,
    },
}

impl OrchestrationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success { text, .. } => Some(text),
            Self::Failure { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LatencyMetrics {
    pub last_provider: Option<String>,
    pub last_latency_ms: u64,
    pub average_latency_ms: f64,
    pub calls: u64,
}

impl LatencyMetrics {
    fn record(&mut self, provider: &str, latency_ms: u64) {
        self.calls += 1;
        self.last_provider = Some(provider.to_string());
        self.last_latency_ms = latency_ms;
        self.average_latency_ms +=
            (latency_ms as f64 - self.average_latency_ms) / self.calls as f64;
    }
}

pub struct Orchestrator {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    supervisor: Option<Supervisor>,
    throttle: ThrottlePolicy,
    metrics: Mutex<LatencyMetrics>,
}

impl Orchestrator {
    /// `providers` in registration order; language-restricted providers are
    /// only tried for their language.
    pub fn new(
        providers: Vec<Arc<dyn ProviderAdapter>>,
        supervisor: Option<Supervisor>,
        throttle: ThrottlePolicy,
    ) -> Self {
        Self { providers, supervisor, throttle, metrics: Mutex::new(LatencyMetrics::default()) }
    }

    pub fn providers(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.providers
    }

    /// Unrestricted providers in registration order, with an enabled
    /// provider restricted to `language` inserted second.
    pub fn provider_order(&self, language: Language) -> Vec<Arc<dyn ProviderAdapter>> {
        let mut order: Vec<Arc<dyn ProviderAdapter>> = self
            .providers
            .iter()
            .filter(|provider| provider.descriptor().language_restriction.is_none())
            .cloned()
            .collect();

        let restricted = self.providers.iter().filter(|provider| {
            let descriptor = provider.descriptor();
            descriptor.enabled && descriptor.language_restriction == Some(language)
        });
        for (offset, provider) in restricted.enumerate() {
            let position = (1 + offset).min(order.len());
            order.insert(position, Arc::clone(provider));
        }
        order
    }

    pub fn metrics(&self) -> LatencyMetrics {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub async fn respond(
        &self,
        message: &str,
        history: &[Message],
        system_prompt: &str,
        language: Language,
        options: &RespondOptions,
    ) -> OrchestrationResult {
        let request = CompletionRequest::new(message, system_prompt)
            .with_history(history.to_vec())
            .with_progress(options.progress.clone());
        let mut errors: Vec<ProviderFailure> = Vec::new();

        for provider in self.provider_order(language) {
            let descriptor = provider.descriptor();
            let name = descriptor.name.as_str();

            let skipped = if !descriptor.enabled {
                Some(ProviderError::NotConfigured { provider: name.to_string() })
            } else if options.force_fail.contains(name) {
                Some(ProviderError::ForcedFailure { provider: name.to_string() })
            } else {
                None
            };
            if let Some(error) = skipped {
                debug!(
                    event_name = "agent.orchestrator.provider_skipped",
                    provider = name,
                    class = error.class(),
                    "skipping provider"
                );
                errors.push(ProviderFailure::from(&error));
                continue;
            }

            let started = Instant::now();
            match with_throttle_retry(self.throttle, || provider.complete(&request)).await {
                Ok(draft) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.record_latency(name, latency_ms);

                    let verification = match &self.supervisor {
                        Some(supervisor) => {
                            let session_id = options.session_id.as_deref();
                            Some(supervisor.verify(&draft, language, session_id).await)
                        }
                        None => None,
                    };
                    let text = verification
                        .as_ref()
                        .map_or(draft, |verification| verification.text.clone());

                    info!(
                        event_name = "agent.orchestrator.responded",
                        provider = name,
                        latency_ms,
                        fallbacks_used = errors.len(),
                        language = language.code(),
                        "reply generated"
                    );
                    return OrchestrationResult::Success {
                        text,
                        provider: name.to_string(),
                        latency_ms,
                        verification,
                        fallbacks_used: errors.len(),
                    };
                }
                Err(error) => {
                    warn!(
                        event_name = "agent.orchestrator.provider_failed",
                        provider = name,
                        class = error.class(),
                        error = %error,
                        "provider failed, trying next"
                    );
                    errors.push(ProviderFailure::from(&error));
                }
            }
        }

        warn!(
            event_name = "agent.orchestrator.exhausted",
            attempted = errors.len(),
            language = language.code(),
            "every provider failed or was skipped"
        );
        OrchestrationResult::Failure {
            error: format!("all {} providers failed or were unavailable", errors.len()),
            errors,
        }
    }

    fn record_latency(&self, provider: &str, latency_ms: u64) {
        let average = {
            let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
            metrics.record(provider, latency_ms);
            metrics.average_latency_ms
        };

        if latency_ms > SLOW_PROVIDER_MS {
            warn!(
                event_name = "agent.orchestrator.provider_latency",
                provider,
                latency_ms,
                average_ms = average,
                "slow provider response"
            );
        } else {
            debug!(
                event_name = "agent.orchestrator.provider_latency",
                provider,
                latency_ms,
                average_ms = average,
                "provider response time"
            );
        }
    }
}
