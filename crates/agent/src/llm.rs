use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::session::Message;
use parley_core::Language;
use serde::Serialize;
use thiserror::Error;

/// Invoked for every streamed delta with `(delta, accumulated_so_far)`.
pub type ProgressCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Static description of one text-generation backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub endpoint: String,
    pub model: String,
    pub enabled: bool,
    /// When set, the provider is only tried for this conversation language.
    pub language_restriction: Option<Language>,
}

#[derive(Clone)]
pub struct CompletionRequest {
    pub message: String,
    pub history: Vec<Message>,
    pub system_prompt: String,
    pub progress: Option<ProgressCallback>,
}

impl CompletionRequest {
    pub fn new(message: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            system_prompt: system_prompt.into(),
            progress: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

impl std::fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("message", &self.message)
            .field("history_len", &self.history.len())
            .field("system_prompt_len", &self.system_prompt.len())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} is not configured")]
    NotConfigured { provider: String },
    #[error("{provider} was force-failed for this request")]
    ForcedFailure { provider: String },
    #[error("{provider} is rate limited")]
    RateLimited { provider: String, retry_after: Option<Duration> },
    #[error("{provider} returned HTTP {status}: {body}")]
    Http { provider: String, status: u16, body: String },
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },
    #[error("{provider} response could not be decoded: {message}")]
    Decode { provider: String, message: String },
    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            Self::NotConfigured { provider }
            | Self::ForcedFailure { provider }
            | Self::RateLimited { provider, .. }
            | Self::Http { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Decode { provider, .. }
            | Self::EmptyResponse { provider } => provider,
        }
    }

    /// Stable machine-readable class used in logs and failure summaries.
    pub fn class(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "not_configured",
            Self::ForcedFailure { .. } => "forced_failure",
            Self::RateLimited { .. } => "rate_limited",
            Self::Http { .. } => "http_status",
            Self::Transport { .. } => "transport",
            Self::Decode { .. } => "decode",
            Self::EmptyResponse { .. } => "empty_response",
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    /// One request to the backend. Throttling is reported as
    /// [`ProviderError::RateLimited`]; retrying is the caller's decision.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{CompletionRequest, ProviderError};

    #[test]
    fn errors_expose_provider_and_class() {
        let error = ProviderError::RateLimited {
            provider: "grok".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(error.provider(), "grok");
        assert_eq!(error.class(), "rate_limited");

        let error = ProviderError::Http {
            provider: "openai".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(error.to_string(), "openai returned HTTP 500: boom");
    }

    #[test]
    fn request_debug_omits_prompt_body() {
        let request = CompletionRequest::new("hello", "a long secret system prompt");
        let debug = format!("{request:?}");
        assert!(debug.contains("hello"));
        assert!(!debug.contains("secret system prompt"));
    }
}
