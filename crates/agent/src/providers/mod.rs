//! HTTP adapters for the supported text-generation backends.

pub mod anthropic;
pub mod gemini;
pub mod openai_compat;

use std::sync::Arc;
use std::time::Duration;

use parley_core::config::{AppConfig, ProviderKind, ProviderSettings};
use parley_core::Language;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::llm::{CompletionRequest, ProviderAdapter, ProviderDescriptor, ProviderError};

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai_compat::OpenAiCompatAdapter;

/// Sampling parameters shared by every adapter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { max_tokens: 500, temperature: 0.7 }
    }
}

/// Builds one adapter per configured provider, in declaration order. Providers
/// without an API key are still returned, with `enabled == false`.
pub fn build_from_config(
    config: &AppConfig,
) -> Result<Vec<Arc<dyn ProviderAdapter>>, ProviderError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.providers.request_timeout_secs))
        .build()
        .map_err(|error| ProviderError::Transport {
            provider: "http_client".to_string(),
            message: error.to_string(),
        })?;
    let generation = GenerationSettings {
        max_tokens: config.providers.max_tokens,
        temperature: config.providers.temperature,
    };

    let adapters = ProviderKind::ALL
        .into_iter()
        .map(|kind| {
            let settings = config.providers.settings(kind);
            build_adapter(kind, settings, client.clone(), generation)
        })
        .collect();

    Ok(adapters)
}

fn build_adapter(
    kind: ProviderKind,
    settings: &ProviderSettings,
    client: reqwest::Client,
    generation: GenerationSettings,
) -> Arc<dyn ProviderAdapter> {
    let api_key = settings.api_key.clone().filter(|_| settings.is_enabled());
    match kind {
        ProviderKind::Grok | ProviderKind::OpenAi => Arc::new(OpenAiCompatAdapter::new(
            kind.name(),
            &settings.base_url,
            &settings.model,
            api_key,
            client,
            generation,
            settings.stream,
        )),
        ProviderKind::AtlasChat => Arc::new(
            OpenAiCompatAdapter::new(
                kind.name(),
                &settings.base_url,
                &settings.model,
                api_key,
                client,
                generation,
                settings.stream,
            )
            .restricted_to(Language::Ary),
        ),
        ProviderKind::Gemini => Arc::new(GeminiAdapter::new(
            &settings.base_url,
            &settings.model,
            api_key,
            client,
            generation,
        )),
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(
            &settings.base_url,
            &settings.model,
            api_key,
            client,
            generation,
        )),
    }
}

pub(crate) fn descriptor(
    name: &str,
    endpoint: String,
    model: &str,
    api_key: Option<&SecretString>,
) -> ProviderDescriptor {
    ProviderDescriptor {
        name: name.to_string(),
        endpoint,
        model: model.to_string(),
        enabled: api_key.is_some_and(|key| !key.expose_secret().trim().is_empty()),
        language_restriction: None,
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn require_key<'a>(
    provider: &str,
    api_key: Option<&'a SecretString>,
) -> Result<&'a str, ProviderError> {
    api_key
        .map(|key| key.expose_secret())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ProviderError::NotConfigured { provider: provider.to_string() })
}

/// `Retry-After` as delta-seconds. HTTP-date values are ignored.
pub(crate) fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let text = value.to_str().ok()?.trim();
    let seconds = text.parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Sends a prepared request and maps transport failures, 429 and other non-2xx
/// statuses onto [`ProviderError`].
pub(crate) async fn send(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = request.send().await.map_err(|error| ProviderError::Transport {
        provider: provider.to_string(),
        message: error.to_string(),
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after_from_headers(response.headers());
        return Err(ProviderError::RateLimited { provider: provider.to_string(), retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http { provider: provider.to_string(), status: status.as_u16(), body })
}

pub(crate) async fn read_json(
    provider: &str,
    response: reqwest::Response,
) -> Result<Value, ProviderError> {
    response.json::<Value>().await.map_err(|error| ProviderError::Decode {
        provider: provider.to_string(),
        message: error.to_string(),
    })
}

pub(crate) fn non_empty(provider: &str, text: Option<&str>) -> Result<String, ProviderError> {
    match text.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ProviderError::EmptyResponse { provider: provider.to_string() }),
    }
}

/// History followed by the new user message, as `{role, content}` objects.
pub(crate) fn chat_turns(request: &CompletionRequest) -> Vec<Value> {
    request
        .history
        .iter()
        .map(|message| json!({ "role": message.role.as_str(), "content": message.content }))
        .chain(std::iter::once(json!({ "role": "user", "content": request.message })))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use serde_json::Value;

    /// Requests captured by a mock provider: `(headers as lowercase pairs, json body)`.
    pub type Captured = Arc<Mutex<Vec<(Vec<(String, String)>, Value)>>>;

    pub async fn spawn(router: Router) -> String {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock provider");
        let address = listener.local_addr().expect("mock provider address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    pub fn header_pairs(headers: &axum::http::HeaderMap) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(name, value)| {
                (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string())
            })
            .collect()
    }

    pub fn header<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
        pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_core::config::{AppConfig, ProviderKind};
    use parley_core::session::Message;
    use parley_core::Language;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    use super::{build_from_config, chat_turns, join_url, retry_after_from_headers};
    use crate::llm::CompletionRequest;

    #[test]
    fn retry_after_parses_delta_seconds_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_from_headers(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 7 "));
        assert_eq!(retry_after_from_headers(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after_from_headers(&headers), None);
    }

    #[test]
    fn urls_are_joined_without_double_slashes() {
        assert_eq!(
            join_url("https://api.x.ai/v1/", "/chat/completions"),
            "https://api.x.ai/v1/chat/completions"
        );
    }

    #[test]
    fn chat_turns_append_user_message_after_history() {
        let request = CompletionRequest::new("Combien ?", "system")
            .with_history(vec![Message::user("Salut"), Message::assistant("Bonjour !")]);
        let turns = chat_turns(&request);

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[1]["role"], "assistant");
        assert_eq!(turns[2]["content"], "Combien ?");
    }

    #[test]
    fn registry_marks_providers_without_keys_disabled() {
        let mut config = AppConfig::default();
        config.providers.atlas_chat.api_key = Some("hf-test".to_string().into());

        let adapters = build_from_config(&config).expect("http client builds");
        assert_eq!(adapters.len(), ProviderKind::ALL.len());

        let atlas = adapters
            .iter()
            .find(|adapter| adapter.descriptor().name == "atlas_chat")
            .expect("atlas adapter");
        assert!(atlas.descriptor().enabled);
        assert_eq!(atlas.descriptor().language_restriction, Some(Language::Ary));
        assert!(atlas.descriptor().endpoint.ends_with("/chat/completions"));

        let disabled = adapters.iter().filter(|adapter| !adapter.descriptor().enabled).count();
        assert_eq!(disabled, 4);
    }
}
