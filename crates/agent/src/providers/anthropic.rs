use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{json, Value};

use super::{
    chat_turns, descriptor, join_url, non_empty, read_json, require_key, send, GenerationSettings,
};
use crate::llm::{CompletionRequest, ProviderAdapter, ProviderDescriptor, ProviderError};

const NAME: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API backend.
pub struct AnthropicAdapter {
    descriptor: ProviderDescriptor,
    api_key: Option<SecretString>,
    client: reqwest::Client,
    generation: GenerationSettings,
}

impl AnthropicAdapter {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<SecretString>,
        client: reqwest::Client,
        generation: GenerationSettings,
    ) -> Self {
        let endpoint = join_url(base_url, "messages");
        Self {
            descriptor: descriptor(NAME, endpoint, model, api_key.as_ref()),
            api_key,
            client,
            generation,
        }
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.descriptor.model,
            "max_tokens": self.generation.max_tokens,
            "temperature": self.generation.temperature,
            "system": request.system_prompt,
            "messages": chat_turns(request),
        })
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let api_key = require_key(NAME, self.api_key.as_ref())?;

        let http_request = self
            .client
            .post(&self.descriptor.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.body(request));
        let response = send(NAME, http_request).await?;
        let payload = read_json(NAME, response).await?;

        let text = payload
            .get("content")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str);
        non_empty(NAME, text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::AnthropicAdapter;
    use crate::llm::{CompletionRequest, ProviderAdapter, ProviderError};
    use crate::providers::test_support::{header, header_pairs, spawn, Captured};
    use crate::providers::GenerationSettings;

    async fn messages(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        captured.lock().expect("capture lock").push((header_pairs(&headers), body));
        Json(json!({
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "Hello! How can I help?" }
            ]
        }))
    }

    async fn overloaded() -> impl IntoResponse {
        (StatusCode::SERVICE_UNAVAILABLE, "overloaded")
    }

    fn adapter(base_url: &str) -> AnthropicAdapter {
        AnthropicAdapter::new(
            base_url,
            "claude-test",
            Some("sk-ant-test".to_string().into()),
            reqwest::Client::new(),
            GenerationSettings::default(),
        )
    }

    #[tokio::test]
    async fn sends_versioned_request_with_top_level_system() {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let base = spawn(
            Router::new().route("/messages", post(messages)).with_state(Arc::clone(&captured)),
        )
        .await;

        let text = adapter(&base)
            .complete(&CompletionRequest::new("hi", "You are helpful."))
            .await
            .expect("messages call succeeds");

        assert_eq!(text, "Hello! How can I help?");
        let captured = captured.lock().expect("capture lock");
        let (headers, body) = &captured[0];
        assert_eq!(header(headers, "x-api-key"), Some("sk-ant-test"));
        assert_eq!(header(headers, "anthropic-version"), Some("2023-06-01"));
        assert_eq!(body["system"], "You are helpful.");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let base = spawn(Router::new().route("/messages", post(overloaded))).await;

        let error =
            adapter(&base).complete(&CompletionRequest::new("hi", "p")).await.unwrap_err();

        match error {
            ProviderError::Http { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }
}
