use std::time::Duration;

use async_trait::async_trait;
use parley_core::session::Role;
use secrecy::SecretString;
use serde_json::{json, Value};

use super::{descriptor, join_url, non_empty, read_json, require_key, send, GenerationSettings};
use crate::llm::{CompletionRequest, ProviderAdapter, ProviderDescriptor, ProviderError};

const NAME: &str = "gemini";
const THROTTLE_STATUS: &str = "RESOURCE_EXHAUSTED";

/// Google `generateContent` backend.
pub struct GeminiAdapter {
    descriptor: ProviderDescriptor,
    api_key: Option<SecretString>,
    client: reqwest::Client,
    generation: GenerationSettings,
}

impl GeminiAdapter {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<SecretString>,
        client: reqwest::Client,
        generation: GenerationSettings,
    ) -> Self {
        let endpoint = join_url(base_url, &format!("models/{model}:generateContent"));
        Self {
            descriptor: descriptor(NAME, endpoint, model, api_key.as_ref()),
            api_key,
            client,
            generation,
        }
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let contents: Vec<Value> = request
            .history
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": message.content }] })
            })
            .chain(std::iter::once(json!({
                "role": "user",
                "parts": [{ "text": request.message }],
            })))
            .collect();

        json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": self.generation.max_tokens,
                "temperature": self.generation.temperature,
            },
        })
    }
}

/// Gemini reports quota exhaustion in the error body, sometimes without a 429.
/// Returns the suggested retry delay (if any) when the body is a throttle signal.
fn throttle_signal(payload: &Value) -> Option<Option<Duration>> {
    let error = payload.get("error")?;
    if error.get("status").and_then(Value::as_str) != Some(THROTTLE_STATUS) {
        return None;
    }

    let retry_delay = error
        .get("details")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find_map(|detail| detail.get("retryDelay").and_then(Value::as_str))
        .and_then(|delay| delay.trim_end_matches('s').parse::<f64>().ok())
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok());
    Some(retry_delay)
}

fn throttle_from_body(body: &str) -> Option<Option<Duration>> {
    serde_json::from_str::<Value>(body).ok().as_ref().and_then(throttle_signal)
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let api_key = require_key(NAME, self.api_key.as_ref())?;

        let http_request = self
            .client
            .post(&self.descriptor.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&self.body(request));

        let response = match send(NAME, http_request).await {
            Ok(response) => response,
            Err(ProviderError::Http { status, body, .. }) => {
                return Err(match throttle_from_body(&body) {
                    Some(retry_after) => {
                        ProviderError::RateLimited { provider: NAME.to_string(), retry_after }
                    }
                    None => ProviderError::Http { provider: NAME.to_string(), status, body },
                });
            }
            Err(other) => return Err(other),
        };

        let payload = read_json(NAME, response).await?;
        if let Some(retry_after) = throttle_signal(&payload) {
            return Err(ProviderError::RateLimited { provider: NAME.to_string(), retry_after });
        }

        non_empty(
            NAME,
            payload.pointer("/candidates/0/content/parts/0/text").and_then(Value::as_str),
        )
    }
}
