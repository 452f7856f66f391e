use async_trait::async_trait;
use parley_core::Language;
use secrecy::SecretString;
use serde_json::{json, Value};

use super::{
    chat_turns, descriptor, join_url, non_empty, read_json, require_key, send, GenerationSettings,
};
use crate::llm::{CompletionRequest, ProviderAdapter, ProviderDescriptor, ProviderError};
use crate::stream;

/// Chat-completions backend speaking the OpenAI wire format (`/chat/completions`).
pub struct OpenAiCompatAdapter {
    descriptor: ProviderDescriptor,
    api_key: Option<SecretString>,
    client: reqwest::Client,
    generation: GenerationSettings,
    stream: bool,
}

impl OpenAiCompatAdapter {
    pub fn new(
        name: &str,
        base_url: &str,
        model: &str,
        api_key: Option<SecretString>,
        client: reqwest::Client,
        generation: GenerationSettings,
        stream: bool,
    ) -> Self {
        let endpoint = join_url(base_url, "chat/completions");
        Self {
            descriptor: descriptor(name, endpoint, model, api_key.as_ref()),
            api_key,
            client,
            generation,
            stream,
        }
    }

    pub fn restricted_to(mut self, language: Language) -> Self {
        self.descriptor.language_restriction = Some(language);
        self
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": request.system_prompt })];
        messages.extend(chat_turns(request));

        let mut body = json!({
            "model": self.descriptor.model,
            "messages": messages,
            "max_tokens": self.generation.max_tokens,
            "temperature": self.generation.temperature,
        });
        if self.stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let provider = self.descriptor.name.as_str();
        let api_key = require_key(provider, self.api_key.as_ref())?;

        let http_request = self
            .client
            .post(&self.descriptor.endpoint)
            .bearer_auth(api_key)
            .json(&self.body(request));
        let response = send(provider, http_request).await?;

        if self.stream {
            let text = stream::assemble(response.bytes_stream(), request.progress.clone())
                .await
                .map_err(|(error, _partial)| ProviderError::Transport {
                    provider: provider.to_string(),
                    message: error.to_string(),
                })?;
            return non_empty(provider, Some(&text));
        }

        let payload = read_json(provider, response).await?;
        non_empty(provider, payload.pointer("/choices/0/message/content").and_then(Value::as_str))
    }
}
