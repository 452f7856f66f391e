//! Scripted provider used by orchestration and runtime tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::Language;

use crate::llm::{CompletionRequest, ProviderAdapter, ProviderDescriptor, ProviderError};

pub struct FakeProvider {
    descriptor: ProviderDescriptor,
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                name: name.to_string(),
                endpoint: format!("http://{name}.test"),
                model: format!("{name}-model"),
                enabled: true,
                language_restriction: None,
            },
            replies: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.descriptor.enabled = false;
        self
    }

    pub fn restricted_to(mut self, language: Language) -> Self {
        self.descriptor.language_restriction = Some(language);
        self
    }

    pub fn replying(self, reply: Result<&str, ProviderError>) -> Self {
        self.replies.lock().expect("reply lock").push_back(reply.map(str::to_string));
        self
    }

    pub fn taking(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for FakeProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let next = self.replies.lock().expect("reply lock").pop_front();
        next.unwrap_or_else(|| {
            Err(ProviderError::EmptyResponse { provider: self.descriptor.name.clone() })
        })
    }
}

pub fn http_error(provider: &str) -> ProviderError {
    ProviderError::Http { provider: provider.to_string(), status: 500, body: "boom".into() }
}
