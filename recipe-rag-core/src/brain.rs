//! LLM provider abstraction and a scripted mock for tests.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions, plus a
//! scripted `MockLlmProvider` used as a test double.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};
use async_trait::async_trait;
use std::sync::Mutex;

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// A scripted provider for tests.
///
/// Queued responses are returned in order; once the queue is empty a fixed
/// fallback text is returned. Every request is recorded for inspection.
pub struct MockLlmProvider {
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that returns the given texts in order.
    pub fn with_responses<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let provider = Self::new();
        for text in texts {
            provider.queue_response(Self::text_response(text.as_ref()));
        }
        provider
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        if let Ok(mut q) = self.responses.lock() {
            q.push(Ok(response));
        }
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        if let Ok(mut q) = self.responses.lock() {
            q.push(Err(error));
        }
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            usage: TokenUsage::new(100, 50),
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = request.model.clone();
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut q| if q.is_empty() { None } else { Some(q.remove(0)) });
        match next {
            Some(Ok(mut response)) => {
                response.model = model;
                Ok(response)
            }
            Some(Err(e)) => Err(e),
            None => {
                let mut response =
                    Self::text_response("I'm a mock LLM. No queued responses available.");
                response.model = model;
                Ok(response)
            }
        }
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
