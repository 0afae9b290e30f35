//! Answer generation through an LLM provider.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::brain::LlmProvider;
use crate::error::LlmError;
use crate::types::{CompletionRequest, TokenUsage};

/// Generated text and the usage of the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// Sends single-turn prompts to a provider. Failures are returned as-is.
#[derive(Clone)]
pub struct AnswerGenerator {
    provider: Arc<dyn LlmProvider>,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub async fn generate(&self, prompt: &str, model: &str) -> Result<Generation, LlmError> {
        let start = Instant::now();
        let response = self
            .provider
            .complete(CompletionRequest::single_turn(prompt, model))
            .await?;

        info!(
            provider = self.provider.provider_name(),
            model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "LLM call complete"
        );
        Ok(Generation {
            text: response.text,
            usage: response.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::types::Role;

    #[tokio::test]
    async fn test_generate_sends_single_user_message() {
        let mock = Arc::new(MockLlmProvider::with_responses(["Boil pasta."]));
        let generator = AnswerGenerator::new(mock.clone());
        let generation = generator.generate("the prompt", "gpt-4o").await.unwrap();

        assert_eq!(generation.text, "Boil pasta.");
        assert_eq!(generation.usage, TokenUsage::new(100, 50));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4o");
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::User);
        assert_eq!(requests[0].messages[0].content, "the prompt");
    }

    #[tokio::test]
    async fn test_generate_propagates_error_without_retry() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::RateLimited {
            retry_after_secs: 3,
        });
        let generator = AnswerGenerator::new(mock.clone());
        let err = generator.generate("p", "gpt-4o-mini").await.unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { retry_after_secs: 3 }));
        assert_eq!(mock.call_count(), 1);
    }
}
