//! LLM provider implementations.
//!
//! Use `create_provider()` to instantiate the provider named in config.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use openai_compat::OpenAiCompatibleProvider;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "openai" | "openai-compatible" | "ollama" | "vllm" | "lmstudio" => {
            Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
        }
        other => Err(LlmError::ApiRequest {
            message: format!("Unsupported LLM provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_unknown() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..LlmConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_create_provider_local_openai() {
        let config = LlmConfig {
            base_url: Some("http://127.0.0.1:8080/v1".into()),
            api_key_env: "RECIPE_RAG_TEST_KEY_UNSET".into(),
            ..LlmConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "openai");
    }
}
