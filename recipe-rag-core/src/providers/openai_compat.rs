//! OpenAI-compatible LLM provider.
//!
//! Supports OpenAI, Azure OpenAI, Ollama, vLLM, LM Studio, and any
//! endpoint that follows the OpenAI chat completions API format.

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible LLM provider.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    temperature: Option<f32>,
    timeout_secs: u64,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from configuration.
    ///
    /// Reads the API key from `config.api_key`, then from the environment
    /// variable named by `config.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let is_local = config
            .base_url
            .as_ref()
            .map(|u| u.contains("localhost") || u.contains("127.0.0.1"))
            .unwrap_or(false);

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .or_else(|| {
                if is_local {
                    // Local providers (Ollama, vLLM, LM Studio) don't require an API key
                    debug!("No API key set for local provider; using dummy bearer token");
                    Some("ollama".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!(
                    "OpenAI-compatible: env var '{}' not set",
                    config.api_key_env
                ),
            })?;
        Self::new_with_key(config, api_key)
    }

    /// Create a new provider with an explicitly provided API key.
    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Convert internal messages to OpenAI JSON format.
    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                })
            })
            .collect()
    }

    /// Build the request body for a chat completion.
    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::messages_to_json(&request.messages),
            "stream": false,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    /// Parse an OpenAI-format response body into a CompletionResponse.
    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice =
            body.get("choices")
                .and_then(|c| c.get(0))
                .ok_or_else(|| LlmError::ResponseParse {
                    message: "No choices in response".to_string(),
                })?;

        let message = choice
            .get("message")
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No message in choice".to_string(),
            })?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let usage_obj = body.get("usage");
        let count = |field: &str| {
            usage_obj
                .and_then(|u| u.get(field))
                .and_then(|t| t.as_u64())
                .unwrap_or(0)
        };
        let prompt_tokens = count("prompt_tokens");
        let completion_tokens = count("completion_tokens");
        let total_tokens = usage_obj
            .and_then(|u| u.get("total_tokens"))
            .and_then(|t| t.as_u64())
            .unwrap_or(prompt_tokens + completion_tokens);

        let resp_model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(CompletionResponse {
            text,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens,
            },
            model: resp_model,
            finish_reason,
        })
    }

    /// Map an HTTP status code to the appropriate LlmError.
    fn map_http_error(status: reqwest::StatusCode, body: &str, model: &str) -> LlmError {
        match status.as_u16() {
            401 => {
                debug!(body = %body, "Authentication failed (401)");
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            404 if body.contains("model") => LlmError::UnsupportedModel {
                model: model.to_string(),
            },
            429 => {
                // "Rate limit reached ... Please try again in 7s."
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .map(|s| s.trim_end_matches('.').trim_end_matches('s').to_string())
                            .and_then(|s| s.parse::<f64>().ok())
                    })
                    .map(|secs| secs.ceil() as u64)
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(url = %url, model = %request.model, "Sending OpenAI completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else if e.is_connect() {
                    LlmError::Connection {
                        message: e.to_string(),
                    }
                } else {
                    LlmError::ApiRequest {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body, &request.model));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json, &request.model)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            base_url: Some("http://localhost:11434/v1/".to_string()),
            api_key_env: "RECIPE_RAG_TEST_OPENAI_KEY_UNSET".to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let provider = OpenAiCompatibleProvider::new(&test_config()).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        assert_eq!(provider.api_key, "ollama");
    }

    #[test]
    fn test_remote_provider_requires_key() {
        let config = LlmConfig {
            api_key_env: "RECIPE_RAG_TEST_OPENAI_KEY_UNSET".to_string(),
            ..LlmConfig::default()
        };
        let err = OpenAiCompatibleProvider::new(&config).err().unwrap();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn test_request_body_single_user_message() {
        let provider = OpenAiCompatibleProvider::new(&test_config()).unwrap();
        let body = provider.request_body(&CompletionRequest::single_turn("hi", "gpt-4o-mini"));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_parse_response_text_and_usage() {
        let body = json!({
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{
                "message": {"role": "assistant", "content": "Layer the noodles."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 812, "completion_tokens": 143, "total_tokens": 955}
        });
        let resp = OpenAiCompatibleProvider::parse_response(&body, "gpt-4o-mini").unwrap();
        assert_eq!(resp.text, "Layer the noodles.");
        assert_eq!(resp.usage, TokenUsage::new(812, 143));
        assert_eq!(resp.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_response_missing_usage_defaults_to_zero() {
        let body = json!({"choices": [{"message": {"content": "ok"}}]});
        let resp = OpenAiCompatibleProvider::parse_response(&body, "m").unwrap();
        assert_eq!(resp.usage, TokenUsage::default());
        assert_eq!(resp.model, "m");
    }

    #[test]
    fn test_parse_response_no_choices() {
        let body = json!({"choices": []});
        let err = OpenAiCompatibleProvider::parse_response(&body, "m").unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse { .. }));
    }

    #[test]
    fn test_map_http_error_rate_limit() {
        let body = r#"{"error": {"message": "Rate limit reached. Please try again in 7s."}}"#;
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            body,
            "gpt-4o-mini",
        );
        assert!(matches!(err, LlmError::RateLimited { retry_after_secs: 7 }));
    }

    #[test]
    fn test_map_http_error_unknown_model() {
        let body = r#"{"error": {"message": "The model `gpt-9` does not exist", "code": "model_not_found"}}"#;
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::NOT_FOUND,
            body,
            "gpt-9",
        );
        assert!(matches!(err, LlmError::UnsupportedModel { model } if model == "gpt-9"));
    }

    #[test]
    fn test_map_http_error_auth_and_server() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::UNAUTHORIZED,
            "",
            "m",
        );
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::BAD_GATEWAY,
            "upstream down",
            "m",
        );
        assert!(err.to_string().contains("Server error (502"));
    }
}
