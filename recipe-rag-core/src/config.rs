//! Configuration system for recipe-rag.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/recipe-rag/config.toml` and/or
//! `.recipe-rag/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cost::ModelPrice;
use crate::gateway::GatewayConfig;

/// Top-level configuration for the recipe assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub evaluator: EvaluatorConfig,
    pub pricing: PricingConfig,
    pub gateway: GatewayConfig,
    pub data: DataConfig,
    pub conversations: ConversationsConfig,
}

/// Configuration for the hosted language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only OpenAI-compatible endpoints are supported.
    pub provider: String,
    /// Model used for answers when the caller does not name one.
    pub default_model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Optional sampling temperature. The endpoint default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// HTTP timeout for one completion call.
    pub timeout_secs: u64,
    /// Inline API key. Prefer `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: None,
            timeout_secs: 120,
            api_key: None,
        }
    }
}

/// Vector store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Qdrant,
    Memory,
}

/// Configuration for the vector store collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Qdrant REST endpoint.
    pub url: String,
    /// Environment variable holding a Qdrant API key, if the server requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub collection: String,
    /// Name of the dense vector space.
    pub dense_vector_name: String,
    /// Dimensionality of the dense vector space.
    pub dense_dimensions: usize,
    /// Name of the sparse (IDF-weighted) vector space.
    pub sparse_vector_name: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Qdrant,
            url: "http://localhost:6333".to_string(),
            api_key_env: None,
            collection: "recipe-rag-hybrid".to_string(),
            dense_vector_name: "dense".to_string(),
            dense_dimensions: 512,
            sparse_vector_name: "bm25".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Configuration for the dense and sparse encoders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Dense provider: "openai" (default), "fastembed" or "local".
    pub provider: String,
    /// Provider-specific model name.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub api_key_env: String,
    /// Number of texts sent per embedding request.
    pub batch_size: usize,
    /// BM25 term-frequency saturation.
    pub bm25_k1: f32,
    /// BM25 length normalisation.
    pub bm25_b: f32,
    /// Assumed average document length in tokens for BM25 normalisation.
    pub bm25_avg_len: f32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 32,
            bm25_k1: 1.2,
            bm25_b: 0.75,
            bm25_avg_len: 256.0,
        }
    }
}

/// Configuration for hybrid retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of fused results returned when the caller does not specify one.
    pub limit: usize,
    /// Each channel fetches `prefetch_multiplier * limit` candidates before fusion.
    pub prefetch_multiplier: usize,
    /// Reciprocal rank fusion constant.
    pub rrf_k: f64,
    /// Largest `limit` a caller may request.
    pub max_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            prefetch_multiplier: 5,
            rrf_k: 60.0,
            max_limit: 100,
        }
    }
}

/// Configuration for the relevance evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Fixed model used for every evaluation call.
    pub model: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Per-model prices in USD per million tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub models: BTreeMap<String, ModelPrice>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let table = [
            ("gpt-4o", 2.50, 10.00),
            ("gpt-4o-mini", 0.15, 0.60),
            ("gpt-4.1", 2.00, 8.00),
            ("gpt-4.1-mini", 0.40, 1.60),
            ("gpt-4.1-nano", 0.10, 0.40),
            ("gpt-4-turbo", 10.00, 30.00),
            ("gpt-3.5-turbo", 0.50, 1.50),
            ("o3-mini", 1.10, 4.40),
            ("o4-mini", 1.10, 4.40),
        ];
        let models = table
            .into_iter()
            .map(|(name, input, output)| {
                (
                    name.to_string(),
                    ModelPrice {
                        input_rate: input,
                        output_rate: output,
                    },
                )
            })
            .collect();
        Self { models }
    }
}

/// Location of the recipe source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub recipes_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            recipes_path: PathBuf::from("data/recipes.csv"),
        }
    }
}

/// Conversation log backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationBackend {
    Sqlite,
    Memory,
}

/// Configuration for the conversation and feedback log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationsConfig {
    pub backend: ConversationBackend,
    pub db_path: PathBuf,
}

impl Default for ConversationsConfig {
    fn default() -> Self {
        Self {
            backend: ConversationBackend::Sqlite,
            db_path: PathBuf::from(".recipe-rag/conversations.db"),
        }
    }
}

impl RagConfig {
    /// Validate this config and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid. Problems are reported as
    /// human-readable messages rather than errors.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.retrieval.limit == 0 {
            warnings.push("retrieval.limit is 0; every search will return nothing".to_string());
        }
        if self.retrieval.limit > self.retrieval.max_limit {
            warnings.push(format!(
                "retrieval.limit ({}) exceeds retrieval.max_limit ({})",
                self.retrieval.limit, self.retrieval.max_limit
            ));
        }
        if self.retrieval.prefetch_multiplier == 0 {
            warnings.push(
                "retrieval.prefetch_multiplier is 0; neither channel will fetch candidates"
                    .to_string(),
            );
        }
        if self.retrieval.rrf_k <= 0.0 {
            warnings.push(format!(
                "retrieval.rrf_k ({}) should be positive",
                self.retrieval.rrf_k
            ));
        }
        if self.store.dense_dimensions == 0 {
            warnings.push("store.dense_dimensions is 0".to_string());
        }
        if self.store.dense_vector_name == self.store.sparse_vector_name {
            warnings.push(format!(
                "dense and sparse vector spaces share the name '{}'",
                self.store.dense_vector_name
            ));
        }
        if !self.pricing.models.contains_key(&self.llm.default_model) {
            warnings.push(format!(
                "no price configured for default model '{}'; its cost will not be computed",
                self.llm.default_model
            ));
        }
        if !self.pricing.models.contains_key(&self.evaluator.model) {
            warnings.push(format!(
                "no price configured for evaluator model '{}'; its cost will not be computed",
                self.evaluator.model
            ));
        }
        warnings
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RECIPE_RAG_`)
/// 3. Workspace-local config (`.recipe-rag/config.toml`)
/// 4. User config (`~/.config/recipe-rag/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&RagConfig>,
) -> Result<RagConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(RagConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "recipe-rag", "recipe-rag") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".recipe-rag").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // RECIPE_RAG_STORE__URL, RECIPE_RAG_LLM__DEFAULT_MODEL, etc.
    figment = figment.merge(Env::prefixed("RECIPE_RAG_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load configuration from an explicit TOML file layered over defaults.
pub fn load_config_file(path: &Path) -> Result<RagConfig, Box<figment::Error>> {
    Figment::from(Serialized::defaults(RagConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RECIPE_RAG_").split("__"))
        .extract()
        .map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_deployment() {
        let config = RagConfig::default();
        assert_eq!(config.store.url, "http://localhost:6333");
        assert_eq!(config.store.collection, "recipe-rag-hybrid");
        assert_eq!(config.store.dense_vector_name, "dense");
        assert_eq!(config.store.dense_dimensions, 512);
        assert_eq!(config.store.sparse_vector_name, "bm25");
        assert_eq!(config.llm.default_model, "gpt-4o-mini");
        assert_eq!(config.retrieval.limit, 5);
        assert_eq!(config.retrieval.prefetch_multiplier, 5);
    }

    #[test]
    fn test_default_config_has_no_warnings() {
        assert!(RagConfig::default().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = RagConfig::default();
        config.retrieval.limit = 0;
        config.evaluator.model = "mystery-model".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("retrieval.limit"));
        assert!(warnings[1].contains("mystery-model"));
    }

    #[test]
    fn test_workspace_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".recipe-rag");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            r#"
[store]
collection = "recipes-test"

[retrieval]
limit = 3

[pricing.models."my-local-model"]
input_rate = 0.0
output_rate = 0.0
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.store.collection, "recipes-test");
        assert_eq!(config.retrieval.limit, 3);
        // untouched sections keep their defaults
        assert_eq!(config.store.dense_dimensions, 512);
        // configured prices extend the built-in table
        assert!(config.pricing.models.contains_key("my-local-model"));
        assert!(config.pricing.models.contains_key("gpt-4o-mini"));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = RagConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: RagConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.store.collection, config.store.collection);
        assert_eq!(parsed.pricing.models.len(), config.pricing.models.len());
    }
}
