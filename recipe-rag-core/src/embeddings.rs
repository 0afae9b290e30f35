//! Dense and sparse text encoders used for indexing and querying.
//!
//! Dense vectors come from a pluggable `DenseEmbedder`: the OpenAI API, a
//! local ONNX model through `fastembed`, or a hashed term-frequency embedder.
//! Sparse vectors come from `SparseEncoder`, a BM25-style term weighting over
//! hashed token ids. The IDF half of BM25 is applied by the vector store,
//! which sees the whole collection.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::store::SparseVector;

/// Trait for dense embedding providers.
#[async_trait]
pub trait DenseEmbedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Words too common in recipe text to carry lexical signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "for", "from", "how", "i", "in",
    "into", "is", "it", "its", "me", "my", "of", "on", "or", "so", "that", "the", "then", "this",
    "to", "until", "what", "when", "which", "with", "you", "your",
];

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// djb2 over the token bytes.
fn term_id(term: &str) -> u32 {
    let mut hash: u32 = 5381;
    for b in term.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as u32);
    }
    hash
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, usize> {
    let mut tf: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        *tf.entry(token.as_str()).or_insert(0) += 1;
    }
    tf
}

/// Local hashed term-frequency embedder (no external dependencies).
///
/// Each token is hashed to a dimension and its frequency accumulated; the
/// result is L2-normalised so cosine similarity reduces to a dot product.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vector;
        }

        for (term, count) in term_frequencies(&tokens) {
            let idx = term_id(term) as usize % self.dimensions;
            vector[idx] += count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl DenseEmbedder for LocalEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// OpenAI `/embeddings` API embedder.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        model: impl Into<String>,
        dims: usize,
        base_url: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            model: model.into(),
            dims,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".into())
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[async_trait]
impl DenseEmbedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
            "dimensions": self.dims,
        });

        debug!(url = %url, model = %self.model, inputs = texts.len(), "Requesting embeddings");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Request {
                message: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| EmbeddingError::Request {
            message: format!("Failed to read response body: {}", e),
        })?;
        if !status.is_success() {
            return Err(EmbeddingError::Request {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| EmbeddingError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;
        let data = json["data"]
            .as_array()
            .ok_or_else(|| EmbeddingError::ResponseParse {
                message: "missing 'data' array".to_string(),
            })?;

        // Entries carry an explicit index; order by it rather than trusting array order.
        let mut by_index: BTreeMap<u64, Vec<f32>> = BTreeMap::new();
        for (position, item) in data.iter().enumerate() {
            let index = item["index"].as_u64().unwrap_or(position as u64);
            let embedding = item["embedding"]
                .as_array()
                .ok_or_else(|| EmbeddingError::ResponseParse {
                    message: format!("entry {} has no embedding", index),
                })?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            by_index.insert(index, embedding);
        }

        if by_index.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: by_index.len(),
            });
        }
        Ok(by_index.into_values().collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Local ONNX embedder backed by `fastembed` (behind the `semantic-search` feature).
///
/// Models longer than the configured dimensionality are truncated
/// (Matryoshka-style); shorter ones are rejected at construction.
#[cfg(feature = "semantic-search")]
pub struct FastEmbedder {
    model: fastembed::TextEmbedding,
    dims: usize,
}

#[cfg(feature = "semantic-search")]
impl FastEmbedder {
    pub fn new(model_name: &str, dims: usize) -> Result<Self, EmbeddingError> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model_enum = match model_name {
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
            "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
            other => {
                return Err(EmbeddingError::ModelUnavailable {
                    message: format!("fastembed has no model named '{}'", other),
                });
            }
        };

        let model = TextEmbedding::try_new(InitOptions::new(model_enum).with_show_download_progress(false))
            .map_err(|e| EmbeddingError::ModelUnavailable {
                message: format!("Failed to initialize {}: {}", model_name, e),
            })?;

        let native = model
            .embed(vec!["dimension check"], None)
            .map_err(|e| EmbeddingError::ModelUnavailable {
                message: e.to_string(),
            })?
            .first()
            .map(|v| v.len())
            .unwrap_or(0);
        if native < dims {
            return Err(EmbeddingError::ModelUnavailable {
                message: format!(
                    "{} produces {} dimensions but the collection expects {}",
                    model_name, native, dims
                ),
            });
        }

        Ok(Self { model, dims })
    }
}

#[cfg(feature = "semantic-search")]
#[async_trait]
impl DenseEmbedder for FastEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let mut vectors = self
            .model
            .embed(refs, None)
            .map_err(|e| EmbeddingError::Request {
                message: e.to_string(),
            })?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        for v in &mut vectors {
            v.truncate(self.dims);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

/// Factory function to create a dense embedder based on configuration.
///
/// Indexing and querying must embed with the same method, so a missing key or
/// an unavailable model is an error rather than a silent switch to another
/// embedder.
pub fn create_dense_embedder(
    config: &EmbeddingConfig,
    dimensions: usize,
) -> Result<Arc<dyn DenseEmbedder>, EmbeddingError> {
    match config.provider.as_str() {
        "openai" => match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(Arc::new(OpenAiEmbedder::new(
                key,
                config.model.clone(),
                dimensions,
                config.base_url.clone(),
            ))),
            _ => Err(EmbeddingError::MissingApiKey {
                env: config.api_key_env.clone(),
            }),
        },
        "local" => Ok(Arc::new(LocalEmbedder::new(dimensions))),
        #[cfg(feature = "semantic-search")]
        "fastembed" => Ok(Arc::new(FastEmbedder::new(&config.model, dimensions)?)),
        #[cfg(not(feature = "semantic-search"))]
        "fastembed" => Err(EmbeddingError::ModelUnavailable {
            message: "built without the `semantic-search` feature".to_string(),
        }),
        other => Err(EmbeddingError::UnknownProvider {
            provider: other.to_string(),
        }),
    }
}

/// BM25-style sparse encoder.
///
/// Documents get saturated, length-normalised term frequencies; queries get
/// a weight of 1.0 per distinct term. Combined with an IDF modifier in the
/// store, the dot product of the two is the BM25 score.
#[derive(Debug, Clone)]
pub struct SparseEncoder {
    k1: f32,
    b: f32,
    avg_len: f32,
}

impl SparseEncoder {
    pub fn new(k1: f32, b: f32, avg_len: f32) -> Self {
        Self { k1, b, avg_len }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(config.bm25_k1, config.bm25_b, config.bm25_avg_len)
    }

    /// Encode a document for indexing.
    pub fn encode_document(&self, text: &str) -> SparseVector {
        let tokens = tokenize(text);
        let doc_len = tokens.len() as f32;
        let avg_len = if self.avg_len > 0.0 { self.avg_len } else { 1.0 };
        let norm = 1.0 - self.b + self.b * doc_len / avg_len;

        let mut weights: BTreeMap<u32, f32> = BTreeMap::new();
        for (term, count) in term_frequencies(&tokens) {
            let tf = count as f32;
            let weight = tf * (self.k1 + 1.0) / (tf + self.k1 * norm);
            // hash collisions merge into the same slot
            *weights.entry(term_id(term)).or_insert(0.0) += weight;
        }
        SparseVector::from_map(weights)
    }

    /// Encode a query.
    pub fn encode_query(&self, text: &str) -> SparseVector {
        let weights: BTreeMap<u32, f32> = tokenize(text)
            .iter()
            .map(|t| (term_id(t), 1.0))
            .collect();
        SparseVector::from_map(weights)
    }
}

impl Default for SparseEncoder {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}
