//! Vector store abstraction.
//!
//! A collection holds points with one named dense space and one named sparse
//! space, plus a JSON payload. `QdrantStore` talks to a Qdrant server over
//! REST; `InMemoryStore` keeps everything in process for tests and demos.

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;
use crate::fusion::rrf_fuse;

pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

/// Arbitrary JSON metadata attached to a point.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Similarity function of a dense space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
}

/// Weighting applied by the store to sparse vectors at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparseModifier {
    Idf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseSpace {
    pub name: String,
    pub size: usize,
    pub distance: Distance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseSpace {
    pub name: String,
    pub modifier: SparseModifier,
}

/// Vector spaces declared on a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub dense: DenseSpace,
    pub sparse: SparseSpace,
}

impl CollectionSchema {
    /// Cosine dense space plus IDF-weighted sparse space, named from config.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            dense: DenseSpace {
                name: config.dense_vector_name.clone(),
                size: config.dense_dimensions,
                distance: Distance::Cosine,
            },
            sparse: SparseSpace {
                name: config.sparse_vector_name.clone(),
                modifier: SparseModifier::Idf,
            },
        }
    }
}

/// Sparse vector as parallel, index-sorted arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn from_map(weights: BTreeMap<u32, f32>) -> Self {
        let (indices, values) = weights.into_iter().unzip();
        Self { indices, values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A vector in either a dense or a sparse space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorData {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

/// A point to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: u64,
    /// Vectors keyed by space name.
    pub vectors: BTreeMap<String, VectorData>,
    pub payload: Payload,
}

/// A point returned by a query, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    pub payload: Payload,
}

/// One candidate channel of a fused query.
#[derive(Debug, Clone, PartialEq)]
pub struct Prefetch {
    /// Vector space to search.
    pub using: String,
    pub vector: VectorData,
    /// Candidates fetched from this channel before fusion.
    pub limit: usize,
}

/// Trait for vector store backends.
///
/// Implementations are externally synchronized services; callers hold them
/// behind `Arc` and issue no client-side locking.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError>;

    async fn create_collection(
        &self,
        collection: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError>;

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError>;

    /// Insert or fully replace points by id.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), StoreError>;

    /// Top-`limit` points by similarity within one named space, with payload.
    async fn query(
        &self,
        collection: &str,
        using: &str,
        vector: &VectorData,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Run every prefetch channel and fuse their rankings with RRF, returning
    /// the top `limit` points. Scores are the fused RRF scores.
    ///
    /// The default runs one `query` per channel and fuses client-side, with
    /// ties broken by ascending id.
    async fn fused_query(
        &self,
        collection: &str,
        prefetch: &[Prefetch],
        rrf_k: f64,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let mut lists = Vec::with_capacity(prefetch.len());
        for channel in prefetch {
            lists.push(
                self.query(collection, &channel.using, &channel.vector, channel.limit)
                    .await?,
            );
        }
        Ok(rrf_fuse(&lists, rrf_k, limit)
            .into_iter()
            .map(|fused| ScoredPoint {
                id: fused.id,
                score: fused.score as f32,
                payload: fused.payload,
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError>;

    /// Return the backend name.
    fn backend_name(&self) -> &str;
}

/// Create a vector store from configuration.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>, StoreError> {
    match config.backend {
        StoreBackend::Qdrant => Ok(Arc::new(QdrantStore::new(config)?)),
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_from_config() {
        let schema = CollectionSchema::from_config(&StoreConfig::default());
        assert_eq!(schema.dense.name, "dense");
        assert_eq!(schema.dense.size, 512);
        assert_eq!(schema.dense.distance, Distance::Cosine);
        assert_eq!(schema.sparse.name, "bm25");
        assert_eq!(schema.sparse.modifier, SparseModifier::Idf);
    }

    #[test]
    fn test_vector_data_untagged_serde() {
        let dense = serde_json::to_value(VectorData::Dense(vec![0.5, 0.25])).unwrap();
        assert_eq!(dense, serde_json::json!([0.5, 0.25]));

        let sparse = VectorData::Sparse(SparseVector {
            indices: vec![3, 9],
            values: vec![1.0, 0.5],
        });
        let json = serde_json::to_value(&sparse).unwrap();
        assert_eq!(json["indices"], serde_json::json!([3, 9]));
    }

    #[test]
    fn test_create_store_memory() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let store = create_store(&config).unwrap();
        assert_eq!(store.backend_name(), "memory");
    }
}
