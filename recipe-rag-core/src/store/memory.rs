//! In-process vector store.
//!
//! Brute-force cosine similarity for dense spaces and an IDF-weighted dot
//! product for sparse spaces, mirroring how Qdrant scores the same schema.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{
    CollectionSchema, Payload, Point, ScoredPoint, SparseVector, VectorData, VectorStore,
};
use crate::error::StoreError;

#[derive(Debug)]
struct Collection {
    schema: CollectionSchema,
    points: BTreeMap<u64, StoredPoint>,
}

#[derive(Debug, Clone)]
struct StoredPoint {
    dense: Vec<f32>,
    sparse: SparseVector,
    payload: Payload,
}

/// Vector store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Inverse document frequency as Qdrant computes it for the `idf` modifier.
fn idf(total: usize, containing: usize) -> f32 {
    let n = total as f32;
    let df = containing as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Score a sparse query against every point with IDF weighting; points
/// sharing no term are dropped.
fn sparse_scores(points: &BTreeMap<u64, StoredPoint>, query: &SparseVector) -> Vec<(u64, f32)> {
    let mut doc_freq: HashMap<u32, usize> = HashMap::new();
    for point in points.values() {
        for idx in &point.sparse.indices {
            *doc_freq.entry(*idx).or_insert(0) += 1;
        }
    }

    let query_weights: HashMap<u32, f32> = query
        .indices
        .iter()
        .copied()
        .zip(query.values.iter().copied())
        .collect();

    points
        .iter()
        .filter_map(|(id, point)| {
            let mut score = 0.0f32;
            let mut matched = false;
            for (idx, value) in point.sparse.indices.iter().zip(point.sparse.values.iter()) {
                if let Some(q) = query_weights.get(idx) {
                    matched = true;
                    let weight = idf(points.len(), doc_freq.get(idx).copied().unwrap_or(0));
                    score += q * value * weight;
                }
            }
            matched.then_some((*id, score))
        })
        .collect()
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        let guard = self.collections.read().map_err(|_| StoreError::Request {
            message: "in-memory store lock poisoned".to_string(),
        })?;
        Ok(guard.contains_key(collection))
    }

    async fn create_collection(
        &self,
        collection: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError> {
        let mut guard = self.collections.write().map_err(|_| StoreError::Request {
            message: "in-memory store lock poisoned".to_string(),
        })?;
        guard
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                schema: schema.clone(),
                points: BTreeMap::new(),
            });
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        let mut guard = self.collections.write().map_err(|_| StoreError::Request {
            message: "in-memory store lock poisoned".to_string(),
        })?;
        guard.remove(collection);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), StoreError> {
        let mut guard = self.collections.write().map_err(|_| StoreError::Request {
            message: "in-memory store lock poisoned".to_string(),
        })?;
        let coll = guard
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionMissing {
                collection: collection.to_string(),
            })?;

        // Validate the whole batch before touching stored points.
        let mut staged = Vec::with_capacity(points.len());
        for point in points {
            let mut dense = None;
            let mut sparse = None;
            for (name, vector) in point.vectors {
                match vector {
                    VectorData::Dense(v) if name == coll.schema.dense.name => {
                        if v.len() != coll.schema.dense.size {
                            return Err(StoreError::DimensionMismatch {
                                expected: coll.schema.dense.size,
                                actual: v.len(),
                            });
                        }
                        dense = Some(v);
                    }
                    VectorData::Sparse(v) if name == coll.schema.sparse.name => {
                        sparse = Some(v);
                    }
                    _ => {
                        return Err(StoreError::UnknownVectorSpace {
                            collection: collection.to_string(),
                            space: name,
                        });
                    }
                }
            }
            staged.push((
                point.id,
                StoredPoint {
                    dense: dense.unwrap_or_default(),
                    sparse: sparse.unwrap_or_default(),
                    payload: point.payload,
                },
            ));
        }

        for (id, point) in staged {
            coll.points.insert(id, point);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        using: &str,
        vector: &VectorData,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let guard = self.collections.read().map_err(|_| StoreError::Request {
            message: "in-memory store lock poisoned".to_string(),
        })?;
        let coll = guard
            .get(collection)
            .ok_or_else(|| StoreError::CollectionMissing {
                collection: collection.to_string(),
            })?;

        let mut scored: Vec<(u64, f32)> = match vector {
            VectorData::Dense(q) if using == coll.schema.dense.name => coll
                .points
                .iter()
                .filter(|(_, p)| !p.dense.is_empty())
                .map(|(id, p)| (*id, cosine_similarity(q, &p.dense)))
                .collect(),
            VectorData::Sparse(q) if using == coll.schema.sparse.name => {
                sparse_scores(&coll.points, q)
            }
            _ => {
                return Err(StoreError::UnknownVectorSpace {
                    collection: collection.to_string(),
                    space: using.to_string(),
                });
            }
        };

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .filter_map(|(id, score)| {
                coll.points.get(&id).map(|p| ScoredPoint {
                    id,
                    score,
                    payload: p.payload.clone(),
                })
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let guard = self.collections.read().map_err(|_| StoreError::Request {
            message: "in-memory store lock poisoned".to_string(),
        })?;
        guard
            .get(collection)
            .map(|c| c.points.len())
            .ok_or_else(|| StoreError::CollectionMissing {
                collection: collection.to_string(),
            })
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
