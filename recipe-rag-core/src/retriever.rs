//! Hybrid retriever: dense and sparse search fused with RRF.
//!
//! Both channels go to the store in one fused query; the sparse channel is
//! left out when the query has no indexable terms.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{RetrievalConfig, StoreConfig};
use crate::embeddings::{DenseEmbedder, SparseEncoder};
use crate::error::Result;
use crate::recipe::RecipeDocument;
use crate::store::{Prefetch, VectorData, VectorStore};

/// Runs both similarity channels against one collection and fuses them.
pub struct HybridRetriever {
    store: Arc<dyn VectorStore>,
    dense: Arc<dyn DenseEmbedder>,
    sparse: SparseEncoder,
    collection: String,
    dense_space: String,
    sparse_space: String,
    prefetch_multiplier: usize,
    rrf_k: f64,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: SparseEncoder,
        store_config: &StoreConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            dense,
            sparse,
            collection: store_config.collection.clone(),
            dense_space: store_config.dense_vector_name.clone(),
            sparse_space: store_config.sparse_vector_name.clone(),
            prefetch_multiplier: retrieval.prefetch_multiplier.max(1),
            rrf_k: retrieval.rrf_k,
        }
    }

    /// Top `limit` documents for `query`, best first.
    ///
    /// Each channel over-fetches `prefetch_multiplier * limit` candidates and
    /// the store fuses them with RRF. Points whose payload is not a recipe
    /// document are dropped before the result is cut to `limit`.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<RecipeDocument>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let prefetch = limit.saturating_mul(self.prefetch_multiplier);

        let mut channels = vec![Prefetch {
            using: self.dense_space.clone(),
            vector: VectorData::Dense(self.dense.embed(query).await?),
            limit: prefetch,
        }];
        let sparse_query = self.sparse.encode_query(query);
        if !sparse_query.is_empty() {
            channels.push(Prefetch {
                using: self.sparse_space.clone(),
                vector: VectorData::Sparse(sparse_query),
                limit: prefetch,
            });
        }

        // every fused candidate, so unreadable points do not eat into `limit`
        let candidates = prefetch.saturating_mul(channels.len());
        let fused = self
            .store
            .fused_query(&self.collection, &channels, self.rrf_k, candidates)
            .await?;
        let fused_count = fused.len();

        let documents: Vec<RecipeDocument> = fused
            .into_iter()
            .filter_map(|point| match RecipeDocument::from_payload(point.payload) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(id = point.id, error = %e, "Dropping point with unreadable payload");
                    None
                }
            })
            .take(limit)
            .collect();

        debug!(
            collection = %self.collection,
            limit,
            prefetch,
            channels = channels.len(),
            fused_count,
            results = documents.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Hybrid search complete"
        );
        Ok(documents)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use crate::indexer::DocumentIndexer;
    use crate::recipe::RecipeRecord;
    use crate::error::StoreError;
    use crate::store::{CollectionSchema, InMemoryStore, Payload, Point, ScoredPoint};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Delegates to an in-memory store and records every per-space query.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryStore,
        queries: Mutex<Vec<(String, usize)>>,
    }

    impl RecordingStore {
        fn queries(&self) -> Vec<(String, usize)> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn collection_exists(&self, collection: &str) -> std::result::Result<bool, StoreError> {
            self.inner.collection_exists(collection).await
        }

        async fn create_collection(
            &self,
            collection: &str,
            schema: &CollectionSchema,
        ) -> std::result::Result<(), StoreError> {
            self.inner.create_collection(collection, schema).await
        }

        async fn delete_collection(&self, collection: &str) -> std::result::Result<(), StoreError> {
            self.inner.delete_collection(collection).await
        }

        async fn upsert(
            &self,
            collection: &str,
            points: Vec<Point>,
        ) -> std::result::Result<(), StoreError> {
            self.inner.upsert(collection, points).await
        }

        async fn query(
            &self,
            collection: &str,
            using: &str,
            vector: &VectorData,
            limit: usize,
        ) -> std::result::Result<Vec<ScoredPoint>, StoreError> {
            self.queries.lock().unwrap().push((using.to_string(), limit));
            self.inner.query(collection, using, vector, limit).await
        }

        async fn count(&self, collection: &str) -> std::result::Result<usize, StoreError> {
            self.inner.count(collection).await
        }

        fn backend_name(&self) -> &str {
            "recording"
        }
    }

    fn store_config() -> StoreConfig {
        StoreConfig {
            dense_dimensions: 128,
            ..StoreConfig::default()
        }
    }

    fn recipe(id: u64, name: &str, ingredients: &str) -> RecipeDocument {
        RecipeDocument::from_record(RecipeRecord {
            recipe_id: id,
            recipe_name: name.into(),
            recipe_link: String::new(),
            recipe_description: format!("Classic {name}"),
            ratings: "4.5".into(),
            ready_in: "45 mins".into(),
            directions: "['Cook until done.']".into(),
            ingredients: ingredients.into(),
        })
        .unwrap()
    }

    async fn setup(docs: &[RecipeDocument]) -> (Arc<RecordingStore>, HybridRetriever) {
        let store = Arc::new(RecordingStore::default());
        let dense: Arc<dyn DenseEmbedder> = Arc::new(LocalEmbedder::new(128));
        let config = store_config();
        let indexer = DocumentIndexer::new(
            store.clone(),
            dense.clone(),
            SparseEncoder::default(),
            CollectionSchema::from_config(&config),
            16,
        );
        indexer.ensure_collection(&config.collection).await.unwrap();
        indexer.index_documents(&config.collection, docs).await.unwrap();

        let retriever = HybridRetriever::new(
            store.clone(),
            dense,
            SparseEncoder::default(),
            &config,
            &RetrievalConfig::default(),
        );
        (store, retriever)
    }

    #[tokio::test]
    async fn test_search_finds_term_match() {
        let docs = vec![
            recipe(1, "Vegetarian Lasagna", "['lasagna noodles', 'spinach', 'ricotta']"),
            recipe(2, "Beef Tacos", "['ground beef', 'tortillas']"),
            recipe(3, "Banana Bread", "['bananas', 'flour']"),
        ];
        let (_, retriever) = setup(&docs).await;
        let results = retriever
            .search("How do I make a vegetarian lasagna?", 2)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 2);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[0].text, docs[0].text);
    }

    #[tokio::test]
    async fn test_search_zero_limit() {
        let (_, retriever) = setup(&[recipe(1, "Pie", "['apples']")]).await;
        assert!(retriever.search("pie", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_collection() {
        let (_, retriever) = setup(&[]).await;
        assert!(retriever.search("lasagna", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_missing_collection_is_error() {
        let store = Arc::new(InMemoryStore::new());
        let retriever = HybridRetriever::new(
            store,
            Arc::new(LocalEmbedder::new(128)),
            SparseEncoder::default(),
            &store_config(),
            &RetrievalConfig::default(),
        );
        assert!(retriever.search("lasagna", 5).await.is_err());
    }

    #[tokio::test]
    async fn test_search_skips_foreign_payload() {
        let docs = vec![recipe(1, "Lasagna", "['noodles']")];
        let (store, retriever) = setup(&docs).await;

        let config = store_config();
        let mut vectors = BTreeMap::new();
        vectors.insert(
            config.dense_vector_name.clone(),
            VectorData::Dense(LocalEmbedder::new(128).embed_sync("lasagna")),
        );
        store
            .upsert(
                &config.collection,
                vec![Point {
                    id: 99,
                    vectors,
                    payload: Payload::new(),
                }],
            )
            .await
            .unwrap();

        let results = retriever.search("lasagna", 5).await.unwrap();
        assert!(results.iter().all(|d| d.id != 99));
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_each_channel_over_fetches_by_multiplier() {
        let (store, retriever) = setup(&[recipe(1, "Lasagna", "['noodles']")]).await;
        retriever.search("spinach lasagna", 3).await.unwrap();

        let config = store_config();
        assert_eq!(
            store.queries(),
            vec![
                (config.dense_vector_name.clone(), 15),
                (config.sparse_vector_name.clone(), 15),
            ]
        );
    }

    #[tokio::test]
    async fn test_stopword_only_query_skips_sparse_channel() {
        let (store, retriever) = setup(&[recipe(1, "Lasagna", "['noodles']")]).await;
        retriever.search("how do I", 2).await.unwrap();

        let queries = store.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0], (store_config().dense_vector_name, 10));
    }

    #[tokio::test]
    async fn test_huge_limit_does_not_overflow() {
        let (store, retriever) = setup(&[recipe(1, "Lasagna", "['noodles']")]).await;
        let results = retriever.search("lasagna", usize::MAX).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(store.queries().iter().all(|(_, limit)| *limit == usize::MAX));
    }

    #[tokio::test]
    async fn test_unreadable_payload_does_not_shrink_result() {
        let docs = vec![
            recipe(1, "Lasagna", "['noodles']"),
            recipe(2, "Baked Ziti", "['ziti']"),
        ];
        let (store, retriever) = setup(&docs).await;

        // dense vector identical to the query, so it outranks both recipes
        let config = store_config();
        let mut vectors = BTreeMap::new();
        vectors.insert(
            config.dense_vector_name.clone(),
            VectorData::Dense(LocalEmbedder::new(128).embed_sync("pasta bake")),
        );
        store
            .upsert(
                &config.collection,
                vec![Point {
                    id: 99,
                    vectors,
                    payload: Payload::new(),
                }],
            )
            .await
            .unwrap();

        let results = retriever.search("pasta bake", 2).await.unwrap();
        let mut ids: Vec<u64> = results.iter().map(|d| d.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }
}
