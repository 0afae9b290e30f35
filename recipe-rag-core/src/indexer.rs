//! Document indexer: pushes recipe documents into the vector store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{EmbeddingConfig, StoreConfig};
use crate::embeddings::{DenseEmbedder, SparseEncoder};
use crate::error::{EmbeddingError, Result};
use crate::recipe::{RecipeDocument, prepare_documents};
use crate::store::{CollectionSchema, Point, VectorData, VectorStore};

/// Outcome of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Points written to the store.
    pub indexed: usize,
    /// Source records rejected as malformed.
    pub skipped: usize,
    /// Whether the collection had to be created.
    pub created_collection: bool,
}

/// Embeds documents under both vector spaces and upserts them by id.
pub struct DocumentIndexer {
    store: Arc<dyn VectorStore>,
    dense: Arc<dyn DenseEmbedder>,
    sparse: SparseEncoder,
    schema: CollectionSchema,
    batch_size: usize,
}

impl DocumentIndexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        dense: Arc<dyn DenseEmbedder>,
        sparse: SparseEncoder,
        schema: CollectionSchema,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            dense,
            sparse,
            schema,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(
        store: Arc<dyn VectorStore>,
        dense: Arc<dyn DenseEmbedder>,
        store_config: &StoreConfig,
        embedding_config: &EmbeddingConfig,
    ) -> Self {
        Self::new(
            store,
            dense,
            SparseEncoder::from_config(embedding_config),
            CollectionSchema::from_config(store_config),
            embedding_config.batch_size,
        )
    }

    /// Create `collection` with the configured dense and sparse spaces unless
    /// it already exists. Returns `true` when the collection was created.
    pub async fn ensure_collection(&self, collection: &str) -> Result<bool> {
        if self.store.collection_exists(collection).await? {
            debug!(collection, "Collection already exists");
            return Ok(false);
        }
        self.store.create_collection(collection, &self.schema).await?;
        info!(
            collection,
            dense = %self.schema.dense.name,
            dimensions = self.schema.dense.size,
            sparse = %self.schema.sparse.name,
            "Created collection"
        );
        Ok(true)
    }

    /// Embed and upsert `documents` into `collection`, replacing points with
    /// the same id. A batch is only written once both encodings succeed.
    pub async fn index_documents(
        &self,
        collection: &str,
        documents: &[RecipeDocument],
    ) -> Result<usize> {
        let start = Instant::now();
        let mut indexed = 0;

        for batch in documents.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let dense = self.dense.embed_batch(&texts).await?;
            if dense.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: dense.len(),
                }
                .into());
            }

            let points: Vec<Point> = batch
                .iter()
                .zip(dense)
                .map(|(doc, vector)| {
                    let mut vectors = BTreeMap::new();
                    vectors.insert(self.schema.dense.name.clone(), VectorData::Dense(vector));
                    vectors.insert(
                        self.schema.sparse.name.clone(),
                        VectorData::Sparse(self.sparse.encode_document(&doc.text)),
                    );
                    Point {
                        id: doc.id,
                        vectors,
                        payload: doc.to_payload(),
                    }
                })
                .collect();

            self.store.upsert(collection, points).await?;
            indexed += batch.len();
            debug!(collection, indexed, total = documents.len(), "Indexed batch");
        }

        info!(
            collection,
            indexed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Indexed documents"
        );
        Ok(indexed)
    }

    /// Full rebuild from a CSV source: prepare, ensure the collection, upsert.
    pub async fn index_source(&self, collection: &str, path: &Path) -> Result<IndexStats> {
        let prepared = prepare_documents(path)?;
        let created_collection = self.ensure_collection(collection).await?;
        let indexed = self.index_documents(collection, &prepared.documents).await?;
        Ok(IndexStats {
            indexed,
            skipped: prepared.skipped.len(),
            created_collection,
        })
    }
}
