//! Qdrant vector store over the REST API.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{CollectionSchema, Payload, Point, Prefetch, ScoredPoint, VectorData, VectorStore};
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Vector store backed by a Qdrant server.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantStore {
    /// Create a client for the server at `config.url`.
    ///
    /// When `config.api_key_env` names a variable that is set, its value is
    /// sent as the `api-key` header.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Request {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn schema_body(schema: &CollectionSchema) -> Value {
        let dense = schema.dense.name.as_str();
        let sparse = schema.sparse.name.as_str();
        json!({
            "vectors": {
                dense: {
                    "size": schema.dense.size,
                    "distance": schema.dense.distance,
                }
            },
            "sparse_vectors": {
                sparse: {
                    "modifier": schema.sparse.modifier,
                }
            }
        })
    }

    fn points_body(points: &[Point]) -> Value {
        let points: Vec<Value> = points
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "vector": p.vectors,
                    "payload": p.payload,
                })
            })
            .collect();
        json!({ "points": points })
    }

    /// Send a request and return the `result` field of the response envelope.
    async fn call(
        &self,
        method: Method,
        path: &str,
        collection: &str,
        body: Option<Value>,
    ) -> Result<Value, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, method = %method, "Sending Qdrant request");

        let mut request = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| StoreError::Request {
            message: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| StoreError::Request {
            message: format!("Failed to read response body: {}", e),
        })?;

        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::CollectionMissing {
                collection: collection.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Response {
                status: status.as_u16(),
                body: text,
            });
        }

        let mut json: Value =
            serde_json::from_str(&text).map_err(|e| StoreError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;
        Ok(json.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    fn fused_query_body(prefetch: &[Prefetch], rrf_k: f64, limit: usize) -> Value {
        let channels: Vec<Value> = prefetch
            .iter()
            .map(|p| json!({ "query": p.vector, "using": p.using, "limit": p.limit }))
            .collect();
        json!({
            "prefetch": channels,
            "query": { "rrf": { "k": rrf_k } },
            "limit": limit,
            "with_payload": true,
        })
    }

    fn parse_scored_points(result: &Value) -> Result<Vec<ScoredPoint>, StoreError> {
        let points = result
            .get("points")
            .and_then(|p| p.as_array())
            .ok_or_else(|| StoreError::ResponseParse {
                message: "No points in query result".to_string(),
            })?;

        points
            .iter()
            .map(|p| {
                let id = p.get("id").and_then(|i| i.as_u64()).ok_or_else(|| {
                    StoreError::ResponseParse {
                        message: format!("Point id is not an unsigned integer: {}", p),
                    }
                })?;
                let score = p.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
                let payload: Payload = p
                    .get("payload")
                    .and_then(|v| v.as_object())
                    .cloned()
                    .unwrap_or_default();
                Ok(ScoredPoint { id, score, payload })
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        let result = self
            .call(
                Method::GET,
                &format!("/collections/{}/exists", collection),
                collection,
                None,
            )
            .await?;
        Ok(result
            .get("exists")
            .and_then(|e| e.as_bool())
            .unwrap_or(false))
    }

    async fn create_collection(
        &self,
        collection: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError> {
        self.call(
            Method::PUT,
            &format!("/collections/{}", collection),
            collection,
            Some(Self::schema_body(schema)),
        )
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.call(
            Method::DELETE,
            &format!("/collections/{}", collection),
            collection,
            None,
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        self.call(
            Method::PUT,
            &format!("/collections/{}/points?wait=true", collection),
            collection,
            Some(Self::points_body(&points)),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        using: &str,
        vector: &VectorData,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let body = json!({
            "query": vector,
            "using": using,
            "limit": limit,
            "with_payload": true,
        });
        let result = self
            .call(
                Method::POST,
                &format!("/collections/{}/points/query", collection),
                collection,
                Some(body),
            )
            .await?;
        Self::parse_scored_points(&result)
    }

    /// One `/points/query` request: each channel becomes a `prefetch` entry and
    /// the server fuses them with parametrized RRF.
    async fn fused_query(
        &self,
        collection: &str,
        prefetch: &[Prefetch],
        rrf_k: f64,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let body = Self::fused_query_body(prefetch, rrf_k, limit);
        let result = self
            .call(
                Method::POST,
                &format!("/collections/{}/points/query", collection),
                collection,
                Some(body),
            )
            .await?;
        Self::parse_scored_points(&result)
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let result = self
            .call(
                Method::POST,
                &format!("/collections/{}/points/count", collection),
                collection,
                Some(json!({ "exact": true })),
            )
            .await?;
        result
            .get("count")
            .and_then(|c| c.as_u64())
            .map(|c| c as usize)
            .ok_or_else(|| StoreError::ResponseParse {
                message: "No count in result".to_string(),
            })
    }

    fn backend_name(&self) -> &str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SparseVector;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> QdrantStore {
        QdrantStore::new(&StoreConfig {
            url: format!("{}/", server.uri()),
            ..StoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_schema_body_shape() {
        let body = QdrantStore::schema_body(&CollectionSchema::from_config(&StoreConfig::default()));
        assert_eq!(body["vectors"]["dense"]["size"], 512);
        assert_eq!(body["vectors"]["dense"]["distance"], "Cosine");
        assert_eq!(body["sparse_vectors"]["bm25"]["modifier"], "idf");
    }

    #[test]
    fn test_points_body_shape() {
        let mut vectors = BTreeMap::new();
        vectors.insert("dense".to_string(), VectorData::Dense(vec![0.5, 0.5]));
        vectors.insert(
            "bm25".to_string(),
            VectorData::Sparse(SparseVector {
                indices: vec![4],
                values: vec![1.5],
            }),
        );
        let body = QdrantStore::points_body(&[Point {
            id: 42,
            vectors,
            payload: Payload::new(),
        }]);
        assert_eq!(body["points"][0]["id"], 42);
        assert_eq!(body["points"][0]["vector"]["dense"], json!([0.5, 0.5]));
        assert_eq!(body["points"][0]["vector"]["bm25"]["indices"], json!([4]));
    }

    #[tokio::test]
    async fn test_collection_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/recipe-rag-hybrid/exists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"exists": true},
                "status": "ok",
                "time": 0.0001
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(store.collection_exists("recipe-rag-hybrid").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_waits_for_commit() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/c/points"))
            .and(query_param("wait", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"operation_id": 1, "status": "completed"},
                "status": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let point = Point {
            id: 1,
            vectors: BTreeMap::new(),
            payload: Payload::new(),
        };
        store.upsert("c", vec![point]).await.unwrap();
        // empty batches never reach the server
        store.upsert("c", Vec::new()).await.unwrap();
    }

    #[test]
    fn test_fused_query_body_shape() {
        let prefetch = vec![
            Prefetch {
                using: "dense".into(),
                vector: VectorData::Dense(vec![0.5, 0.5]),
                limit: 25,
            },
            Prefetch {
                using: "bm25".into(),
                vector: VectorData::Sparse(SparseVector {
                    indices: vec![4],
                    values: vec![1.0],
                }),
                limit: 25,
            },
        ];
        let body = QdrantStore::fused_query_body(&prefetch, 60.0, 50);
        assert_eq!(body["prefetch"][0]["using"], "dense");
        assert_eq!(body["prefetch"][0]["limit"], 25);
        assert_eq!(body["prefetch"][1]["query"]["indices"], json!([4]));
        assert_eq!(body["query"]["rrf"]["k"], 60.0);
        assert_eq!(body["limit"], 50);
    }

    #[tokio::test]
    async fn test_fused_query_is_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/c/points/query"))
            .and(body_partial_json(json!({"query": {"rrf": {"k": 60.0}}, "limit": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"points": [
                    {"id": 2, "version": 0, "score": 0.032, "payload": {"recipe_name": "Pad Thai"}}
                ]},
                "status": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let prefetch = vec![Prefetch {
            using: "dense".into(),
            vector: VectorData::Dense(vec![1.0, 0.0]),
            limit: 5,
        }];
        let hits = store.fused_query("c", &prefetch, 60.0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[tokio::test]
    async fn test_query_parses_points() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/c/points/query"))
            .and(body_partial_json(json!({"using": "bm25", "limit": 25, "with_payload": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"points": [
                    {"id": 7, "version": 0, "score": 3.2, "payload": {"recipe_name": "Lasagna"}},
                    {"id": 3, "version": 0, "score": 1.1, "payload": {"recipe_name": "Ziti"}}
                ]},
                "status": "ok"
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let query = VectorData::Sparse(SparseVector {
            indices: vec![1],
            values: vec![1.0],
        });
        let hits = store.query("c", "bm25", &query, 25).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 7);
        assert_eq!(hits[0].payload["recipe_name"], "Lasagna");
    }

    #[tokio::test]
    async fn test_count_and_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/c/points/count"))
            .and(header("api-key", "s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"count": 12},
                "status": "ok"
            })))
            .mount(&server)
            .await;

        // SAFETY: test-only variable with a name no other test reads.
        unsafe { std::env::set_var("RECIPE_RAG_TEST_QDRANT_KEY", "s3cret") };
        let store = QdrantStore::new(&StoreConfig {
            url: server.uri(),
            api_key_env: Some("RECIPE_RAG_TEST_QDRANT_KEY".into()),
            ..StoreConfig::default()
        })
        .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_missing_collection_maps_404() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/gone/points/query"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "status": {"error": "Not found: Collection `gone` doesn't exist!"}
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let err = store
            .query("gone", "dense", &VectorData::Dense(vec![1.0]), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CollectionMissing { collection } if collection == "gone"));
    }

    #[tokio::test]
    async fn test_server_error_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/c"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let err = store
            .create_collection("c", &CollectionSchema::from_config(&StoreConfig::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Response { status: 500, ref body } if body == "boom"));
    }
}
