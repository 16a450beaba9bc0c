//! Vector index abstraction: named collections of embedded chunks with
//! nearest-neighbor retrieval.
//!
//! The answer pipeline creates one collection per request, fills it, queries
//! it, and drops it. Two implementations:
//! - **[`MemoryIndex`]**: in-process brute-force cosine store; the default
//!   provider and the test double.
//! - **[`ChromaIndex`]**: wraps a Chroma server's REST API behind the same
//!   narrow interface.
//!
//! Invariant: every vector in a collection shares the dimension declared at
//! creation; `MemoryIndex` rejects mismatched inserts.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::embedding::cosine_similarity;
use crate::error::PipelineError;

/// Identity of a chunk as stored alongside its vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub source_id: String,
    pub source_name: String,
    pub sequence_index: usize,
    pub hash: String,
}

/// One (vector, text, metadata) tuple to insert.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkRef,
}

/// One retrieval hit, highest similarity first.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub text: String,
    pub metadata: ChunkRef,
    pub score: f32,
}

/// Narrow interface over the similarity-search service.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create (or reset) a collection expecting vectors of `dims`.
    async fn create_collection(&self, name: &str, dims: usize) -> Result<(), PipelineError>;

    /// Insert entries into a collection.
    async fn upsert(&self, collection: &str, entries: Vec<IndexEntry>)
        -> Result<(), PipelineError>;

    /// Return the `k` entries most similar to `vector`, best first.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEntry>, PipelineError>;

    /// Remove a collection and everything in it. Dropping a collection that
    /// does not exist is not an error.
    async fn drop_collection(&self, name: &str) -> Result<(), PipelineError>;
}

/// Instantiate the configured index provider.
pub fn create_index(config: &IndexConfig) -> Result<std::sync::Arc<dyn VectorIndex>, PipelineError> {
    match config.provider.as_str() {
        "memory" => Ok(std::sync::Arc::new(MemoryIndex::new())),
        "chroma" => Ok(std::sync::Arc::new(ChromaIndex::new(config)?)),
        other => Err(PipelineError::Config(format!(
            "unknown index provider: {}",
            other
        ))),
    }
}

// ============ In-memory index ============

struct Collection {
    dims: usize,
    entries: Vec<IndexEntry>,
}

/// In-process vector store: `HashMap` behind `RwLock`, brute-force cosine
/// search over all entries of a collection.
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live collections (for tests and leak checks).
    pub fn collection_count(&self) -> usize {
        self.collections.read().unwrap().len()
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn create_collection(&self, name: &str, dims: usize) -> Result<(), PipelineError> {
        let mut collections = self.collections.write().unwrap();
        collections.insert(
            name.to_string(),
            Collection {
                dims,
                entries: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> Result<(), PipelineError> {
        let mut collections = self.collections.write().unwrap();
        let stored = collections.get_mut(collection).ok_or_else(|| {
            PipelineError::RemoteCall(format!("unknown collection: {}", collection))
        })?;
        for entry in &entries {
            if entry.vector.len() != stored.dims {
                return Err(PipelineError::Config(format!(
                    "vector dimension {} does not match collection dimension {}",
                    entry.vector.len(),
                    stored.dims
                )));
            }
        }
        stored.entries.extend(entries);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEntry>, PipelineError> {
        let collections = self.collections.read().unwrap();
        let stored = collections.get(collection).ok_or_else(|| {
            PipelineError::RemoteCall(format!("unknown collection: {}", collection))
        })?;

        let mut scored: Vec<ScoredEntry> = stored
            .entries
            .iter()
            .map(|entry| ScoredEntry {
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn drop_collection(&self, name: &str) -> Result<(), PipelineError> {
        self.collections.write().unwrap().remove(name);
        Ok(())
    }
}

// ============ Chroma index ============

/// Client for a Chroma server's REST API.
///
/// Collections are created with cosine space and get-or-create semantics;
/// Chroma derives the vector dimension from the first insert, so the declared
/// `dims` is not transmitted.
pub struct ChromaIndex {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    /// Collection name → Chroma collection UUID.
    ids: RwLock<HashMap<String, String>>,
}

impl ChromaIndex {
    pub fn new(config: &IndexConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::RemoteCall(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            max_retries: config.max_retries,
            ids: RwLock::new(HashMap::new()),
        })
    }

    fn collection_id(&self, name: &str) -> Result<String, PipelineError> {
        self.ids.read().unwrap().get(name).cloned().ok_or_else(|| {
            PipelineError::RemoteCall(format!("unknown collection: {}", name))
        })
    }

    async fn request_with_retry(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, PipelineError> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), url);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.or(Ok(serde_json::Value::Null));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::RemoteCall(format!(
                            "Chroma error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::RemoteCall(format!(
                        "Chroma error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::RemoteCall(format!("Chroma: {}", e)));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| PipelineError::RemoteCall("Chroma request failed after retries".to_string())))
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn create_collection(&self, name: &str, _dims: usize) -> Result<(), PipelineError> {
        let body = serde_json::json!({
            "name": name,
            "get_or_create": true,
            "metadata": { "hnsw:space": "cosine" },
        });
        let json = self
            .request_with_retry(
                reqwest::Method::POST,
                &format!("{}/api/v1/collections", self.base_url),
                Some(&body),
            )
            .await?;
        let id = json
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                PipelineError::RemoteCall("invalid Chroma response: missing collection id".to_string())
            })?
            .to_string();
        self.ids.write().unwrap().insert(name.to_string(), id);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> Result<(), PipelineError> {
        let id = self.collection_id(collection)?;
        let ids: Vec<String> = entries
            .iter()
            .map(|e| format!("{}#{}", e.metadata.source_id, e.metadata.sequence_index))
            .collect();
        let embeddings: Vec<&[f32]> = entries.iter().map(|e| e.vector.as_slice()).collect();
        let documents: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        let metadatas: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| serde_json::to_value(&e.metadata).unwrap_or_default())
            .collect();
        let body = serde_json::json!({
            "ids": ids,
            "embeddings": embeddings,
            "documents": documents,
            "metadatas": metadatas,
        });
        self.request_with_retry(
            reqwest::Method::POST,
            &format!("{}/api/v1/collections/{}/add", self.base_url, id),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredEntry>, PipelineError> {
        let id = self.collection_id(collection)?;
        let body = serde_json::json!({
            "query_embeddings": [vector],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });
        let json = self
            .request_with_retry(
                reqwest::Method::POST,
                &format!("{}/api/v1/collections/{}/query", self.base_url, id),
                Some(&body),
            )
            .await?;
        parse_chroma_query_response(&json)
    }

    async fn drop_collection(&self, name: &str) -> Result<(), PipelineError> {
        self.ids.write().unwrap().remove(name);
        // Chroma deletes by name; a 404 for an already-absent collection is fine.
        let url = format!("{}/api/v1/collections/{}", self.base_url, name);
        match self
            .request_with_retry(reqwest::Method::DELETE, &url, None)
            .await
        {
            Ok(_) => Ok(()),
            Err(PipelineError::RemoteCall(msg)) if msg.contains("404") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Flatten Chroma's arrays-of-arrays query response into [`ScoredEntry`]s.
/// Chroma reports cosine distance; similarity = 1 − distance.
fn parse_chroma_query_response(
    json: &serde_json::Value,
) -> Result<Vec<ScoredEntry>, PipelineError> {
    let first = |key: &str| -> Option<&Vec<serde_json::Value>> {
        json.get(key)?.as_array()?.first()?.as_array()
    };

    let documents = first("documents").ok_or_else(|| {
        PipelineError::RemoteCall("invalid Chroma response: missing documents".to_string())
    })?;
    let metadatas = first("metadatas").ok_or_else(|| {
        PipelineError::RemoteCall("invalid Chroma response: missing metadatas".to_string())
    })?;
    let distances = first("distances").ok_or_else(|| {
        PipelineError::RemoteCall("invalid Chroma response: missing distances".to_string())
    })?;

    let mut results = Vec::with_capacity(documents.len());
    for ((document, metadata), distance) in documents.iter().zip(metadatas).zip(distances) {
        let text = document.as_str().unwrap_or_default().to_string();
        let metadata: ChunkRef = serde_json::from_value(metadata.clone()).map_err(|e| {
            PipelineError::RemoteCall(format!("invalid Chroma metadata: {}", e))
        })?;
        let score = 1.0 - distance.as_f64().unwrap_or(1.0) as f32;
        results.push(ScoredEntry {
            text,
            metadata,
            score,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source_id: &str, index: usize, text: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            vector,
            text: text.to_string(),
            metadata: ChunkRef {
                source_id: source_id.to_string(),
                source_name: format!("{}.txt", source_id),
                sequence_index: index,
                hash: format!("hash-{}-{}", source_id, index),
            },
        }
    }

    #[tokio::test]
    async fn query_returns_best_matches_first() {
        let index = MemoryIndex::new();
        index.create_collection("c", 2).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    entry("a", 0, "east", vec![1.0, 0.0]),
                    entry("b", 0, "north", vec![0.0, 1.0]),
                    entry("a", 1, "northeast", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("c", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "northeast");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn k_larger_than_collection_returns_everything() {
        let index = MemoryIndex::new();
        index.create_collection("c", 2).await.unwrap();
        index
            .upsert("c", vec![entry("a", 0, "only", vec![1.0, 0.0])])
            .await
            .unwrap();
        let hits = index.query("c", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let index = MemoryIndex::new();
        index.create_collection("c", 3).await.unwrap();
        let err = index
            .upsert("c", vec![entry("a", 0, "short", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[tokio::test]
    async fn unknown_collection_is_an_error() {
        let index = MemoryIndex::new();
        assert!(index.query("missing", &[1.0], 1).await.is_err());
        assert!(index
            .upsert("missing", vec![entry("a", 0, "x", vec![1.0])])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn drop_collection_is_idempotent() {
        let index = MemoryIndex::new();
        index.create_collection("c", 2).await.unwrap();
        assert_eq!(index.collection_count(), 1);
        index.drop_collection("c").await.unwrap();
        index.drop_collection("c").await.unwrap();
        assert_eq!(index.collection_count(), 0);
    }

    #[test]
    fn parse_chroma_query_response_flattens_nested_arrays() {
        let json = serde_json::json!({
            "documents": [["first chunk", "second chunk"]],
            "metadatas": [[
                { "source_id": "a", "source_name": "a.txt", "sequence_index": 0, "hash": "h0" },
                { "source_id": "b", "source_name": "b.pdf", "sequence_index": 3, "hash": "h1" },
            ]],
            "distances": [[0.1, 0.4]],
        });
        let hits = parse_chroma_query_response(&json).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.source_id, "a");
        assert!((hits[0].score - 0.9).abs() < 1e-6);
        assert_eq!(hits[1].metadata.sequence_index, 3);
    }

    #[test]
    fn parse_chroma_query_response_rejects_missing_fields() {
        let json = serde_json::json!({ "documents": [[]] });
        assert!(parse_chroma_query_response(&json).is_err());
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let config = IndexConfig {
            provider: "pinecone".to_string(),
            ..IndexConfig::default()
        };
        assert!(matches!(
            create_index(&config).err().unwrap(),
            PipelineError::Config(_)
        ));
    }
}
