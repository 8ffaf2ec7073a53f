//! Deterministic stand-ins for the embedding provider and the store.
//!
//! Available to unit tests and, with the `test-utils` feature, to
//! integration tests.

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, StoreError};
use crate::store::{
    IndexInfo, LocalStore, StoreResult, ToolStore, UpsertOutcome, VectorIndexDefinition,
    VectorSearchQuery,
};
use async_trait::async_trait;
use serde_json::Value;

/// Deterministic provider: one dimension per vocabulary stem, counting the
/// words that start with it.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
        }
    }

    /// Vocabulary covering the arithmetic, greeting and weather tools.
    pub fn tools() -> Self {
        Self::new(&["add", "multipl", "greet", "weather", "number", "two", "city", "name"])
    }

    pub fn dimensions(&self) -> usize {
        self.vocabulary.len()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str, _model: &str, _dimensions: usize) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            for (i, stem) in self.vocabulary.iter().enumerate() {
                if !word.is_empty() && word.starts_with(stem) {
                    vector[i] += 1.0;
                }
            }
        }
        Ok(vector)
    }

    fn provider_name(&self) -> &str {
        "keyword"
    }
}

/// Local store whose writes and searches fail with a dimension mismatch,
/// as a backend with a differently sized index would.
pub struct DimensionRejectingStore {
    inner: LocalStore,
    expected: usize,
}

impl DimensionRejectingStore {
    pub fn new(expected: usize) -> Self {
        Self {
            inner: LocalStore::in_memory("rejecting"),
            expected,
        }
    }

    fn mismatch(&self, actual: usize) -> StoreError {
        StoreError::DimensionMismatch {
            path: "embedding".to_string(),
            expected: self.expected,
            actual,
        }
    }

    pub fn count(&self, collection: &str) -> usize {
        self.inner.count(collection)
    }
}

#[async_trait]
impl ToolStore for DimensionRejectingStore {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.inner.create_collection(name).await
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexInfo>> {
        self.inner.list_indexes(collection).await
    }

    async fn create_vector_index(
        &self,
        collection: &str,
        name: &str,
        definition: &VectorIndexDefinition,
    ) -> StoreResult<()> {
        self.inner.create_vector_index(collection, name, definition).await
    }

    async fn upsert_by_key(
        &self,
        _collection: &str,
        _key_field: &str,
        _key: &str,
        document: Value,
    ) -> StoreResult<UpsertOutcome> {
        let actual = document
            .get("embedding")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        Err(self.mismatch(actual))
    }

    async fn vector_search(
        &self,
        _collection: &str,
        query: &VectorSearchQuery,
    ) -> StoreResult<Vec<Value>> {
        Err(self.mismatch(query.query_vector.len()))
    }

    fn backend_name(&self) -> &str {
        "rejecting"
    }
}
