//! Document store contract for tool records.
//!
//! The registry and retriever only need a handful of operations from the
//! backing store: collection and index management, keyed upserts, and a
//! nearest-neighbour query over a named vector index. [`ToolStore`] is that
//! contract; [`LocalStore`] is the bundled backend.

pub mod local;
pub mod snapshot;

pub use local::LocalStore;

use crate::config::ToolConfig;
use crate::error::{AppError, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Similarity function declared for a vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Similarity {
    Cosine,
    Euclidean,
    DotProduct,
}

/// Field type marker serialised as `"knnVector"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VectorFieldType {
    #[default]
    #[serde(rename = "knnVector")]
    KnnVector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorField {
    #[serde(rename = "type", default)]
    pub field_type: VectorFieldType,
    pub dimensions: usize,
    pub similarity: Similarity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMappings {
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, VectorField>,
}

/// Vector search index definition.
///
/// Serialises to the familiar search-index shape:
/// `{"mappings": {"dynamic": true, "fields": {"embedding": {"type": "knnVector", ...}}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorIndexDefinition {
    pub mappings: IndexMappings,
}

impl VectorIndexDefinition {
    /// Dynamic mapping with a single vector field at `path`.
    pub fn knn(path: &str, dimensions: usize, similarity: Similarity) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            path.to_string(),
            VectorField {
                field_type: VectorFieldType::KnnVector,
                dimensions,
                similarity,
            },
        );

        Self {
            mappings: IndexMappings {
                dynamic: true,
                fields,
            },
        }
    }

    pub fn vector_field(&self, path: &str) -> Option<&VectorField> {
        self.mappings.fields.get(path)
    }
}

/// A named index as reported by [`ToolStore::list_indexes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub definition: VectorIndexDefinition,
}

/// Nearest-neighbour query against a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchQuery {
    pub index: String,
    pub query_vector: Vec<f32>,
    /// Document field holding the vector.
    pub path: String,
    /// Neighbours examined before truncating to `limit`; must be at least `limit`.
    pub num_candidates: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Operations the tool pipelines need from a document store.
///
/// Writes of a single document must be atomic; nothing else is assumed.
#[async_trait]
pub trait ToolStore: Send + Sync {
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Fails with [`StoreError::CollectionExists`] if the name is taken.
    async fn create_collection(&self, name: &str) -> StoreResult<()>;

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexInfo>>;

    /// Fails with [`StoreError::IndexExists`] if an index of that name exists.
    async fn create_vector_index(
        &self,
        collection: &str,
        name: &str,
        definition: &VectorIndexDefinition,
    ) -> StoreResult<()>;

    /// Insert `document`, or replace the document whose `key_field` equals `key`.
    async fn upsert_by_key(
        &self,
        collection: &str,
        key_field: &str,
        key: &str,
        document: Value,
    ) -> StoreResult<UpsertOutcome>;

    /// Documents ordered by similarity, closest first.
    async fn vector_search(
        &self,
        collection: &str,
        query: &VectorSearchQuery,
    ) -> StoreResult<Vec<Value>>;

    /// Short identifier used in logs.
    fn backend_name(&self) -> &str;
}

/// Open the store named by `config.store_uri`.
///
/// Supported: `memory://` (the default) and `file://<path>`.
pub fn connect_store(config: &ToolConfig) -> crate::error::Result<Arc<dyn ToolStore>> {
    let uri = config.store_uri.as_deref().unwrap_or("memory://").trim();

    let store = if uri == "memory://" || uri == "memory" {
        LocalStore::in_memory(&config.db_name)
    } else if let Some(path) = uri.strip_prefix("file://") {
        if path.is_empty() {
            return Err(AppError::ConfigurationError(
                "file:// store URI needs a path".to_string(),
            ));
        }
        LocalStore::open(PathBuf::from(path), &config.db_name)?
    } else {
        return Err(AppError::ConfigurationError(format!(
            "unsupported store URI '{}'",
            uri
        )));
    };

    tracing::info!(store = uri, database = %config.db_name, "Tool store connected");
    Ok(Arc::new(store))
}
