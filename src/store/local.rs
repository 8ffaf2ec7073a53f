//! Local document store with exact vector search.
//!
//! Keeps collections in memory behind a single `RwLock` and scores every
//! indexed document on each query. Suited to development, tests, and tool
//! catalogues small enough that a full scan is cheap.
//!
//! With a snapshot path every mutation is staged on a copy of its collection,
//! written to disk on the blocking pool, and only then made visible. Writers
//! queue on an async gate; readers never wait on disk I/O.

use crate::error::StoreError;
use crate::store::{
    snapshot, IndexInfo, Similarity, StoreResult, ToolStore, UpsertOutcome, VectorIndexDefinition,
    VectorSearchQuery,
};
use async_trait::async_trait;
use ndarray::ArrayView1;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// One collection: its search indexes and documents in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionData {
    pub indexes: Vec<IndexInfo>,
    pub documents: Vec<Value>,
}

/// What a mutation expects of its target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Existing,
    CreateIfMissing,
    New,
}

pub struct LocalStore {
    database: String,
    collections: RwLock<BTreeMap<String, CollectionData>>,
    snapshot_path: Option<PathBuf>,
    /// Held for the whole of a mutation, disk write included.
    write_gate: Mutex<()>,
}

impl LocalStore {
    /// Volatile store; contents are lost when dropped.
    pub fn in_memory(database: &str) -> Self {
        Self {
            database: database.to_string(),
            collections: RwLock::new(BTreeMap::new()),
            snapshot_path: None,
            write_gate: Mutex::new(()),
        }
    }

    /// Store persisted to `path`, loading the existing snapshot if present.
    pub fn open(path: PathBuf, database: &str) -> StoreResult<Self> {
        let collections = snapshot::load(&path, database)?.unwrap_or_default();

        Ok(Self {
            database: database.to_string(),
            collections: RwLock::new(collections),
            snapshot_path: Some(path),
            write_gate: Mutex::new(()),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Fetch the document whose `key_field` equals `key`.
    pub fn find_by_key(&self, collection: &str, key_field: &str, key: &str) -> Option<Value> {
        let collections = self.collections.read();
        collections
            .get(collection)?
            .documents
            .iter()
            .find(|doc| doc.get(key_field).and_then(Value::as_str) == Some(key))
            .cloned()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }

    /// Apply `mutate` to one collection, persisting first when file-backed.
    ///
    /// A failed mutation or snapshot write leaves the collection unchanged.
    async fn mutate<T, F>(&self, collection: &str, target: Target, mutate: F) -> StoreResult<T>
    where
        T: Send,
        F: FnOnce(&mut CollectionData) -> StoreResult<T> + Send,
    {
        let _gate = self.write_gate.lock().await;

        match &self.snapshot_path {
            Some(path) => self.mutate_persisted(path, collection, target, mutate).await,
            None => self.mutate_in_place(collection, target, mutate),
        }
    }

    /// `mutate` must fail before it modifies anything.
    fn mutate_in_place<T>(
        &self,
        collection: &str,
        target: Target,
        mutate: impl FnOnce(&mut CollectionData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut collections = self.collections.write();
        let created = check_target(collections.contains_key(collection), collection, target)?;
        let data = collections.entry(collection.to_string()).or_default();

        let result = mutate(data);
        if result.is_err() && created {
            collections.remove(collection);
        }
        result
    }

    async fn mutate_persisted<T>(
        &self,
        path: &Path,
        collection: &str,
        target: Target,
        mutate: impl FnOnce(&mut CollectionData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let existing = self.collections.read().get(collection).cloned();
        check_target(existing.is_some(), collection, target)?;

        let mut staged = existing.unwrap_or_default();
        let outcome = mutate(&mut staged)?;

        let bytes = {
            let collections = self.collections.read();
            let mut view: snapshot::CollectionsView<'_> =
                collections.iter().map(|(name, data)| (name.as_str(), data)).collect();
            view.insert(collection, &staged);
            snapshot::encode(&self.database, &view)?
        };

        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || snapshot::write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Backend(format!("Snapshot writer failed: {}", e)))??;

        self.collections
            .write()
            .insert(collection.to_string(), staged);
        Ok(outcome)
    }
}

/// Returns whether the mutation creates the collection.
fn check_target(exists: bool, collection: &str, target: Target) -> StoreResult<bool> {
    match (exists, target) {
        (true, Target::New) => Err(StoreError::CollectionExists(collection.to_string())),
        (true, _) => Ok(false),
        (false, Target::Existing) => Err(StoreError::CollectionNotFound(collection.to_string())),
        (false, _) => Ok(true),
    }
}

/// Resolve a dotted path inside a document.
fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |value, segment| value.get(segment))
}

fn as_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Similarity score in the conventions of hosted vector search: higher is closer.
fn score(similarity: Similarity, query: ArrayView1<f32>, doc: ArrayView1<f32>) -> f32 {
    match similarity {
        Similarity::Cosine => {
            let denom = query.dot(&query).sqrt() * doc.dot(&doc).sqrt();
            let cosine = if denom > 0.0 { query.dot(&doc) / denom } else { 0.0 };
            (1.0 + cosine) / 2.0
        }
        Similarity::DotProduct => (1.0 + query.dot(&doc)) / 2.0,
        Similarity::Euclidean => {
            let distance = (&query - &doc).mapv(|x| x * x).sum().sqrt();
            1.0 / (1.0 + distance)
        }
    }
}

#[async_trait]
impl ToolStore for LocalStore {
    async fn list_collections(&self) -> StoreResult<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    async fn create_collection(&self, name: &str) -> StoreResult<()> {
        self.mutate(name, Target::New, |_| Ok(())).await?;
        tracing::info!(collection = name, "Collection created");
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexInfo>> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }

    async fn create_vector_index(
        &self,
        collection: &str,
        name: &str,
        definition: &VectorIndexDefinition,
    ) -> StoreResult<()> {
        if definition.mappings.fields.is_empty()
            || definition.mappings.fields.values().any(|f| f.dimensions == 0)
        {
            return Err(StoreError::InvalidQuery(format!(
                "index '{}' must declare at least one vector field with non-zero dimensions",
                name
            )));
        }

        self.mutate(collection, Target::Existing, |data| {
            if data.indexes.iter().any(|i| i.name == name) {
                return Err(StoreError::IndexExists {
                    collection: collection.to_string(),
                    index: name.to_string(),
                });
            }
            data.indexes.push(IndexInfo {
                name: name.to_string(),
                definition: definition.clone(),
            });
            Ok(())
        })
        .await
    }

    async fn upsert_by_key(
        &self,
        collection: &str,
        key_field: &str,
        key: &str,
        mut document: Value,
    ) -> StoreResult<UpsertOutcome> {
        let Some(fields) = document.as_object_mut() else {
            return Err(StoreError::InvalidQuery(
                "document must be a JSON object".to_string(),
            ));
        };
        fields.insert(key_field.to_string(), Value::String(key.to_string()));

        self.mutate(collection, Target::CreateIfMissing, |data| {
            for index in &data.indexes {
                for (path, field) in &index.definition.mappings.fields {
                    if let Some(vector) = lookup_path(&document, path).and_then(as_vector) {
                        if vector.len() != field.dimensions {
                            return Err(StoreError::DimensionMismatch {
                                path: path.clone(),
                                expected: field.dimensions,
                                actual: vector.len(),
                            });
                        }
                    }
                }
            }

            let existing = data
                .documents
                .iter_mut()
                .find(|doc| doc.get(key_field).and_then(Value::as_str) == Some(key));

            match existing {
                Some(doc) => {
                    *doc = document;
                    Ok(UpsertOutcome::Replaced)
                }
                None => {
                    data.documents.push(document);
                    Ok(UpsertOutcome::Inserted)
                }
            }
        })
        .await
    }

    async fn vector_search(
        &self,
        collection: &str,
        query: &VectorSearchQuery,
    ) -> StoreResult<Vec<Value>> {
        if query.limit == 0 {
            return Err(StoreError::InvalidQuery("limit must be at least 1".to_string()));
        }
        if query.num_candidates < query.limit {
            return Err(StoreError::InvalidQuery(format!(
                "numCandidates ({}) must be greater than or equal to limit ({})",
                query.num_candidates, query.limit
            )));
        }

        let collections = self.collections.read();
        let index_not_found = || StoreError::IndexNotFound {
            collection: collection.to_string(),
            index: query.index.clone(),
        };

        let data = collections.get(collection).ok_or_else(index_not_found)?;
        let index = data
            .indexes
            .iter()
            .find(|i| i.name == query.index)
            .ok_or_else(index_not_found)?;

        let field = index.definition.vector_field(&query.path).ok_or_else(|| {
            StoreError::InvalidQuery(format!(
                "path '{}' is not indexed by '{}'",
                query.path, query.index
            ))
        })?;

        if query.query_vector.len() != field.dimensions {
            return Err(StoreError::DimensionMismatch {
                path: query.path.clone(),
                expected: field.dimensions,
                actual: query.query_vector.len(),
            });
        }

        let query_view = ArrayView1::from(query.query_vector.as_slice());

        let mut scored: Vec<(f32, &Value)> = data
            .documents
            .iter()
            .filter_map(|doc| {
                let vector = lookup_path(doc, &query.path).and_then(as_vector)?;
                if vector.len() != field.dimensions {
                    return None;
                }
                let s = score(field.similarity, query_view, ArrayView1::from(vector.as_slice()));
                Some((s, doc))
            })
            .collect();

        // Stable sort keeps insertion order among ties.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<Value> = scored
            .into_iter()
            .take(query.num_candidates)
            .take(query.limit)
            .map(|(_, doc)| doc.clone())
            .collect();

        tracing::debug!(
            collection,
            index = %query.index,
            candidates = query.num_candidates,
            limit = query.limit,
            results = results.len(),
            "Vector search completed"
        );

        Ok(results)
    }

    fn backend_name(&self) -> &str {
        "local"
    }
}
