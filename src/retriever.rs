//! Semantic tool retrieval.

use crate::config::ToolConfig;
use crate::embedding::{EmbeddingClient, EmbeddingProvider};
use crate::error::{AppError, Result, StoreError};
use crate::registry::EMBEDDING_FIELD;
use crate::schema::ToolDescriptor;
use crate::store::{ToolStore, VectorSearchQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Tools returned when the caller does not ask for a specific number.
pub const DEFAULT_TOOL_LIMIT: usize = 2;

/// Marker serialised as `"function"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Function,
}

/// A matched tool in the envelope function-calling APIs accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub kind: ToolKind,
    pub function: ToolDescriptor,
}

impl From<ToolDescriptor> for SearchResult {
    fn from(function: ToolDescriptor) -> Self {
        Self {
            kind: ToolKind::Function,
            function,
        }
    }
}

pub struct ToolRetriever {
    config: ToolConfig,
    embedder: EmbeddingClient,
    store: Arc<dyn ToolStore>,
}

impl ToolRetriever {
    pub fn new(
        config: ToolConfig,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ToolStore>,
    ) -> Self {
        Self {
            embedder: EmbeddingClient::from_config(provider, &config),
            config,
            store,
        }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Find the tools whose descriptions are closest to `query`.
    ///
    /// Results come back in the store's order, closest first, without their
    /// embeddings. An empty list means nothing matched; a missing index is an
    /// error.
    ///
    /// # Errors
    /// `AppError::RetrievalError` carrying the query text if `limit` is zero
    /// or embedding or the search fails.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let start = std::time::Instant::now();

        let results = self
            .search_inner(query, limit)
            .await
            .map_err(|e| AppError::retrieval(query, e))?;

        tracing::info!(
            collection = %self.config.collection_name,
            index = %self.config.vector_index_name,
            limit,
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool search completed"
        );

        Ok(results)
    }

    async fn search_inner(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Err(AppError::ValidationError(
                "limit must be at least 1".to_string(),
            ));
        }

        let query_vector = self.embedder.embed(query).await?;

        let search = VectorSearchQuery {
            index: self.config.vector_index_name.clone(),
            query_vector,
            path: EMBEDDING_FIELD.to_string(),
            num_candidates: self.config.vector_search_candidates,
            limit,
        };

        let documents = self
            .store
            .vector_search(&self.config.collection_name, &search)
            .await?;

        documents.into_iter().map(into_result).collect()
    }
}

fn into_result(mut document: Value) -> Result<SearchResult> {
    if let Some(fields) = document.as_object_mut() {
        fields.remove(EMBEDDING_FIELD);
    }

    let descriptor: ToolDescriptor = serde_json::from_value(document).map_err(|e| {
        StoreError::Backend(format!("Stored tool record is malformed: {}", e))
    })?;

    Ok(descriptor.into())
}
