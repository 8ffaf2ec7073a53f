//! Tool registration pipeline.
//!
//! Extracts a descriptor from a declared function, embeds its description,
//! and upserts the resulting record keyed by tool name.

use crate::config::ToolConfig;
use crate::embedding::{EmbeddingClient, EmbeddingProvider};
use crate::error::{AppError, Result, StoreError};
use crate::schema::{extract_descriptor, FunctionSpec, ToolDescriptor, ToolRecord};
use crate::store::{Similarity, ToolStore, UpsertOutcome, VectorIndexDefinition};
use std::path::Path;
use std::sync::Arc;

/// Document field holding each tool's embedding.
pub const EMBEDDING_FIELD: &str = "embedding";

/// Document field used as the upsert key.
pub const KEY_FIELD: &str = "name";

pub struct ToolRegistry {
    config: ToolConfig,
    embedder: EmbeddingClient,
    store: Arc<dyn ToolStore>,
}

impl ToolRegistry {
    /// Connect a registry to its collection, creating the collection and its
    /// vector index when absent.
    ///
    /// # Errors
    /// `AppError::ConfigurationError` if the settings are invalid or the
    /// existing index declares a different dimensionality than configured.
    pub async fn new(
        config: ToolConfig,
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ToolStore>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Self {
            embedder: EmbeddingClient::from_config(provider, &config),
            config,
            store,
        };

        ensure_collection(registry.store.as_ref(), &registry.config.collection_name).await?;
        registry.ensure_index().await?;
        registry.validate_index_dimensions().await?;

        tracing::info!(
            store = registry.store.backend_name(),
            provider = registry.embedder.provider_name(),
            collection = %registry.config.collection_name,
            index = %registry.config.vector_index_name,
            dimensions = registry.config.embedding_dimensions,
            "Tool registry ready"
        );

        Ok(registry)
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    pub fn store(&self) -> Arc<dyn ToolStore> {
        Arc::clone(&self.store)
    }

    /// Create the configured vector index unless one of that name exists.
    pub async fn ensure_index(&self) -> Result<()> {
        let definition = default_index_definition(self.config.embedding_dimensions);
        ensure_vector_index(
            self.store.as_ref(),
            &self.config.collection_name,
            &self.config.vector_index_name,
            &definition,
        )
        .await
    }

    async fn validate_index_dimensions(&self) -> Result<()> {
        let indexes = self.store.list_indexes(&self.config.collection_name).await?;
        let index = indexes
            .iter()
            .find(|i| i.name == self.config.vector_index_name)
            .ok_or_else(|| {
                AppError::ConfigurationError(format!(
                    "index '{}' missing after bootstrap",
                    self.config.vector_index_name
                ))
            })?;

        check_dimensions(
            &index.definition,
            &self.config.vector_index_name,
            self.config.embedding_dimensions,
        )
    }

    /// Register one function as a tool.
    ///
    /// Re-registering a name replaces the whole record.
    ///
    /// # Errors
    /// `AppError::SchemaError` if the declaration cannot be described (nothing
    /// is written), otherwise `AppError::RegistrationError` naming the tool
    /// for any embedding or store failure, dimension rejections included.
    pub async fn register(&self, spec: &FunctionSpec) -> Result<ToolDescriptor> {
        let descriptor = extract_descriptor(spec)?;

        let outcome = self
            .store_descriptor(&descriptor)
            .await
            .map_err(|e| AppError::registration(&descriptor.name, e))?;

        tracing::info!(
            tool = %descriptor.name,
            collection = %self.config.collection_name,
            replaced = outcome == UpsertOutcome::Replaced,
            required = descriptor.parameters.required.len(),
            "Tool registered"
        );

        Ok(descriptor)
    }

    async fn store_descriptor(&self, descriptor: &ToolDescriptor) -> Result<UpsertOutcome> {
        let embedding = self.embedder.embed(&descriptor.description).await?;
        let record = ToolRecord::new(descriptor.clone(), embedding);

        let document = serde_json::to_value(&record).map_err(|e| {
            StoreError::Backend(format!("Failed to serialize tool record: {}", e))
        })?;

        let outcome = self
            .store
            .upsert_by_key(
                &self.config.collection_name,
                KEY_FIELD,
                &descriptor.name,
                document,
            )
            .await?;

        Ok(outcome)
    }

    /// Register each spec in order, stopping at the first failure.
    ///
    /// Tools registered before the failure stay registered.
    pub async fn register_all(&self, specs: &[FunctionSpec]) -> Result<Vec<ToolDescriptor>> {
        let mut registered = Vec::with_capacity(specs.len());
        for spec in specs {
            registered.push(self.register(spec).await?);
        }
        Ok(registered)
    }

    /// Provision a separate collection and vector index for a toolbox.
    ///
    /// An existing collection is reused. Returns settings scoped to the new
    /// namespace; pass them to a new registry or retriever.
    ///
    /// # Errors
    /// `AppError::ConfigurationError` if the definition does not declare an
    /// `embedding` field of the configured dimensionality.
    pub async fn create_toolbox(
        &self,
        collection_name: &str,
        index_definition: Option<VectorIndexDefinition>,
        index_name: Option<&str>,
    ) -> Result<ToolConfig> {
        let scoped = self.config.scoped(
            collection_name,
            index_name.unwrap_or(&self.config.vector_index_name),
        );
        scoped.validate()?;

        let definition = index_definition
            .unwrap_or_else(|| default_index_definition(scoped.embedding_dimensions));
        check_dimensions(
            &definition,
            &scoped.vector_index_name,
            scoped.embedding_dimensions,
        )?;

        ensure_collection(self.store.as_ref(), &scoped.collection_name).await?;
        ensure_vector_index(
            self.store.as_ref(),
            &scoped.collection_name,
            &scoped.vector_index_name,
            &definition,
        )
        .await?;

        tracing::info!(
            collection = %scoped.collection_name,
            index = %scoped.vector_index_name,
            "Toolbox ready"
        );

        Ok(scoped)
    }
}

/// Dynamic mapping with `embedding` as a cosine knnVector.
pub fn default_index_definition(dimensions: usize) -> VectorIndexDefinition {
    VectorIndexDefinition::knn(EMBEDDING_FIELD, dimensions, Similarity::Cosine)
}

fn check_dimensions(
    definition: &VectorIndexDefinition,
    index_name: &str,
    dimensions: usize,
) -> Result<()> {
    let field = definition.vector_field(EMBEDDING_FIELD).ok_or_else(|| {
        AppError::ConfigurationError(format!(
            "index '{}' does not declare a '{}' vector field",
            index_name, EMBEDDING_FIELD
        ))
    })?;

    if field.dimensions != dimensions {
        return Err(AppError::ConfigurationError(format!(
            "index '{}' declares {} dimensions but embeddings are configured for {}",
            index_name, field.dimensions, dimensions
        )));
    }

    Ok(())
}

async fn ensure_collection(store: &dyn ToolStore, name: &str) -> Result<()> {
    if store.list_collections().await?.iter().any(|c| c == name) {
        tracing::debug!(collection = name, "Using existing collection");
        return Ok(());
    }

    match store.create_collection(name).await {
        Ok(()) | Err(StoreError::CollectionExists(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn ensure_vector_index(
    store: &dyn ToolStore,
    collection: &str,
    name: &str,
    definition: &VectorIndexDefinition,
) -> Result<()> {
    if store.list_indexes(collection).await?.iter().any(|i| i.name == name) {
        tracing::debug!(collection, index = name, "Vector index already present");
        return Ok(());
    }

    match store.create_vector_index(collection, name, definition).await {
        Ok(()) => {
            tracing::info!(collection, index = name, "Vector index created");
            Ok(())
        }
        Err(StoreError::IndexExists { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Read a JSON array of function declarations.
pub fn load_function_specs(path: &Path) -> Result<Vec<FunctionSpec>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigurationError(format!(
            "Failed to read tool definitions from {}: {}",
            path.display(),
            e
        ))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        AppError::SchemaError(format!(
            "Invalid tool definitions in {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamSpec;
    use crate::testing::{DimensionRejectingStore, KeywordEmbedder};
    use crate::store::LocalStore;
    use serde_json::json;

    fn config(dimensions: usize) -> ToolConfig {
        ToolConfig {
            embedding_dimensions: dimensions,
            ..ToolConfig::default()
        }
    }

    async fn registry() -> (ToolRegistry, Arc<LocalStore>) {
        let provider = Arc::new(KeywordEmbedder::tools());
        let store = Arc::new(LocalStore::in_memory("test_db"));
        let registry = ToolRegistry::new(config(provider.dimensions()), provider, store.clone())
            .await
            .unwrap();
        (registry, store)
    }

    fn add_spec() -> FunctionSpec {
        FunctionSpec::new("add")
            .doc("Add two numbers.")
            .param(ParamSpec::new("a").annotated("int"))
            .param(ParamSpec::new("b").annotated("int"))
    }

    #[tokio::test]
    async fn test_new_bootstraps_collection_and_index() {
        let (_registry, store) = registry().await;

        assert_eq!(store.list_collections().await.unwrap(), vec!["tools"]);
        let indexes = store.list_indexes("tools").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "vector_index");
        assert_eq!(
            indexes[0].definition.vector_field("embedding").unwrap().dimensions,
            8
        );
    }

    #[tokio::test]
    async fn test_new_is_idempotent() {
        let provider = Arc::new(KeywordEmbedder::tools());
        let store = Arc::new(LocalStore::in_memory("test_db"));

        ToolRegistry::new(config(8), provider.clone(), store.clone()).await.unwrap();
        ToolRegistry::new(config(8), provider, store.clone()).await.unwrap();

        assert_eq!(store.list_indexes("tools").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_rejects_index_with_other_dimensions() {
        let store = Arc::new(LocalStore::in_memory("test_db"));
        store.create_collection("tools").await.unwrap();
        store
            .create_vector_index("tools", "vector_index", &default_index_definition(16))
            .await
            .unwrap();

        let result = ToolRegistry::new(config(8), Arc::new(KeywordEmbedder::tools()), store).await;
        assert!(matches!(result, Err(AppError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_register_stores_record() {
        let (registry, store) = registry().await;

        let descriptor = registry.register(&add_spec()).await.unwrap();
        assert_eq!(descriptor.parameters.required, vec!["a", "b"]);

        let doc = store.find_by_key("tools", "name", "add").unwrap();
        assert_eq!(doc["description"], "Add two numbers.");
        assert_eq!(doc["parameters"]["properties"]["a"]["type"], "number");
        assert_eq!(doc["parameters"]["additionalProperties"], false);
        assert_eq!(doc["embedding"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_reregister_keeps_single_record() {
        let (registry, store) = registry().await;

        registry.register(&add_spec()).await.unwrap();
        let updated = FunctionSpec::new("add")
            .doc("Add two numbers, now with a default.")
            .param(ParamSpec::new("a").annotated("int"))
            .param(ParamSpec::new("b").annotated("int").with_default(0));
        registry.register(&updated).await.unwrap();

        assert_eq!(store.count("tools"), 1);
        let doc = store.find_by_key("tools", "name", "add").unwrap();
        assert_eq!(doc["parameters"]["required"], json!(["a"]));
    }

    #[tokio::test]
    async fn test_missing_docstring_writes_nothing() {
        let (registry, store) = registry().await;

        let err = registry
            .register(&FunctionSpec::new("mystery").param(ParamSpec::new("x")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SchemaError(_)));
        assert_eq!(store.count("tools"), 0);
    }

    #[tokio::test]
    async fn test_reregister_without_docstring_keeps_stored_record() {
        let (registry, store) = registry().await;
        registry.register(&add_spec()).await.unwrap();
        let before = store.find_by_key("tools", "name", "add").unwrap();

        let undocumented = FunctionSpec::new("add")
            .param(ParamSpec::new("a").annotated("int"))
            .param(ParamSpec::new("b").annotated("int"));
        let err = registry.register(&undocumented).await.unwrap_err();
        assert!(matches!(err, AppError::SchemaError(_)));

        let after = store.find_by_key("tools", "name", "add").unwrap();
        assert_eq!(after["description"], "Add two numbers.");
        assert_eq!(after["embedding"], before["embedding"]);
        assert_eq!(store.count("tools"), 1);
    }

    #[tokio::test]
    async fn test_store_dimension_rejection_names_tool() {
        let provider = Arc::new(KeywordEmbedder::tools());
        let store = Arc::new(DimensionRejectingStore::new(16));
        let registry = ToolRegistry::new(config(provider.dimensions()), provider, store.clone())
            .await
            .unwrap();

        let err = registry.register(&add_spec()).await.unwrap_err();
        match &err {
            AppError::RegistrationError { tool, source } => {
                assert_eq!(tool, "add");
                assert!(matches!(**source, AppError::ConfigurationError(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.count("tools"), 0);
    }

    #[tokio::test]
    async fn test_variadics_never_stored() {
        let (registry, store) = registry().await;
        let spec = FunctionSpec::new("greet")
            .doc("Greet someone by name.")
            .param(ParamSpec::new("name").annotated("str").with_default("world"))
            .param(ParamSpec::var_positional("args"))
            .param(ParamSpec::var_keyword("kwargs"));

        registry.register(&spec).await.unwrap();

        let doc = store.find_by_key("tools", "name", "greet").unwrap();
        let properties = doc["parameters"]["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 1);
        assert!(properties.contains_key("name"));
        assert_eq!(doc["parameters"]["required"], json!([]));
    }

    #[tokio::test]
    async fn test_register_all_stops_at_first_failure() {
        let (registry, store) = registry().await;
        let specs = vec![
            add_spec(),
            FunctionSpec::new("broken"),
            FunctionSpec::new("greet").doc("Greet someone."),
        ];

        assert!(registry.register_all(&specs).await.is_err());
        assert_eq!(store.count("tools"), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_names_tool() {
        struct Down;

        #[async_trait::async_trait]
        impl EmbeddingProvider for Down {
            async fn embed(&self, _: &str, _: &str, _: usize) -> Result<Vec<f32>> {
                Err(AppError::EmbeddingError("service unavailable".into()))
            }

            fn provider_name(&self) -> &str {
                "down"
            }
        }

        let store = Arc::new(LocalStore::in_memory("test_db"));
        let registry = ToolRegistry::new(config(8), Arc::new(Down), store.clone())
            .await
            .unwrap();

        match registry.register(&add_spec()).await {
            Err(AppError::RegistrationError { tool, .. }) => assert_eq!(tool, "add"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(store.count("tools"), 0);
    }

    #[tokio::test]
    async fn test_create_toolbox_provisions_namespace() {
        let (registry, store) = registry().await;

        let scoped = registry
            .create_toolbox("math_tools", None, Some("math_index"))
            .await
            .unwrap();

        assert_eq!(scoped.collection_name, "math_tools");
        assert_eq!(scoped.vector_index_name, "math_index");
        assert_eq!(scoped.embedding_dimensions, 8);
        assert_eq!(registry.config().collection_name, "tools");

        let indexes = store.list_indexes("math_tools").await.unwrap();
        assert_eq!(indexes[0].name, "math_index");

        // Existing collection is reused.
        registry
            .create_toolbox("math_tools", None, Some("math_index"))
            .await
            .unwrap();
        assert_eq!(store.list_indexes("math_tools").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_toolbox_rejects_mismatched_definition() {
        let (registry, store) = registry().await;

        let result = registry
            .create_toolbox("wide", Some(default_index_definition(1536)), None)
            .await;

        assert!(matches!(result, Err(AppError::ConfigurationError(_))));
        assert!(!store.list_collections().await.unwrap().contains(&"wide".to_string()));
    }

    #[test]
    fn test_load_function_specs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.json");
        std::fs::write(
            &path,
            r#"[
                {
                    "name": "add",
                    "docstring": "Add two numbers.",
                    "params": [
                        {"name": "a", "annotation": "int"},
                        {"name": "b", "annotation": "int"}
                    ]
                }
            ]"#,
        )
        .unwrap();

        let specs = load_function_specs(&path).unwrap();
        assert_eq!(specs, vec![add_spec()]);
    }

    #[test]
    fn test_load_function_specs_missing_file() {
        let result = load_function_specs(Path::new("/nonexistent/tools.json"));
        assert!(matches!(result, Err(AppError::ConfigurationError(_))));
    }
}
