use std::env;
use std::path::PathBuf;

use crate::error::{AppError, Result};

/// Default database holding tool collections.
pub const DEFAULT_DB_NAME: &str = "function_calling_db";
/// Default collection for registered tools.
pub const DEFAULT_COLLECTION: &str = "tools";
/// Default embedding model identifier.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default embedding dimensionality.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;
/// Default candidate pool examined per similarity search.
pub const DEFAULT_VECTOR_SEARCH_CANDIDATES: usize = 150;
/// Default vector index name.
pub const DEFAULT_VECTOR_INDEX: &str = "vector_index";

/// Settings shared by the tool registry and the tool retriever.
///
/// Immutable once built. To work against another namespace derive a new
/// value with [`ToolConfig::scoped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    /// Store endpoint, e.g. `memory://` or `file:///var/lib/toolbox/tools.json`.
    pub store_uri: Option<String>,
    pub db_name: String,
    pub collection_name: String,
    pub embedding_model: String,
    /// Must equal both the provider's output length and the index's declared size.
    pub embedding_dimensions: usize,
    /// Approximate neighbours the store examines before truncating to the limit.
    pub vector_search_candidates: usize,
    pub vector_index_name: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            store_uri: None,
            db_name: DEFAULT_DB_NAME.to_string(),
            collection_name: DEFAULT_COLLECTION.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            vector_search_candidates: DEFAULT_VECTOR_SEARCH_CANDIDATES,
            vector_index_name: DEFAULT_VECTOR_INDEX.to_string(),
        }
    }
}

impl ToolConfig {
    /// Load tool settings from environment variables, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            store_uri: env::var("STORE_URI").ok(),
            db_name: env::var("TOOLS_DB_NAME").unwrap_or(defaults.db_name),
            collection_name: env::var("TOOLS_COLLECTION").unwrap_or(defaults.collection_name),
            embedding_model: env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimensions: env::var("EMBEDDING_DIMENSIONS")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_DIMENSIONS.to_string())
                .parse()?,
            vector_search_candidates: env::var("VECTOR_SEARCH_CANDIDATES")
                .unwrap_or_else(|_| DEFAULT_VECTOR_SEARCH_CANDIDATES.to_string())
                .parse()?,
            vector_index_name: env::var("VECTOR_INDEX_NAME").unwrap_or(defaults.vector_index_name),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no store could honour.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimensions == 0 {
            return Err(AppError::ConfigurationError(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        if self.vector_search_candidates == 0 {
            return Err(AppError::ConfigurationError(
                "vector search candidates must be greater than zero".to_string(),
            ));
        }
        if self.collection_name.trim().is_empty() || self.vector_index_name.trim().is_empty() {
            return Err(AppError::ConfigurationError(
                "collection and index names cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Same settings, pointed at another collection and index.
    pub fn scoped(&self, collection_name: &str, vector_index_name: &str) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            vector_index_name: vector_index_name.to_string(),
            ..self.clone()
        }
    }
}

/// Which embedding provider backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// OpenAI-compatible HTTP embeddings endpoint.
    OpenAi,
    /// Local ONNX bi-encoder.
    Onnx,
}

impl EmbeddingBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "openai" | "http" => Ok(Self::OpenAi),
            "onnx" | "local" | "bi-encoder" => Ok(Self::Onnx),
            other => Err(AppError::ConfigurationError(format!(
                "unknown embedding provider '{}'",
                other
            ))),
        }
    }
}

pub struct Config {
    pub host: String,
    pub port: u16,
    /// Upper bound on the shutdown drain of in-flight requests.
    pub shutdown_timeout_secs: u64,
    /// Optional JSON file of function specs registered at startup.
    pub tools_path: Option<PathBuf>,
    pub embedding_backend: EmbeddingBackend,
    pub openai_api_key: Option<String>,
    /// Base URL of the embeddings API. Defaults to the public OpenAI endpoint.
    pub openai_base_url: Option<String>,
    pub embedding_timeout_secs: u64,
    /// Path to bi-encoder ONNX model.
    pub bi_encoder_model_path: PathBuf,
    /// Path to bi-encoder tokenizer.
    pub bi_encoder_tokenizer_path: PathBuf,
    pub max_sequence_length: usize,
    /// Number of ONNX sessions. If None, uses available parallelism.
    pub onnx_pool_size: Option<usize>,
    pub tool: ToolConfig,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let embedding_backend =
            EmbeddingBackend::parse(&env::var("EMBEDDING_PROVIDER").unwrap_or_default())?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            shutdown_timeout_secs: env::var("SHUTDOWN_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            tools_path: env::var("TOOLS_PATH").ok().map(PathBuf::from),
            embedding_backend,
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            embedding_timeout_secs: env::var("EMBEDDING_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            bi_encoder_model_path: PathBuf::from(
                env::var("BI_ENCODER_MODEL_PATH")
                    .unwrap_or_else(|_| "./bi-encoder-model/model_int8.onnx".to_string()),
            ),
            bi_encoder_tokenizer_path: PathBuf::from(
                env::var("BI_ENCODER_TOKENIZER_PATH")
                    .unwrap_or_else(|_| "./bi-encoder-model/tokenizer.json".to_string()),
            ),
            max_sequence_length: env::var("MAX_SEQ_LENGTH")
                .unwrap_or_else(|_| "512".to_string())
                .parse()?,
            onnx_pool_size: env::var("ONNX_POOL_SIZE").ok().and_then(|s| s.parse().ok()),
            tool: ToolConfig::from_env()?,
        })
    }
}
