use crate::config::{Config, EmbeddingBackend};
use crate::embedding::{BiEncoderProvider, EmbeddingProvider, OpenAiEmbeddingProvider};
use crate::error::{AppError, Result};
use crate::registry::{load_function_specs, ToolRegistry};
use crate::retriever::ToolRetriever;
use crate::store::connect_store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all request handlers.
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub retriever: Arc<ToolRetriever>,
    /// Set once the store is bootstrapped and startup tools are registered.
    pub ready: AtomicBool,
}

impl AppState {
    /// Build the provider, store, registry and retriever described by `config`,
    /// then register the tools in `TOOLS_PATH` if set.
    pub async fn new(config: Config) -> Result<Self> {
        let provider = build_provider(&config)?;
        let store = connect_store(&config.tool)?;

        let registry =
            ToolRegistry::new(config.tool.clone(), provider.clone(), store.clone()).await?;
        let retriever = ToolRetriever::new(config.tool.clone(), provider, store);

        let state = Self::from_parts(registry, retriever);

        if let Some(path) = &config.tools_path {
            let specs = load_function_specs(path)?;
            let registered = state.registry.register_all(&specs).await?;
            tracing::info!(
                path = %path.display(),
                tools = registered.len(),
                "Startup tools registered"
            );
        }

        state.ready.store(true, Ordering::SeqCst);
        Ok(state)
    }

    /// Wrap already-built components. The state starts not ready.
    pub fn from_parts(registry: ToolRegistry, retriever: ToolRetriever) -> Self {
        Self {
            registry: Arc::new(registry),
            retriever: Arc::new(retriever),
            ready: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Check if the service is ready to handle requests.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

fn build_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding_backend {
        EmbeddingBackend::OpenAi => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                AppError::ConfigurationError("OPENAI_API_KEY is not set".to_string())
            })?;
            let provider = OpenAiEmbeddingProvider::new(
                api_key,
                config.openai_base_url.clone(),
                Duration::from_secs(config.embedding_timeout_secs),
            )?;
            tracing::info!(base_url = provider.base_url(), "Using OpenAI embeddings");
            Ok(Arc::new(provider))
        }
        EmbeddingBackend::Onnx => {
            let pool_size = config.onnx_pool_size.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            });
            tracing::info!(pool_size, "Loading bi-encoder session pool");

            let provider = BiEncoderProvider::load(
                &config.bi_encoder_model_path,
                &config.bi_encoder_tokenizer_path,
                config.max_sequence_length,
                pool_size,
            )?;
            Ok(Arc::new(provider))
        }
    }
}
