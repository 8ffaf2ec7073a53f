//! Embedding providers and the client the pipelines talk to.
//!
//! [`EmbeddingProvider`] is the seam to whatever turns text into vectors.
//! [`EmbeddingClient`] binds a provider to the configured model and
//! dimensionality and enforces the length contract on every call.

pub mod bi_encoder;
pub mod openai;

pub use bi_encoder::BiEncoderProvider;
pub use openai::OpenAiEmbeddingProvider;

use crate::config::ToolConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Something that turns text into a dense vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one piece of text with the given model at the given dimensionality.
    async fn embed(&self, text: &str, model: &str, dimensions: usize) -> Result<Vec<f32>>;

    /// Short identifier used in logs.
    fn provider_name(&self) -> &str;
}

/// Collapse newlines to spaces; providers treat literal newlines as signal.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", " ").replace('\n', " ")
}

/// Provider bound to one model and dimensionality.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
    dimensions: usize,
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            dimensions,
        }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &ToolConfig) -> Self {
        Self::new(provider, config.embedding_model.clone(), config.embedding_dimensions)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Embed `text`, returning a vector of exactly [`dimensions`](Self::dimensions) values.
    ///
    /// # Errors
    /// `AppError::EmbeddingError` if the provider fails or returns a vector of
    /// the wrong length.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let normalized = normalize_text(text);
        let start = std::time::Instant::now();

        let vector = self
            .provider
            .embed(&normalized, &self.model, self.dimensions)
            .await
            .map_err(|e| match e {
                AppError::EmbeddingError(_) => e,
                other => AppError::EmbeddingError(other.to_string()),
            })?;

        if vector.len() != self.dimensions {
            return Err(AppError::EmbeddingError(format!(
                "{} returned {} dimensions, expected {}",
                self.provider.provider_name(),
                vector.len(),
                self.dimensions
            )));
        }

        tracing::debug!(
            provider = self.provider.provider_name(),
            model = %self.model,
            dimensions = self.dimensions,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Text embedded"
        );

        Ok(vector)
    }
}
