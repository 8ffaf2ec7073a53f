//! OpenAI-compatible embeddings over HTTP.

use crate::embedding::EmbeddingProvider;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: [&'a str; 1],
    model: &'a str,
    dimensions: usize,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedding provider speaking the OpenAI `/embeddings` protocol.
///
/// The API key is injected by the caller; nothing is read from the
/// environment here.
pub struct OpenAiEmbeddingProvider {
    api_key: String,
    base_url: String,
    timeout: Duration,
    http_client: Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(AppError::ConfigurationError(
                "OpenAI embeddings require an API key".to_string(),
            ));
        }

        let http_client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        let base_url = base_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_key,
            base_url,
            timeout,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str, model: &str, dimensions: usize) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: [text],
            model,
            dimensions,
            encoding_format: "float",
        };

        let response = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::EmbeddingError(format!("request timed out after {:?}", self.timeout))
                } else {
                    AppError::EmbeddingError(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication failed",
                StatusCode::TOO_MANY_REQUESTS => "rate limit or quota exceeded",
                s if s.is_client_error() => "request rejected",
                _ => "provider unavailable",
            };
            return Err(AppError::EmbeddingError(format!(
                "{} ({}): {}",
                reason,
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::EmbeddingError(format!("Invalid response body: {}", e)))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                AppError::EmbeddingError("Response contained no embeddings".to_string())
            })
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
