//! Local bi-encoder embeddings through ONNX Runtime.
//!
//! Encodes text with a BERT-style model (e.g. BAAI/bge-base-en-v1.5) using
//! mean pooling over the attention mask followed by L2 normalisation, so
//! cosine similarity over the output equals a dot product.

use crate::embedding::EmbeddingProvider;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use crossbeam::queue::ArrayQueue;
use ndarray::Array2;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::Semaphore;

/// Pool of ONNX sessions sharing one tokenizer.
///
/// `Session::run` needs `&mut self`; the queue hands each index to at most
/// one caller at a time, so the per-session mutex is never contended.
struct SessionPool {
    sessions: Vec<Mutex<Session>>,
    available: ArrayQueue<usize>,
    tokenizer: Tokenizer,
    max_length: usize,
}

impl SessionPool {
    fn acquire(&self) -> Result<usize> {
        self.available
            .pop()
            .ok_or_else(|| AppError::EmbeddingError("No available ONNX sessions in pool".into()))
    }

    fn release(&self, index: usize) {
        // Only indices handed out by acquire() come back, so the queue has room.
        let _ = self.available.push(index);
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let session_idx = self.acquire()?;
        let result = self.encode_with_session(session_idx, text);
        self.release(session_idx);
        result
    }

    fn encode_with_session(&self, session_idx: usize, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| AppError::EmbeddingError(format!("Tokenization failed: {}", e)))?;

        let ids = encoding.get_ids();
        let mask = encoding.get_attention_mask();
        let seq_len = ids.len().min(self.max_length).max(1);

        let mut input_ids = Array2::<i64>::zeros((1, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((1, seq_len));
        for j in 0..ids.len().min(seq_len) {
            input_ids[[0, j]] = ids[j] as i64;
            attention_mask[[0, j]] = mask[j] as i64;
        }

        let shape = [1, seq_len];
        let ids_vec: Vec<i64> = input_ids.iter().copied().collect();
        let mask_vec: Vec<i64> = attention_mask.iter().copied().collect();
        let input_ids_tensor = Tensor::from_array((shape, ids_vec))?;
        let attention_mask_tensor = Tensor::from_array((shape, mask_vec.clone()))?;
        let token_type_ids_tensor = Tensor::from_array((shape, vec![0i64; seq_len]))?;

        let mut session = self.sessions[session_idx].lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| AppError::EmbeddingError(format!("Bi-encoder inference failed: {}", e)))?;

        // (batch, seq_len, hidden_size)
        let hidden_state = outputs.get("last_hidden_state").ok_or_else(|| {
            AppError::EmbeddingError("No 'last_hidden_state' output found".to_string())
        })?;
        let (shape_info, data) = hidden_state.try_extract_tensor::<f32>()?;
        let hidden_size = shape_info[2] as usize;

        Ok(mean_pool(data, &mask_vec, hidden_size))
    }
}

/// Average token vectors under the attention mask, then L2-normalise.
fn mean_pool(hidden: &[f32], mask: &[i64], hidden_size: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for (j, &m) in mask.iter().enumerate() {
        if m == 1 {
            let base = j * hidden_size;
            for (k, value) in pooled.iter_mut().enumerate() {
                *value += hidden[base + k];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for value in pooled.iter_mut() {
            *value /= count;
        }
    }

    let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in pooled.iter_mut() {
            *value /= norm;
        }
    }

    pooled
}

/// Embedding provider backed by a local ONNX bi-encoder.
///
/// The model fixes the output size; requests for any other dimensionality
/// fail instead of being padded or truncated.
pub struct BiEncoderProvider {
    pool: Arc<SessionPool>,
    permits: Arc<Semaphore>,
    embedding_dim: usize,
}

impl BiEncoderProvider {
    /// Load `pool_size` sessions of the model and its tokenizer.
    ///
    /// Runs one warmup encode to discover the model's hidden size.
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_length: usize,
        pool_size: usize,
    ) -> Result<Self> {
        let pool_size = pool_size.max(1);

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            AppError::ConfigurationError(format!("Failed to load bi-encoder tokenizer: {}", e))
        })?;

        let model_bytes = std::fs::read(model_path).map_err(|e| {
            AppError::ConfigurationError(format!("Failed to read bi-encoder model: {}", e))
        })?;

        let mut sessions = Vec::with_capacity(pool_size);
        let available = ArrayQueue::new(pool_size);

        for i in 0..pool_size {
            let session = Session::builder()
                .map_err(|e| AppError::ConfigurationError(e.to_string()))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| AppError::ConfigurationError(e.to_string()))?
                .with_intra_threads(1)
                .map_err(|e| AppError::ConfigurationError(e.to_string()))?
                .commit_from_memory(&model_bytes)
                .map_err(|e| {
                    AppError::ConfigurationError(format!("Failed to load bi-encoder model: {}", e))
                })?;

            sessions.push(Mutex::new(session));
            available.push(i).map_err(|_| {
                AppError::ConfigurationError("Failed to initialize session pool".into())
            })?;
        }

        let pool = Arc::new(SessionPool {
            sessions,
            available,
            tokenizer,
            max_length,
        });

        let embedding_dim = pool.encode("warmup query")?.len();

        tracing::info!(
            model = %model_path.display(),
            tokenizer = %tokenizer_path.display(),
            max_length,
            pool_size,
            embedding_dim,
            "Bi-encoder model loaded"
        );

        Ok(Self {
            pool,
            permits: Arc::new(Semaphore::new(pool_size)),
            embedding_dim,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

#[async_trait]
impl EmbeddingProvider for BiEncoderProvider {
    async fn embed(&self, text: &str, _model: &str, dimensions: usize) -> Result<Vec<f32>> {
        if dimensions != self.embedding_dim {
            return Err(AppError::EmbeddingError(format!(
                "bi-encoder produces {} dimensions, {} requested",
                self.embedding_dim, dimensions
            )));
        }

        // A permit guarantees a free session index once inside the blocking task.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::EmbeddingError("Session pool closed".to_string()))?;

        let pool = Arc::clone(&self.pool);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || pool.encode(&text))
            .await
            .map_err(|e| AppError::EmbeddingError(format!("Embedding task join error: {}", e)))?
    }

    fn provider_name(&self) -> &str {
        "onnx-bi-encoder"
    }
}
