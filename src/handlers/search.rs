//! Semantic tool search.

use crate::error::{AppError, Result};
use crate::retriever::{SearchResult, DEFAULT_TOOL_LIMIT};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_limit() -> usize {
    DEFAULT_TOOL_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// Natural language description of the task.
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub tools: Vec<SearchResult>,
}

/// POST /search - Find the tools closest to a natural language query.
///
/// Results are in function-calling envelope form and can be passed to a
/// model as-is.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start_time = std::time::Instant::now();

    if request.query.trim().is_empty() {
        return Err(AppError::ValidationError(
            "Query cannot be empty".to_string(),
        ));
    }

    metrics::counter!("tool_search_requests_total").increment(1);

    let tools = state
        .retriever
        .search(&request.query, request.limit)
        .await?;

    metrics::histogram!("tool_search_latency_ms").record(start_time.elapsed().as_millis() as f64);

    Ok(Json(SearchResponse { tools }))
}
