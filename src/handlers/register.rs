use crate::error::Result;
use crate::schema::{FunctionSpec, ToolDescriptor};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

/// POST /tools - Register a declared function as a tool.
///
/// Re-registering an existing name replaces its record. Responds with the
/// descriptor as stored, minus the embedding.
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<FunctionSpec>,
) -> Result<(StatusCode, Json<ToolDescriptor>)> {
    let descriptor = state.registry.register(&spec).await?;

    metrics::counter!("tool_registrations_total").increment(1);

    Ok((StatusCode::CREATED, Json(descriptor)))
}
