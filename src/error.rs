use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures reported by a [`ToolStore`](crate::store::ToolStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Index '{index}' already exists on collection '{collection}'")]
    IndexExists { collection: String, index: String },

    #[error("Index '{index}' not found on collection '{collection}'")]
    IndexNotFound { collection: String, index: String },

    #[error("Vector field '{path}' expects {expected} dimensions, got {actual}")]
    DimensionMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store backend failure: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum AppError {
    #[error("Invalid tool schema: {0}")]
    SchemaError(String),

    #[error("Embedding request failed: {0}")]
    EmbeddingError(String),

    #[error("Failed to register '{tool}': {source}")]
    RegistrationError {
        tool: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Tool search failed for query '{query}': {source}")]
    RetrievalError {
        query: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Store(StoreError),
}

impl AppError {
    /// Attach the tool name to a failure raised while registering it.
    ///
    /// Schema errors pass through unchanged; nothing was attempted.
    pub fn registration(tool: impl Into<String>, err: AppError) -> Self {
        match err {
            AppError::SchemaError(_) | AppError::RegistrationError { .. } => err,
            other => AppError::RegistrationError {
                tool: tool.into(),
                source: Box::new(other),
            },
        }
    }

    /// Attach the query text to a failure raised while searching.
    pub fn retrieval(query: impl Into<String>, err: AppError) -> Self {
        match err {
            AppError::RetrievalError { .. } => err,
            other => AppError::RetrievalError {
                query: query.into(),
                source: Box::new(other),
            },
        }
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::SchemaError(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::EmbeddingError(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(StoreError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RegistrationError { source, .. } | AppError::RetrievalError { source, .. } => {
                match source.status_code() {
                    StatusCode::BAD_REQUEST => StatusCode::BAD_REQUEST,
                    StatusCode::BAD_GATEWAY => StatusCode::BAD_GATEWAY,
                    StatusCode::SERVICE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
            AppError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DimensionMismatch { .. } => AppError::ConfigurationError(err.to_string()),
            other => AppError::Store(other),
        }
    }
}

impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        AppError::EmbeddingError(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() || status == StatusCode::BAD_GATEWAY {
            tracing::error!(error = %message, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %message, status = status.as_u16(), "Request rejected");
        }

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
