//! Toolbox - semantic tool registry and retrieval service
//!
//! Registers declared functions as tools (schema + embedding) in a vector
//! store and finds the most relevant ones for a natural language query. The
//! library is what the HTTP service is built from, and what integration tests
//! drive directly.

pub mod config;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod retriever;
pub mod schema;
pub mod server;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export key types for convenience
pub use config::{Config, ToolConfig};
pub use embedding::{EmbeddingClient, EmbeddingProvider};
pub use error::{AppError, Result, StoreError};
pub use handlers::{health_handler, ready_handler, register_handler, search_handler};
pub use registry::{load_function_specs, ToolRegistry};
pub use retriever::{SearchResult, ToolRetriever, DEFAULT_TOOL_LIMIT};
pub use schema::{FunctionSpec, ParamKind, ParamSpec, ToolDescriptor};
pub use state::AppState;
pub use store::{connect_store, LocalStore, ToolStore};
