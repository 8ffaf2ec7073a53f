//! Schema extraction for declared functions.
//!
//! This module turns a function's declared signature and docstring into the
//! closed JSON-Schema descriptor stored alongside its embedding.

pub mod extractor;
pub mod types;

pub use extractor::{clean_docstring, extract_descriptor, json_type_for};
pub use types::{
    FunctionSpec, JsonType, ParamKind, ParamSpec, ParameterSchema, PropertySchema,
    ToolDescriptor, ToolRecord,
};
