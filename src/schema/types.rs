//! Type definitions for declared functions and the descriptors derived from them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use indexmap::IndexMap;

/// How a parameter binds arguments.
///
/// Variadic kinds have no fixed JSON-Schema shape and never reach a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    #[default]
    PositionalOrKeyword,
    KeywordOnly,
    /// `*args`-style catch-all.
    VarPositional,
    /// `**kwargs`-style catch-all.
    VarKeyword,
}

impl ParamKind {
    pub fn is_variadic(self) -> bool {
        matches!(self, ParamKind::VarPositional | ParamKind::VarKeyword)
    }
}

/// One declared parameter of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,

    #[serde(default)]
    pub kind: ParamKind,

    /// Type annotation as written, e.g. `"int"`, `"f64"`, `"bool"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,

    /// Default value. An explicit `null` is still a default.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::default(),
            annotation: None,
            default: None,
            description: None,
        }
    }

    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn var_positional(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(ParamKind::VarPositional)
    }

    pub fn var_keyword(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(ParamKind::VarKeyword)
    }
}

/// Declarative signature of a callable to be registered as a tool.
///
/// Stands in for runtime reflection: the caller states the name, docstring
/// and parameters explicitly, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,

    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docstring: None,
            params: Vec::new(),
        }
    }

    pub fn doc(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }
}

/// JSON type a parameter is exposed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub json_type: JsonType,
    pub description: String,
}

/// Marker serialised as `"object"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    #[default]
    Object,
}

/// Closed object schema describing a tool's arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default)]
    pub schema_type: ObjectType,
    /// Parameters in declaration order.
    pub properties: IndexMap<String, PropertySchema>,
    /// Parameters without a default, in declaration order.
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: ObjectType::Object,
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }
}

/// Schema-only view of a tool: everything but the embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Primary key in the backing collection.
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

/// Persisted form of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    #[serde(flatten)]
    pub descriptor: ToolDescriptor,
    pub embedding: Vec<f32>,
}

impl ToolRecord {
    pub fn new(descriptor: ToolDescriptor, embedding: Vec<f32>) -> Self {
        Self {
            descriptor,
            embedding,
        }
    }
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
