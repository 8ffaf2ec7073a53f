//! Signature-to-schema extraction.
//!
//! Turns a declared [`FunctionSpec`] into the closed JSON-Schema descriptor
//! that function-calling models consume. The type mapping is
//! coarse: numbers, booleans, and strings for everything else.

use crate::error::{AppError, Result};
use crate::schema::types::{
    FunctionSpec, JsonType, ParamSpec, ParameterSchema, PropertySchema, ToolDescriptor,
};
use std::collections::HashSet;

const NUMBER_ANNOTATIONS: &[&str] = &[
    "int", "float", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64",
    "u128", "usize", "f32", "f64",
];

const BOOLEAN_ANNOTATIONS: &[&str] = &["bool"];

/// Build the tool descriptor for a declared function.
///
/// # Errors
/// Returns `AppError::SchemaError` if the docstring is missing or blank, if
/// the function or a parameter has an invalid name, or if a parameter name
/// is declared twice.
pub fn extract_descriptor(spec: &FunctionSpec) -> Result<ToolDescriptor> {
    if !is_identifier(&spec.name) {
        return Err(AppError::SchemaError(format!(
            "'{}' is not a valid tool name",
            spec.name
        )));
    }

    let description = spec
        .docstring
        .as_deref()
        .map(clean_docstring)
        .filter(|doc| !doc.is_empty())
        .ok_or_else(|| {
            AppError::SchemaError(format!(
                "Docstring is missing for tool '{}'. Please provide a docstring for the function.",
                spec.name
            ))
        })?;

    let mut parameters = ParameterSchema::default();
    let mut seen = HashSet::with_capacity(spec.params.len());

    for param in &spec.params {
        if !is_identifier(&param.name) {
            return Err(AppError::SchemaError(format!(
                "Tool '{}' has an invalid parameter name '{}'",
                spec.name, param.name
            )));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(AppError::SchemaError(format!(
                "Tool '{}' declares parameter '{}' more than once",
                spec.name, param.name
            )));
        }

        if param.kind.is_variadic() {
            continue;
        }

        parameters
            .properties
            .insert(param.name.clone(), property_for(param));

        if param.default.is_none() {
            parameters.required.push(param.name.clone());
        }
    }

    tracing::debug!(
        tool = %spec.name,
        properties = parameters.properties.len(),
        required = parameters.required.len(),
        "Extracted tool descriptor"
    );

    Ok(ToolDescriptor {
        name: spec.name.clone(),
        description,
        parameters,
    })
}

/// Map a type annotation to the JSON type exposed to callers.
pub fn json_type_for(annotation: Option<&str>) -> JsonType {
    match annotation.map(str::trim) {
        Some(a) if NUMBER_ANNOTATIONS.contains(&a) => JsonType::Number,
        Some(a) if BOOLEAN_ANNOTATIONS.contains(&a) => JsonType::Boolean,
        _ => JsonType::String,
    }
}

fn property_for(param: &ParamSpec) -> PropertySchema {
    let description = param
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Parameter {}", param.name));

    PropertySchema {
        json_type: json_type_for(param.annotation.as_deref()),
        description,
    }
}

/// Normalise docstring indentation.
///
/// The first line is stripped on its own; the smallest indentation shared by
/// the remaining non-blank lines is removed from each of them. Leading and
/// trailing blank lines are dropped.
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let mut lines = expanded.lines();

    let first = lines.next().unwrap_or("").trim().to_string();
    let rest: Vec<&str> = lines.collect();

    let margin = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| indent_width(line))
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(rest.len() + 1);
    cleaned.push(first);
    for line in rest {
        cleaned.push(strip_indent(line.trim_end(), margin).to_string());
    }

    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }

    cleaned.join("\n").trim().to_string()
}

/// Leading whitespace, in characters.
fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Drop up to `margin` leading whitespace characters.
fn strip_indent(line: &str, margin: usize) -> &str {
    let start = line
        .char_indices()
        .take_while(|(_, c)| c.is_whitespace())
        .take(margin)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    &line[start..]
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::ParamSpec;
    use serde_json::json;

    fn add_spec() -> FunctionSpec {
        FunctionSpec::new("add")
            .doc("Add two integers.")
            .param(ParamSpec::new("a").annotated("int"))
            .param(ParamSpec::new("b").annotated("int"))
    }

    #[test]
    fn test_add_maps_ints_to_required_numbers() {
        let descriptor = extract_descriptor(&add_spec()).unwrap();

        assert_eq!(descriptor.name, "add");
        assert_eq!(descriptor.description, "Add two integers.");
        assert_eq!(descriptor.parameters.properties["a"].json_type, JsonType::Number);
        assert_eq!(descriptor.parameters.properties["b"].json_type, JsonType::Number);
        assert_eq!(descriptor.parameters.required, vec!["a", "b"]);
        assert!(!descriptor.parameters.additional_properties);
    }

    #[test]
    fn test_defaulted_param_is_optional() {
        let spec = FunctionSpec::new("greet")
            .doc("Greet someone.")
            .param(ParamSpec::new("name").annotated("str").with_default("world"));

        let descriptor = extract_descriptor(&spec).unwrap();

        assert!(descriptor.parameters.required.is_empty());
        assert_eq!(
            descriptor.parameters.properties["name"].json_type,
            JsonType::String
        );
        assert_eq!(
            descriptor.parameters.properties["name"].description,
            "Parameter name"
        );
    }

    #[test]
    fn test_null_default_still_optional() {
        let spec = FunctionSpec::new("fetch")
            .doc("Fetch a page.")
            .param(ParamSpec::new("url"))
            .param(ParamSpec::new("timeout").annotated("float").with_default(json!(null)));

        let descriptor = extract_descriptor(&spec).unwrap();
        assert_eq!(descriptor.parameters.required, vec!["url"]);
    }

    #[test]
    fn test_missing_docstring_is_schema_error() {
        let spec = FunctionSpec::new("undocumented").param(ParamSpec::new("x"));
        let err = extract_descriptor(&spec).unwrap_err();

        assert!(matches!(err, AppError::SchemaError(_)));
        assert!(err.to_string().contains("undocumented"));
    }

    #[test]
    fn test_blank_docstring_is_schema_error() {
        let spec = FunctionSpec::new("blank").doc("   \n\t  \n");
        assert!(matches!(
            extract_descriptor(&spec),
            Err(AppError::SchemaError(_))
        ));
    }

    #[test]
    fn test_variadic_params_are_excluded() {
        let spec = FunctionSpec::new("log_event")
            .doc("Log an event.")
            .param(ParamSpec::new("message"))
            .param(ParamSpec::var_positional("args"))
            .param(ParamSpec::new("level").with_default("info"))
            .param(ParamSpec::var_keyword("kwargs"));

        let descriptor = extract_descriptor(&spec).unwrap();
        let names: Vec<&str> = descriptor
            .parameters
            .properties
            .keys()
            .map(String::as_str)
            .collect();

        assert_eq!(names, vec!["level", "message"]);
        assert_eq!(descriptor.parameters.required, vec!["message"]);
    }

    #[test]
    fn test_type_mapping() {
        assert_eq!(json_type_for(Some("int")), JsonType::Number);
        assert_eq!(json_type_for(Some("float")), JsonType::Number);
        assert_eq!(json_type_for(Some(" u64 ")), JsonType::Number);
        assert_eq!(json_type_for(Some("f32")), JsonType::Number);
        assert_eq!(json_type_for(Some("bool")), JsonType::Boolean);
        assert_eq!(json_type_for(Some("list[int]")), JsonType::String);
        assert_eq!(json_type_for(Some("Optional[int]")), JsonType::String);
        assert_eq!(json_type_for(None), JsonType::String);
    }

    #[test]
    fn test_required_follows_declaration_order() {
        let spec = FunctionSpec::new("move_file")
            .doc("Move a file.")
            .param(ParamSpec::new("source"))
            .param(ParamSpec::new("overwrite").annotated("bool").with_default(false))
            .param(ParamSpec::new("destination"));

        let descriptor = extract_descriptor(&spec).unwrap();
        assert_eq!(descriptor.parameters.required, vec!["source", "destination"]);
    }

    #[test]
    fn test_properties_keep_declaration_order() {
        let spec = FunctionSpec::new("convert")
            .doc("Convert a temperature.")
            .param(ParamSpec::new("value").annotated("float"))
            .param(ParamSpec::new("unit").annotated("str"))
            .param(ParamSpec::new("as_kelvin").annotated("bool").with_default(false));

        let descriptor = extract_descriptor(&spec).unwrap();
        let names: Vec<&str> = descriptor
            .parameters
            .properties
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(names, vec!["value", "unit", "as_kelvin"]);

        let value = serde_json::to_value(&descriptor).unwrap();
        let serialized: Vec<&String> = value["parameters"]["properties"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(serialized, vec!["value", "unit", "as_kelvin"]);
    }

    #[test]
    fn test_param_description_overrides_placeholder() {
        let spec = FunctionSpec::new("search_web")
            .doc("Search the web.")
            .param(ParamSpec::new("query").described("  Terms to search for "));

        let descriptor = extract_descriptor(&spec).unwrap();
        assert_eq!(
            descriptor.parameters.properties["query"].description,
            "Terms to search for"
        );
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let spec = FunctionSpec::new("dup")
            .doc("Duplicate params.")
            .param(ParamSpec::new("x"))
            .param(ParamSpec::new("x"));

        let err = extract_descriptor(&spec).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let spec = FunctionSpec::new("bad name").doc("Has a space.");
        assert!(extract_descriptor(&spec).is_err());

        let spec = FunctionSpec::new("ok")
            .doc("Bad param.")
            .param(ParamSpec::new("1st"));
        assert!(extract_descriptor(&spec).is_err());
    }

    #[test]
    fn test_clean_docstring_dedents() {
        let raw = "\n    Convert a temperature.\n\n        Args:\n            value: degrees\n    ";
        assert_eq!(
            clean_docstring(raw),
            "Convert a temperature.\n\n    Args:\n        value: degrees"
        );
    }

    #[test]
    fn test_clean_docstring_unicode_indent() {
        assert_eq!(
            clean_docstring("Look up a word.\n x\n\u{3000}y"),
            "Look up a word.\nx\ny"
        );
        assert_eq!(
            clean_docstring("Pad text.\n\u{a0}\u{a0}first\n\u{a0}\u{a0}\u{a0}second"),
            "Pad text.\nfirst\n\u{a0}second"
        );
    }

    #[test]
    fn test_unicode_indented_docstring_extracts() {
        let spec = FunctionSpec::new("lookup")
            .doc("Look up a word.\n\u{3000}\u{3000}Returns its definition.")
            .param(ParamSpec::new("word").annotated("str"));

        let descriptor = extract_descriptor(&spec).unwrap();
        assert_eq!(
            descriptor.description,
            "Look up a word.\nReturns its definition."
        );
    }

    #[test]
    fn test_clean_docstring_single_line() {
        assert_eq!(clean_docstring("  Add two integers.  "), "Add two integers.");
    }
}
