//! OpenAPI schema subset → typed tree
//!
//! Resolves in-document `$ref`s and parses the loosely-typed schema
//! JSON into a tagged [`SchemaNode`] the rest of the crate can
//! pattern-match, plus example building and form-field expansion.

use serde_json::{Map, Value};

use crate::collection::BodyField;

/// Recursion cap for `$ref` chains and nested schemas. Past the cap a
/// placeholder empty node is produced instead of recursing further.
const MAX_DEPTH: usize = 8;

/// Follow `$ref` pointers within the same document.
///
/// Unresolvable or over-deep references return the value unchanged.
pub fn resolve_ref<'a>(doc: &'a Value, value: &'a Value, depth: usize) -> &'a Value {
    if depth > MAX_DEPTH {
        return value;
    }
    if let Some(ref_path) = value.get("$ref").and_then(|v| v.as_str()) {
        if let Some(target) = doc.pointer(ref_path.trim_start_matches('#')) {
            return resolve_ref(doc, target, depth + 1);
        }
    }
    value
}

/// A parsed schema with its shape and example-bearing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub description: Option<String>,
    pub example: Option<Value>,
    pub default: Option<Value>,
    pub enum_values: Vec<Value>,
    pub shape: SchemaShape,
}

/// The structural part of a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaShape {
    Scalar(ScalarKind),
    Object {
        /// Declaration order preserved
        properties: Vec<(String, SchemaNode)>,
        required: Vec<String>,
    },
    Array {
        items: Option<Box<SchemaNode>>,
    },
    /// oneOf / anyOf / allOf
    Composite {
        variants: Vec<SchemaNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarKind {
    String { format: Option<String> },
    Integer,
    Number,
    Boolean,
    /// Untyped or unrecognized schema
    Unknown,
}

impl SchemaNode {
    /// Parse a schema value, resolving `$ref`s against `doc`.
    pub fn parse(doc: &Value, schema: &Value) -> Self {
        Self::parse_at(doc, schema, 0)
    }

    fn parse_at(doc: &Value, schema: &Value, depth: usize) -> Self {
        if depth > MAX_DEPTH {
            return Self::placeholder();
        }
        let resolved = resolve_ref(doc, schema, 0);

        let description = resolved
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let example = non_null(resolved.get("example"));
        let default = non_null(resolved.get("default"));
        let enum_values = resolved
            .get("enum")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let shape = Self::parse_shape(doc, resolved, depth);

        Self {
            description,
            example,
            default,
            enum_values,
            shape,
        }
    }

    fn parse_shape(doc: &Value, resolved: &Value, depth: usize) -> SchemaShape {
        for combinator in ["oneOf", "anyOf", "allOf"] {
            if let Some(variants) = resolved.get(combinator).and_then(|v| v.as_array()) {
                return SchemaShape::Composite {
                    variants: variants
                        .iter()
                        .map(|v| Self::parse_at(doc, v, depth + 1))
                        .collect(),
                };
            }
        }

        let schema_type = resolved.get("type").and_then(|v| v.as_str());
        if schema_type == Some("object") || resolved.get("properties").is_some() {
            let required = resolved
                .get("required")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            let properties = resolved
                .get("properties")
                .and_then(|v| v.as_object())
                .map(|props| {
                    props
                        .iter()
                        .map(|(name, prop)| (name.clone(), Self::parse_at(doc, prop, depth + 1)))
                        .collect()
                })
                .unwrap_or_default();
            return SchemaShape::Object {
                properties,
                required,
            };
        }

        match schema_type {
            Some("array") => SchemaShape::Array {
                items: resolved
                    .get("items")
                    .map(|items| Box::new(Self::parse_at(doc, items, depth + 1))),
            },
            Some("string") => SchemaShape::Scalar(ScalarKind::String {
                format: resolved
                    .get("format")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            }),
            Some("integer") => SchemaShape::Scalar(ScalarKind::Integer),
            Some("number") => SchemaShape::Scalar(ScalarKind::Number),
            Some("boolean") => SchemaShape::Scalar(ScalarKind::Boolean),
            _ => SchemaShape::Scalar(ScalarKind::Unknown),
        }
    }

    /// Empty node emitted past the recursion cap.
    fn placeholder() -> Self {
        Self {
            description: None,
            example: None,
            default: None,
            enum_values: Vec::new(),
            shape: SchemaShape::Scalar(ScalarKind::Unknown),
        }
    }

    /// Build an example value.
    ///
    /// Priority: explicit `example`, then `default`, then the first
    /// `enum` entry, then a type-appropriate zero value. Objects
    /// recurse per property, arrays produce a single-element array.
    /// `None` only when the schema gives no type to zero out.
    pub fn example_value(&self) -> Option<Value> {
        if let Some(example) = &self.example {
            return Some(example.clone());
        }
        if let Some(default) = &self.default {
            return Some(default.clone());
        }
        if let Some(first) = self.enum_values.first() {
            return Some(first.clone());
        }
        match &self.shape {
            SchemaShape::Object { properties, .. } => {
                let mut obj = Map::new();
                for (name, prop) in properties {
                    if let Some(value) = prop.example_value() {
                        obj.insert(name.clone(), value);
                    }
                }
                Some(Value::Object(obj))
            }
            SchemaShape::Array { items } => {
                match items.as_deref().and_then(|items| items.example_value()) {
                    Some(item) => Some(Value::Array(vec![item])),
                    None => Some(Value::Array(Vec::new())),
                }
            }
            SchemaShape::Composite { variants } => {
                variants.iter().find_map(|variant| variant.example_value())
            }
            SchemaShape::Scalar(ScalarKind::String { .. }) => Some(Value::from("")),
            SchemaShape::Scalar(ScalarKind::Integer) => Some(Value::from(0)),
            SchemaShape::Scalar(ScalarKind::Number) => Some(Value::from(0.0)),
            SchemaShape::Scalar(ScalarKind::Boolean) => Some(Value::from(false)),
            SchemaShape::Scalar(ScalarKind::Unknown) => None,
        }
    }

    /// Declared example only: explicit `example`, `default`, or the
    /// first `enum` entry. No zero-value fallback, so absent data
    /// leaves a form field blank instead of pre-filling `0`/`""`.
    pub fn declared_example(&self) -> Option<Value> {
        self.example
            .clone()
            .or_else(|| self.default.clone())
            .or_else(|| self.enum_values.first().cloned())
    }

    /// Whether this schema is a binary string (file upload).
    pub fn is_binary(&self) -> bool {
        matches!(
            &self.shape,
            SchemaShape::Scalar(ScalarKind::String { format: Some(f) })
                if f == "binary" || f == "base64"
        )
    }

    /// Whether this schema requires the named property.
    pub fn requires(&self, name: &str) -> bool {
        match &self.shape {
            SchemaShape::Object { required, .. } => required.iter().any(|r| r == name),
            _ => false,
        }
    }

    /// Flatten one level of an object schema into form fields.
    ///
    /// Files are `string`+`binary`/`base64` properties, or arrays of
    /// such (which also set `is_array`). Nested object properties
    /// become a single field whose value the caller supplies as a
    /// JSON string; their structure is not descended into.
    pub fn expand_to_fields(&self) -> Vec<BodyField> {
        let SchemaShape::Object { properties, .. } = &self.shape else {
            return Vec::new();
        };
        properties
            .iter()
            .map(|(name, prop)| {
                let mut is_file = prop.is_binary();
                let mut is_array = false;
                if let SchemaShape::Array { items } = &prop.shape {
                    is_array = true;
                    if items.as_deref().is_some_and(SchemaNode::is_binary) {
                        is_file = true;
                    }
                }
                BodyField {
                    name: name.clone(),
                    required: self.requires(name),
                    is_file,
                    is_array,
                    description: prop.description.clone(),
                }
            })
            .collect()
    }
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}
