//! OpenAPI document → `Collection`
//!
//! Consumes a raw JSON or YAML document and produces the normalized
//! collection model: endpoints grouped by tag, parameters merged and
//! expanded, body shape and response schemas extracted.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::collection::{
    BodyField, Collection, Endpoint, ParamLocation, Parameter, ResponseSchema, StatusPattern,
};
use crate::error::{FetchError, ImportError, ParseError};
use crate::executor::{DocumentFetcher, FetchOutcome};
use crate::schema::{resolve_ref, SchemaNode, SchemaShape};

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Methods for which a request body is derived.
const BODY_METHODS: [&str; 4] = ["post", "put", "patch", "delete"];

const MEDIA_JSON: &str = "application/json";
const MEDIA_MULTIPART: &str = "multipart/form-data";
const MEDIA_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Normalize a raw OpenAPI 3.x document into a [`Collection`].
///
/// Accepts JSON or YAML. Fails only when the text parses as neither,
/// or when the document has no `paths` object; absent optional fields
/// yield empty values, never errors.
pub fn normalize(text: &str, source_url: &str) -> Result<Collection, ParseError> {
    let doc = parse_document(text)?;
    let paths = doc
        .get("paths")
        .and_then(|p| p.as_object())
        .ok_or(ParseError::MissingPaths)?;

    let base_url = doc
        .pointer("/servers/0/url")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim_end_matches('/');

    let mut groups: BTreeMap<String, Vec<Endpoint>> = BTreeMap::new();
    for (path, path_item) in paths {
        let path_item = resolve_ref(&doc, path_item, 0);
        let path_level_params = path_item.get("parameters");

        for method in METHODS {
            let Some(operation) = path_item.get(method) else {
                continue;
            };

            let endpoint = extract_endpoint(&doc, base_url, path, method, operation, path_level_params);
            let tag = operation
                .get("tags")
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|v| v.as_str())
                .unwrap_or("default")
                .to_string();
            groups.entry(tag).or_default().push(endpoint);
        }
    }

    // Stable order within each group so repeated normalizations of the
    // same bytes diff cleanly during sync.
    for endpoints in groups.values_mut() {
        endpoints.sort_by_cached_key(|e| {
            (
                e.summary.as_deref().unwrap_or("").to_lowercase(),
                e.description.as_deref().unwrap_or("").to_lowercase(),
                e.path.to_lowercase(),
            )
        });
    }

    let name = doc
        .pointer("/info/title")
        .and_then(|v| v.as_str())
        .unwrap_or(source_url)
        .to_string();

    Ok(Collection {
        name,
        source_url: source_url.to_string(),
        groups,
        sync_enabled: true,
        etag: None,
        last_updated: Utc::now(),
    })
}

/// Fetch a document and normalize it in one step.
///
/// The collection carries the ETag the server returned, ready for
/// conditional re-fetching by the sync scheduler.
pub async fn import(fetcher: &dyn DocumentFetcher, url: &str) -> Result<Collection, ImportError> {
    match fetcher.fetch(url, None).await? {
        FetchOutcome::Fetched { text, etag } => {
            let mut collection = normalize(&text, url)?;
            collection.etag = etag;
            Ok(collection)
        }
        // No etag was offered, so a 304 here is a protocol violation.
        FetchOutcome::NotModified => Err(FetchError::Status { status: 304 }.into()),
    }
}

/// Parse the document text as JSON, falling back to YAML.
fn parse_document(text: &str) -> Result<Value, ParseError> {
    let json_err = match serde_json::from_str::<Value>(text) {
        Ok(doc) => return Ok(doc),
        Err(e) => e,
    };
    match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(doc) => Ok(yaml_to_json(doc)),
        Err(yaml_err) => Err(ParseError::InvalidDocument {
            json: json_err,
            yaml: yaml_err,
        }),
    }
}

/// Convert a YAML tree into JSON, stringifying non-string mapping keys
/// (YAML parses `200:` under `responses` as an integer key).
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::Array(seq.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut obj = serde_json::Map::new();
            for (key, val) in map {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                obj.insert(key, yaml_to_json(val));
            }
            Value::Object(obj)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn extract_endpoint(
    doc: &Value,
    base_url: &str,
    path: &str,
    method: &str,
    operation: &Value,
    path_level_params: Option<&Value>,
) -> Endpoint {
    let parameters = effective_parameters(doc, path_level_params, operation.get("parameters"));
    let body = if BODY_METHODS.contains(&method) {
        derive_body(doc, operation.get("requestBody"))
    } else {
        BodyInfo::default()
    };
    let responses = derive_responses(doc, operation.get("responses"));

    Endpoint {
        method: method.to_uppercase(),
        path: format!("{base_url}{path}"),
        summary: operation
            .get("summary")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        description: operation
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        parameters,
        body_media_types: body.media_types,
        body_fields: body.fields,
        body_fields_type: body.fields_type,
        body_example: body.example,
        body_description: body.description,
        body_required: body.required,
        responses,
    }
}

/// Merge path-item-level and operation-level parameters.
///
/// Operation-level entries replace path-level entries with the same
/// `(name, location)` in place, so declaration order is preserved and
/// duplicates cannot occur. Query parameters whose schema is an object
/// (a DTO reference) are expanded into one parameter per property.
fn effective_parameters(
    doc: &Value,
    path_level: Option<&Value>,
    operation_level: Option<&Value>,
) -> Vec<Parameter> {
    let mut merged: Vec<(&Value, ParamLocation, String)> = Vec::new();

    for source in [path_level, operation_level].into_iter().flatten() {
        let Some(params) = source.as_array() else {
            continue;
        };
        for raw in params {
            let resolved = resolve_ref(doc, raw, 0);
            let Some(name) = resolved.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(location) = resolved
                .get("in")
                .and_then(|v| v.as_str())
                .and_then(ParamLocation::parse)
            else {
                continue;
            };
            match merged
                .iter_mut()
                .find(|(_, loc, n)| *loc == location && n == name)
            {
                Some(slot) => slot.0 = resolved,
                None => merged.push((resolved, location, name.to_string())),
            }
        }
    }

    let mut parameters = Vec::new();
    for (resolved, location, name) in merged {
        let required = resolved
            .get("required")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let schema = resolved
            .get("schema")
            .map(|s| SchemaNode::parse(doc, s))
            .unwrap_or_else(|| SchemaNode::parse(doc, &Value::Null));

        // DTO expansion: a query parameter backed by an object schema
        // flattens into one parameter per property.
        if location == ParamLocation::Query {
            if let SchemaShape::Object { properties, .. } = &schema.shape {
                if !properties.is_empty() {
                    debug!(param = %name, "expanding query object parameter");
                    expand_query_object(&schema, required, &mut parameters);
                    continue;
                }
            }
        }

        let description = resolved
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| schema.description.clone());

        parameters.push(Parameter {
            name,
            location,
            required,
            description,
            example: parameter_example(resolved, &schema),
            enum_values: stringify_enum(&schema),
        });
    }
    parameters
}

/// Flatten an object-typed query parameter one level.
///
/// Each property inherits the parent's `required` unless the object
/// schema declares its own `required` list. A nested object property
/// stays a single parameter whose value is supplied as a JSON string.
fn expand_query_object(schema: &SchemaNode, parent_required: bool, out: &mut Vec<Parameter>) {
    let SchemaShape::Object {
        properties,
        required,
    } = &schema.shape
    else {
        return;
    };
    for (name, prop) in properties {
        let required = if required.is_empty() {
            parent_required
        } else {
            required.iter().any(|r| r == name)
        };
        out.push(Parameter {
            name: name.clone(),
            location: ParamLocation::Query,
            required,
            description: prop.description.clone(),
            example: prop.declared_example(),
            enum_values: stringify_enum(prop),
        });
    }
}

/// Example for a parameter: the parameter's own `example`, the first
/// entry of its `examples` map, then the schema's declared example.
fn parameter_example(resolved: &Value, schema: &SchemaNode) -> Option<Value> {
    if let Some(example) = resolved.get("example").filter(|v| !v.is_null()) {
        return Some(example.clone());
    }
    if let Some(examples) = resolved.get("examples").and_then(|v| v.as_object()) {
        for entry in examples.values() {
            if let Some(value) = entry.get("value").filter(|v| !v.is_null()) {
                return Some(value.clone());
            }
        }
    }
    schema.declared_example()
}

fn stringify_enum(schema: &SchemaNode) -> Vec<String> {
    schema
        .enum_values
        .iter()
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
        .collect()
}

#[derive(Default)]
struct BodyInfo {
    media_types: Vec<String>,
    fields: Vec<BodyField>,
    fields_type: Option<String>,
    example: Option<String>,
    description: Option<String>,
    required: bool,
}

fn derive_body(doc: &Value, request_body: Option<&Value>) -> BodyInfo {
    let Some(request_body) = request_body else {
        return BodyInfo::default();
    };
    let resolved = resolve_ref(doc, request_body, 0);

    let mut info = BodyInfo {
        required: resolved
            .get("required")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        description: resolved
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        ..BodyInfo::default()
    };

    let Some(content) = resolved.get("content").and_then(|v| v.as_object()) else {
        return info;
    };
    info.media_types = content.keys().cloned().collect();

    if let Some(media) = content.get(MEDIA_JSON) {
        let schema = media.get("schema").map(|s| SchemaNode::parse(doc, s));
        info.example = media_example(media)
            .or_else(|| schema.as_ref().and_then(SchemaNode::example_value))
            .map(|v| v.to_string());
        if info.description.is_none() {
            info.description = schema.and_then(|s| s.description);
        }
    }

    // Form fields: multipart takes precedence over urlencoded when both
    // are declared, matching the media-type preference order.
    for form_type in [MEDIA_MULTIPART, MEDIA_URLENCODED] {
        if let Some(schema) = content.get(form_type).and_then(|m| m.get("schema")) {
            info.fields = SchemaNode::parse(doc, schema).expand_to_fields();
            info.fields_type = Some(form_type.to_string());
            break;
        }
    }

    info
}

/// Explicit example on a media-type object: `example`, or the first
/// entry of `examples`.
fn media_example(media: &Value) -> Option<Value> {
    if let Some(example) = media.get("example").filter(|v| !v.is_null()) {
        return Some(example.clone());
    }
    if let Some(examples) = media.get("examples").and_then(|v| v.as_object()) {
        for entry in examples.values() {
            if let Some(value) = entry.get("value").filter(|v| !v.is_null()) {
                return Some(value.clone());
            }
        }
    }
    None
}

fn derive_responses(doc: &Value, responses: Option<&Value>) -> Vec<ResponseSchema> {
    let Some(responses) = responses.and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (key, response) in responses {
        let Some(status) = StatusPattern::parse(key) else {
            debug!(key, "skipping unrecognized response status key");
            continue;
        };
        let resolved = resolve_ref(doc, response, 0);
        let description = resolved
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let first_content = resolved
            .get("content")
            .and_then(|v| v.as_object())
            .and_then(|content| content.iter().next());
        let (content_type, schema) = match first_content {
            Some((content_type, media)) => (
                Some(content_type.clone()),
                media.get("schema").cloned(),
            ),
            None => (None, None),
        };

        out.push(ResponseSchema {
            status,
            content_type,
            schema,
            description,
        });
    }
    out
}
