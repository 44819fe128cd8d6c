//! Endpoint + user values → wire-ready request
//!
//! Pure assembly of URL, headers and body. No I/O and no failures:
//! absent or empty values are omitted, never errors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::collection::{Endpoint, ParamLocation};

const CONTENT_TYPE: &str = "Content-Type";
const MEDIA_MULTIPART: &str = "multipart/form-data";
const MEDIA_URLENCODED: &str = "application/x-www-form-urlencoded";

/// User-supplied values for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestInput {
    /// Parameter values keyed by parameter name
    pub param_values: HashMap<String, String>,
    /// Raw body text (JSON or other non-form media)
    pub body: Option<String>,
    /// Selected body media type
    pub body_type: Option<String>,
    /// Form fields in declaration order
    pub form_values: Vec<(String, String)>,
    /// File fields with the paths picked for each
    pub file_values: Vec<MultipartFile>,
}

/// A built request, ready for the HTTP executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPayload {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    None,
    /// Raw text body, e.g. JSON
    Raw(String),
    /// Pre-encoded `application/x-www-form-urlencoded` string
    Form(String),
    /// Descriptor for the executor to stream with its own boundary
    Multipart(MultipartPayload),
}

/// Multipart descriptor: the executor streams the files and generates
/// the boundary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultipartPayload {
    pub fields: HashMap<String, String>,
    pub files: Vec<MultipartFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipartFile {
    pub name: String,
    pub paths: Vec<String>,
}

/// Build the final request for an endpoint.
///
/// Path placeholders with missing values stay literal (the caller
/// surfaces that as a validation concern). A Content-Type implied by
/// the body encoding never overrides one supplied through a header
/// parameter; multipart removes any explicit Content-Type so the
/// executor can generate the boundary.
pub fn build_payload(endpoint: &Endpoint, input: &RequestInput) -> RequestPayload {
    let mut url = endpoint.path.clone();
    let mut query = String::new();
    let mut headers: Vec<(String, String)> = Vec::new();

    for param in &endpoint.parameters {
        let value = input
            .param_values
            .get(&param.name)
            .map(String::as_str)
            .unwrap_or("");
        if value.is_empty() {
            continue;
        }
        match param.location {
            ParamLocation::Path => {
                url = url.replace(
                    &format!("{{{}}}", param.name),
                    &urlencoding::encode(value),
                );
            }
            ParamLocation::Query => {
                if !query.is_empty() {
                    query.push('&');
                }
                query.push_str(&urlencoding::encode(&param.name));
                query.push('=');
                query.push_str(&urlencoding::encode(value));
            }
            ParamLocation::Header => {
                headers.push((param.name.clone(), value.to_string()));
            }
        }
    }

    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }

    let body = build_body(&endpoint.method, input, &mut headers);

    RequestPayload {
        method: endpoint.method.clone(),
        url,
        headers,
        body,
    }
}

fn build_body(
    method: &str,
    input: &RequestInput,
    headers: &mut Vec<(String, String)>,
) -> RequestBody {
    let Some(body_type) = input.body_type.as_deref() else {
        return RequestBody::None;
    };

    match body_type {
        MEDIA_MULTIPART => {
            // The executor generates the boundary.
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_TYPE));
            let fields = input
                .form_values
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .cloned()
                .collect();
            let files = input
                .file_values
                .iter()
                .map(|file| MultipartFile {
                    name: file.name.clone(),
                    paths: file
                        .paths
                        .iter()
                        .filter(|p| !p.is_empty())
                        .cloned()
                        .collect(),
                })
                .filter(|file| !file.paths.is_empty())
                .collect();
            RequestBody::Multipart(MultipartPayload { fields, files })
        }
        MEDIA_URLENCODED => {
            let mut encoded = String::new();
            for (name, value) in &input.form_values {
                if value.is_empty() {
                    continue;
                }
                if !encoded.is_empty() {
                    encoded.push('&');
                }
                encoded.push_str(&urlencoding::encode(name));
                encoded.push('=');
                encoded.push_str(&urlencoding::encode(value));
            }
            if encoded.is_empty() {
                return RequestBody::None;
            }
            set_implicit_content_type(headers, MEDIA_URLENCODED);
            RequestBody::Form(encoded)
        }
        media_type => {
            // Raw passthrough (JSON and other text media). GET carries
            // no body.
            let text = input.body.as_deref().unwrap_or("");
            if method.eq_ignore_ascii_case("GET") || text.trim().is_empty() {
                return RequestBody::None;
            }
            set_implicit_content_type(headers, media_type);
            RequestBody::Raw(text.to_string())
        }
    }
}

/// Add a Content-Type only when no header parameter already set one.
fn set_implicit_content_type(headers: &mut Vec<(String, String)>, media_type: &str) {
    let already_set = headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE));
    if !already_set {
        headers.push((CONTENT_TYPE.to_string(), media_type.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Parameter;

    fn param(name: &str, location: ParamLocation) -> Parameter {
        Parameter {
            name: name.to_string(),
            location,
            required: false,
            description: None,
            example: None,
            enum_values: Vec::new(),
        }
    }

    fn endpoint(method: &str, path: &str, parameters: Vec<Parameter>) -> Endpoint {
        Endpoint {
            method: method.to_string(),
            path: path.to_string(),
            summary: None,
            description: None,
            parameters,
            body_media_types: Vec::new(),
            body_fields: Vec::new(),
            body_fields_type: None,
            body_example: None,
            body_description: None,
            body_required: false,
            responses: Vec::new(),
        }
    }

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn path_param_is_percent_encoded_with_no_stray_question_mark() {
        let ep = endpoint("GET", "/pets/{id}", vec![param("id", ParamLocation::Path)]);
        let input = RequestInput {
            param_values: values(&[("id", "7 ")]),
            ..RequestInput::default()
        };
        let payload = build_payload(&ep, &input);
        assert_eq!(payload.url, "/pets/7%20");
    }

    #[test]
    fn missing_path_value_leaves_placeholder_literal() {
        let ep = endpoint("GET", "/pets/{id}", vec![param("id", ParamLocation::Path)]);
        let payload = build_payload(&ep, &RequestInput::default());
        assert_eq!(payload.url, "/pets/{id}");
    }

    #[test]
    fn query_params_append_in_declaration_order_skipping_empty() {
        let ep = endpoint(
            "GET",
            "/pets",
            vec![
                param("b", ParamLocation::Query),
                param("a", ParamLocation::Query),
                param("empty", ParamLocation::Query),
            ],
        );
        let input = RequestInput {
            param_values: values(&[("b", "2"), ("a", "one two"), ("empty", "")]),
            ..RequestInput::default()
        };
        let payload = build_payload(&ep, &input);
        assert_eq!(payload.url, "/pets?b=2&a=one%20two");
    }

    #[test]
    fn header_params_copied_verbatim() {
        let ep = endpoint(
            "GET",
            "/pets",
            vec![param("X-Request-Id", ParamLocation::Header)],
        );
        let input = RequestInput {
            param_values: values(&[("X-Request-Id", "abc 123")]),
            ..RequestInput::default()
        };
        let payload = build_payload(&ep, &input);
        assert_eq!(
            payload.headers,
            vec![("X-Request-Id".to_string(), "abc 123".to_string())]
        );
    }

    #[test]
    fn json_body_passes_through_with_implicit_content_type() {
        let ep = endpoint("POST", "/pets", Vec::new());
        let input = RequestInput {
            body: Some(r#"{"name":"rex"}"#.to_string()),
            body_type: Some("application/json".to_string()),
            ..RequestInput::default()
        };
        let payload = build_payload(&ep, &input);
        assert_eq!(payload.body, RequestBody::Raw(r#"{"name":"rex"}"#.to_string()));
        assert_eq!(
            payload.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn get_omits_body_and_blank_body_is_dropped() {
        let ep = endpoint("GET", "/pets", Vec::new());
        let input = RequestInput {
            body: Some(r#"{"x":1}"#.to_string()),
            body_type: Some("application/json".to_string()),
            ..RequestInput::default()
        };
        assert_eq!(build_payload(&ep, &input).body, RequestBody::None);

        let ep = endpoint("POST", "/pets", Vec::new());
        let input = RequestInput {
            body: Some("   \n".to_string()),
            body_type: Some("application/json".to_string()),
            ..RequestInput::default()
        };
        let payload = build_payload(&ep, &input);
        assert_eq!(payload.body, RequestBody::None);
        assert!(payload.headers.is_empty());
    }

    #[test]
    fn implicit_content_type_never_overrides_header_param() {
        let ep = endpoint(
            "POST",
            "/pets",
            vec![param("content-type", ParamLocation::Header)],
        );
        let input = RequestInput {
            param_values: values(&[("content-type", "application/vnd.custom+json")]),
            body: Some("{}".to_string()),
            body_type: Some("application/json".to_string()),
            ..RequestInput::default()
        };
        let payload = build_payload(&ep, &input);
        assert_eq!(
            payload.headers,
            vec![(
                "content-type".to_string(),
                "application/vnd.custom+json".to_string()
            )]
        );
    }

    #[test]
    fn urlencoded_body_builds_single_string_skipping_empty() {
        let ep = endpoint("POST", "/pets", Vec::new());
        let input = RequestInput {
            body_type: Some("application/x-www-form-urlencoded".to_string()),
            form_values: vec![
                ("name".to_string(), "rex the dog".to_string()),
                ("note".to_string(), String::new()),
                ("age".to_string(), "3".to_string()),
            ],
            ..RequestInput::default()
        };
        let payload = build_payload(&ep, &input);
        assert_eq!(
            payload.body,
            RequestBody::Form("name=rex%20the%20dog&age=3".to_string())
        );
        assert_eq!(
            payload.headers,
            vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded".to_string()
            )]
        );
    }

    #[test]
    fn multipart_clears_caller_content_type_and_drops_empty_entries() {
        let ep = endpoint(
            "POST",
            "/upload",
            vec![param("Content-Type", ParamLocation::Header)],
        );
        let input = RequestInput {
            param_values: values(&[("Content-Type", "application/json")]),
            body_type: Some("multipart/form-data".to_string()),
            form_values: vec![
                ("caption".to_string(), "hello".to_string()),
                ("blank".to_string(), String::new()),
            ],
            file_values: vec![
                MultipartFile {
                    name: "file".to_string(),
                    paths: vec!["/tmp/a.png".to_string(), String::new()],
                },
                MultipartFile {
                    name: "none".to_string(),
                    paths: Vec::new(),
                },
            ],
            ..RequestInput::default()
        };
        let payload = build_payload(&ep, &input);
        assert!(payload.headers.is_empty());

        let RequestBody::Multipart(multipart) = payload.body else {
            panic!("expected multipart body");
        };
        assert_eq!(multipart.fields.len(), 1);
        assert_eq!(multipart.fields["caption"], "hello");
        assert_eq!(multipart.files.len(), 1);
        assert_eq!(multipart.files[0].paths, vec!["/tmp/a.png".to_string()]);
    }
}
