//! Normalized collection model
//!
//! The output of normalization: endpoints grouped by tag, with
//! parameters, body shape and response schemas already extracted so a
//! UI can render a request form without touching the raw document.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An imported OpenAPI document, normalized for interactive use.
///
/// One `Collection` per imported URL; replaced wholesale on each
/// successful sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// `info.title`, or the source URL when absent
    pub name: String,
    /// URL the document was imported from
    pub source_url: String,
    /// Endpoints bucketed by first tag
    pub groups: BTreeMap<String, Vec<Endpoint>>,
    /// Whether background sync is active for this collection
    pub sync_enabled: bool,
    /// ETag of the imported document, if the server sent one
    pub etag: Option<String>,
    /// When the document was last imported or synced
    pub last_updated: DateTime<Utc>,
}

impl Collection {
    /// Look up an endpoint by its `(method, path)` identity.
    pub fn endpoint(&self, key: &EndpointKey) -> Option<&Endpoint> {
        self.groups
            .values()
            .flatten()
            .find(|e| e.method == key.method && e.path == key.path)
    }

    /// Total endpoint count across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }
}

/// One operation from the document, ready for request building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// HTTP method (GET, POST, ...)
    pub method: String,
    /// URL template, base URL already prepended when the document
    /// declared a server
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Effective parameters (path-level merged with operation-level)
    pub parameters: Vec<Parameter>,
    /// All media types declared for the request body
    pub body_media_types: Vec<String>,
    /// Form fields, present only for form-encoded bodies
    pub body_fields: Vec<BodyField>,
    /// Which form media type `body_fields` was derived from
    pub body_fields_type: Option<String>,
    /// Example JSON body, pre-rendered for the editor
    pub body_example: Option<String>,
    pub body_description: Option<String>,
    pub body_required: bool,
    /// Declared responses, one entry per status pattern
    pub responses: Vec<ResponseSchema>,
}

impl Endpoint {
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            method: self.method.clone(),
            path: self.path.clone(),
        }
    }

    /// Default media type for the body editor: `application/json`, else
    /// `multipart/form-data`, else `application/x-www-form-urlencoded`,
    /// else the first declared type.
    pub fn preferred_media_type(&self) -> Option<&str> {
        for preferred in [
            "application/json",
            "multipart/form-data",
            "application/x-www-form-urlencoded",
        ] {
            if self.body_media_types.iter().any(|t| t == preferred) {
                return Some(preferred);
            }
        }
        self.body_media_types.first().map(String::as_str)
    }
}

/// `(method, path)` pair identifying one operation within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub method: String,
    pub path: String,
}

impl EndpointKey {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Where a parameter is placed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

impl ParamLocation {
    /// Parse an OpenAPI `in` value. Unknown locations (e.g. `cookie`)
    /// return `None` and the parameter is skipped.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            _ => None,
        }
    }
}

/// A single request parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub description: Option<String>,
    /// Extracted example value, already stringified for the form
    pub example: Option<Value>,
    /// Enum values for UI pickers, empty when the schema is open
    pub enum_values: Vec<String>,
}

/// One field of a form-encoded request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyField {
    pub name: String,
    pub required: bool,
    /// `string` + `format: binary`/`base64`, rendered as a file picker
    pub is_file: bool,
    /// The field accepts multiple values (array schema)
    pub is_array: bool,
    pub description: Option<String>,
}

/// Status code pattern a response entry is declared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusPattern {
    /// An exact code, e.g. `200`
    Exact(u16),
    /// A class wildcard, e.g. `2XX` → `Wildcard(2)`
    Wildcard(u8),
    /// The `default` entry
    Default,
}

impl StatusPattern {
    /// Parse a `responses` map key. Returns `None` for keys that are
    /// neither numeric, a `NXX` wildcard, nor `default`.
    pub fn parse(key: &str) -> Option<Self> {
        if key.eq_ignore_ascii_case("default") {
            return Some(Self::Default);
        }
        if let Ok(code) = key.parse::<u16>() {
            return Some(Self::Exact(code));
        }
        let mut chars = key.chars();
        let class = chars.next()?.to_digit(10)?;
        if (1..=5).contains(&class) && chars.as_str().eq_ignore_ascii_case("xx") {
            return Some(Self::Wildcard(class as u8));
        }
        None
    }

    /// Whether a concrete status code matches this pattern.
    pub fn matches(&self, status: u16) -> bool {
        match self {
            Self::Exact(code) => *code == status,
            Self::Wildcard(class) => status / 100 == u16::from(*class),
            Self::Default => true,
        }
    }
}

impl fmt::Display for StatusPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(code) => write!(f, "{code}"),
            Self::Wildcard(class) => write!(f, "{class}XX"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// A declared response: status pattern plus the first content type's
/// raw schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub status: StatusPattern,
    pub content_type: Option<String>,
    /// Raw JSON schema, kept untyped for display
    pub schema: Option<Value>,
    pub description: Option<String>,
}
