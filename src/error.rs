//! Error types for the openapi-workbench crate.

use thiserror::Error;

/// Errors that can occur while normalizing an OpenAPI document.
///
/// Import is all-or-nothing: a `ParseError` means no partial
/// `Collection` was produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("document is not valid JSON or YAML")]
    InvalidDocument {
        #[source]
        json: serde_json::Error,
        yaml: serde_yaml::Error,
    },

    #[error("document has no `paths` object")]
    MissingPaths,
}

/// Errors that can occur while fetching an OpenAPI document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("failed to fetch document")]
    Request(#[source] reqwest::Error),

    #[error("failed to read document body")]
    BodyRead(#[source] reqwest::Error),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },
}

/// Errors that can occur during a full import (fetch + normalize).
///
/// Either way the import is aborted and no partial collection is
/// produced; previously imported state is untouched.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Errors that can occur while executing a built request.
///
/// Schedulers never propagate these; they are rendered into the
/// response/history slot via `Display`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },

    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    ResponseRead(#[source] reqwest::Error),

    #[error("failed to open file for upload: {path}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
