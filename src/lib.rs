//! Import an OpenAPI spec and interact with the described API.
//!
//! Normalizes an OpenAPI 3.x document (JSON or YAML) into a
//! [`Collection`] of endpoints grouped by tag, builds wire-ready
//! requests from user-supplied values, and keeps collections fresh in
//! the background via ETag-conditional sync and per-endpoint polling.
//! Rendering, persistence and auth are the embedding shell's concern;
//! this crate only computes and schedules.
//!
//! # Usage
//!
//! ```no_run
//! use openapi_workbench::{build_payload, normalize, RequestInput};
//!
//! let text = r#"{"paths":{"/pets/{id}":{"get":{"tags":["pets"],
//!     "parameters":[{"name":"id","in":"path","required":true,
//!     "schema":{"type":"integer"}}]}}}}"#;
//! let collection = normalize(text, "https://example.com/openapi.json").unwrap();
//!
//! let endpoint = &collection.groups["pets"][0];
//! let mut input = RequestInput::default();
//! input.param_values.insert("id".into(), "7".into());
//!
//! let payload = build_payload(endpoint, &input);
//! assert_eq!(payload.url, "/pets/7");
//! ```

pub mod collection;
pub mod error;
pub mod event;
pub mod executor;
pub mod normalize;
pub mod payload;
pub mod poll;
pub mod schema;
pub mod sync;

pub use collection::{
    BodyField, Collection, Endpoint, EndpointKey, ParamLocation, Parameter, ResponseSchema,
    StatusPattern,
};
pub use error::{FetchError, ImportError, ParseError, TransportError};
pub use event::{CoreEvent, EventSink, HistoryEntry, SyncStatus};
pub use executor::{
    DocumentFetcher, FetchOutcome, HttpExecutor, RawResponse, ReqwestExecutor, ReqwestFetcher,
};
pub use normalize::{import, normalize};
pub use payload::{
    build_payload, MultipartFile, MultipartPayload, RequestBody, RequestInput, RequestPayload,
};
pub use poll::{PollConfig, PollRequest, PollScheduler};
pub use schema::{SchemaNode, SchemaShape};
pub use sync::{SyncConfig, SyncScheduler, SyncSnapshot};

// Re-export dependencies for downstream crates
pub use reqwest;
pub use serde_json;
