//! HTTP collaborators
//!
//! The traits the schedulers talk to, plus the default
//! `reqwest`-backed implementations. The core never does I/O outside
//! of these.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use crate::error::{FetchError, TransportError};
use crate::payload::{RequestBody, RequestPayload};

/// Raw response handed back to the UI and the history log.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    /// Render into the response-slot text block.
    pub fn render(&self) -> String {
        let mut headers = String::new();
        for (name, value) in &self.headers {
            headers.push_str(name);
            headers.push_str(": ");
            headers.push_str(value);
            headers.push('\n');
        }
        format!(
            "Status: {}\n\nHeaders:\n{}\nBody:\n{}",
            self.status, headers, self.body
        )
    }
}

/// Executes built requests. Request-level timeouts are applied here,
/// passed through unchanged from the caller.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(
        &self,
        payload: &RequestPayload,
        timeout: Option<Duration>,
    ) -> Result<RawResponse, TransportError>;
}

/// Outcome of a conditional document fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Server answered 304; the cached document is current.
    NotModified,
    Fetched {
        text: String,
        etag: Option<String>,
    },
}

/// Fetches OpenAPI documents, with `If-None-Match` support for sync.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, etag: Option<&str>) -> Result<FetchOutcome, FetchError>;
}

/// Default executor on a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestExecutor {
    client: Client,
}

impl ReqwestExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(
        &self,
        payload: &RequestPayload,
        timeout: Option<Duration>,
    ) -> Result<RawResponse, TransportError> {
        let method: Method =
            payload
                .method
                .parse()
                .map_err(|_| TransportError::UnsupportedMethod {
                    method: payload.method.clone(),
                })?;

        let mut req = self.client.request(method, &payload.url);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        for (name, value) in &payload.headers {
            req = req.header(name, value);
        }

        match &payload.body {
            RequestBody::None => {}
            RequestBody::Raw(text) => req = req.body(text.clone()),
            RequestBody::Form(encoded) => req = req.body(encoded.clone()),
            RequestBody::Multipart(multipart) => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in &multipart.fields {
                    form = form.text(name.clone(), value.clone());
                }
                for file in &multipart.files {
                    for path in &file.paths {
                        let filename = Path::new(path)
                            .file_name()
                            .and_then(|name| name.to_str())
                            .unwrap_or("file")
                            .to_string();
                        let handle = tokio::fs::File::open(path).await.map_err(|source| {
                            TransportError::FileOpen {
                                path: path.clone(),
                                source,
                            }
                        })?;
                        let length = handle.metadata().await.map_err(|source| {
                            TransportError::FileOpen {
                                path: path.clone(),
                                source,
                            }
                        })?.len();
                        let part = reqwest::multipart::Part::stream_with_length(handle, length)
                            .file_name(filename);
                        form = form.part(file.name.clone(), part);
                    }
                }
                req = req.multipart(form);
            }
        }

        let resp = req.send().await.map_err(TransportError::Request)?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = resp.text().await.map_err(TransportError::ResponseRead)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Default document fetcher with ETag-conditional GET.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, etag: Option<&str>) -> Result<FetchOutcome, FetchError> {
        let mut req = self.client.get(url);
        if let Some(etag) = etag {
            req = req.header("If-None-Match", etag);
        }

        let resp = req.send().await.map_err(FetchError::Request)?;
        if resp.status() == reqwest::StatusCode::NOT_MODIFIED {
            debug!(url, "document not modified");
            return Ok(FetchOutcome::NotModified);
        }
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
            });
        }

        let etag = resp
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp.text().await.map_err(FetchError::BodyRead)?;

        Ok(FetchOutcome::Fetched { text, etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::MultipartPayload;

    fn payload(method: &str, url: String, body: RequestBody) -> RequestPayload {
        RequestPayload {
            method: method.to_string(),
            url,
            headers: Vec::new(),
            body,
        }
    }

    #[tokio::test]
    async fn executor_sends_raw_body_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/pets")
            .match_header("content-type", "application/json")
            .match_body(r#"{"name":"rex"}"#)
            .with_status(201)
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        let mut payload = payload(
            "POST",
            format!("{}/pets", server.url()),
            RequestBody::Raw(r#"{"name":"rex"}"#.to_string()),
        );
        payload
            .headers
            .push(("Content-Type".to_string(), "application/json".to_string()));

        let executor = ReqwestExecutor::default();
        let resp = executor.execute(&payload, None).await.unwrap();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body, r#"{"id":1}"#);
        assert!(resp.render().starts_with("Status: 201"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn executor_sends_multipart_with_generated_boundary() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("^multipart/form-data".to_string()),
            )
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let mut fields = std::collections::HashMap::new();
        fields.insert("caption".to_string(), "hello".to_string());
        let payload = payload(
            "POST",
            format!("{}/upload", server.url()),
            RequestBody::Multipart(MultipartPayload {
                fields,
                files: Vec::new(),
            }),
        );

        let executor = ReqwestExecutor::default();
        let resp = executor.execute(&payload, None).await.unwrap();
        assert_eq!(resp.status, 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn executor_rejects_unknown_method() {
        let payload = payload("NOT A METHOD", "http://localhost/".to_string(), RequestBody::None);
        let executor = ReqwestExecutor::default();
        let err = executor.execute(&payload, None).await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedMethod { .. }));
    }

    #[tokio::test]
    async fn fetcher_maps_304_to_not_modified() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/openapi.json")
            .match_header("if-none-match", "\"v1\"")
            .with_status(304)
            .create_async()
            .await;

        let fetcher = ReqwestFetcher::default();
        let outcome = fetcher
            .fetch(&format!("{}/openapi.json", server.url()), Some("\"v1\""))
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::NotModified);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetcher_returns_text_and_etag_on_200() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/openapi.json")
            .with_status(200)
            .with_header("etag", "\"v2\"")
            .with_body(r#"{"paths":{}}"#)
            .create_async()
            .await;

        let fetcher = ReqwestFetcher::default();
        let outcome = fetcher
            .fetch(&format!("{}/openapi.json", server.url()), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Fetched {
                text: r#"{"paths":{}}"#.to_string(),
                etag: Some("\"v2\"".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn fetcher_fails_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/openapi.json")
            .with_status(502)
            .create_async()
            .await;

        let fetcher = ReqwestFetcher::default();
        let err = fetcher
            .fetch(&format!("{}/openapi.json", server.url()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 502 }));
    }
}
