// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// Upstream client
//
// Responsibilities:
// - Build the outbound request to the inference backend
// - Report connection failures and a missing response head as unreachable
// - Report non-success statuses before any body is relayed
// - Expose the body as a pull-based byte stream (nothing read ahead)

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};

use crate::config::UpstreamConfig;

/// Upper bound on how much of a failing upstream's body is kept for diagnostics.
const ERROR_BODY_LIMIT: usize = 4096;

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

/// One request bound for the inference backend. Immutable once built.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: Method,
    /// Upstream path including any query string, always starting with '/'.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RelayRequest {
    /// Build a request carrying the fixed JSON content type.
    ///
    /// The body is dropped for read methods (GET, HEAD, OPTIONS).
    pub fn new(method: Method, path: impl Into<String>, body: Option<Bytes>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let body = if is_read_method(&method) { None } else { body };

        Self {
            method,
            path,
            headers,
            body,
        }
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }
}

pub fn is_read_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Upstream response body, consumed exactly once.
pub enum UpstreamBody {
    Full(Bytes),
    Stream(ByteStream),
}

impl UpstreamBody {
    /// View the body as a chunk stream. A full body becomes a single chunk.
    pub fn into_stream(self) -> ByteStream {
        match self {
            UpstreamBody::Full(bytes) => Box::pin(stream::once(async move { Ok(bytes) })),
            UpstreamBody::Stream(s) => s,
        }
    }

    /// Read the whole body, failing once more than `limit` bytes arrive.
    pub async fn collect(self, limit: usize) -> Result<Bytes, UpstreamError> {
        match self {
            UpstreamBody::Full(bytes) if bytes.len() > limit => {
                Err(UpstreamError::BodyTooLarge { limit })
            }
            UpstreamBody::Full(bytes) => Ok(bytes),
            UpstreamBody::Stream(mut s) => {
                let mut collected = BytesMut::new();
                while let Some(chunk) = s.next().await {
                    let chunk = chunk?;
                    if collected.len() + chunk.len() > limit {
                        return Err(UpstreamError::BodyTooLarge { limit });
                    }
                    collected.extend_from_slice(&chunk);
                }
                Ok(collected.freeze())
            }
        }
    }
}

impl std::fmt::Debug for UpstreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            UpstreamBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream returned {status}")]
    Status { status: StatusCode, body: String },

    #[error("upstream body read failed: {0}")]
    Body(String),

    #[error("upstream body exceeded {limit} bytes")]
    BodyTooLarge { limit: usize },
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Sends relay requests to the inference backend.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: RelayRequest) -> Result<UpstreamResponse, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Reqwest upstream client
// ---------------------------------------------------------------------------

pub struct ReqwestUpstreamClient {
    client: reqwest::Client,
    base_url: String,
    response_timeout: Duration,
}

impl ReqwestUpstreamClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        response_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            response_timeout,
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self::new(client, config.base_url.clone(), config.response_timeout))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn send(&self, request: RelayRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(method = %request.method, %url, "forwarding to upstream");

        let mut req = self
            .client
            .request(request.method, &url)
            .headers(request.headers);
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let resp = match tokio::time::timeout(self.response_timeout, req.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(UpstreamError::Unreachable(e.to_string())),
            Err(_) => {
                return Err(UpstreamError::Unreachable(format!(
                    "no response from {url} within {}ms",
                    self.response_timeout.as_millis()
                )))
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = tokio::time::timeout(self.response_timeout, read_error_body(resp))
                .await
                .unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let headers = resp.headers().clone();
        let stream = resp
            .bytes_stream()
            .map_err(|e| UpstreamError::Body(e.to_string()));

        Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Stream(Box::pin(stream)),
        })
    }
}

/// Read at most `ERROR_BODY_LIMIT` bytes of a failing response, lossily.
async fn read_error_body(mut resp: reqwest::Response) -> String {
    let mut collected = Vec::new();
    while collected.len() < ERROR_BODY_LIMIT {
        match resp.chunk().await {
            Ok(Some(chunk)) => collected.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    collected.truncate(ERROR_BODY_LIMIT);
    String::from_utf8_lossy(&collected).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_request_sets_json_content_type() {
        let req = RelayRequest::new(Method::POST, "/generate", Some(Bytes::from_static(b"{}")));
        assert_eq!(req.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(req.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn read_methods_drop_the_body() {
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            let req = RelayRequest::new(method.clone(), "/x", Some(Bytes::from_static(b"{}")));
            assert!(req.body.is_none(), "{method} should not carry a body");
        }
        let req = RelayRequest::new(Method::DELETE, "/x", Some(Bytes::from_static(b"{}")));
        assert!(req.body.is_some());
    }

    #[test]
    fn path_gets_leading_slash_and_route_strips_query() {
        let req = RelayRequest::new(Method::GET, "speech_status?verbose=1", None);
        assert_eq!(req.path, "/speech_status?verbose=1");
        assert_eq!(req.route(), "/speech_status");
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = ReqwestUpstreamClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:5000/",
            Duration::from_secs(1),
        );
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
    }

    #[tokio::test]
    async fn full_body_becomes_single_chunk() {
        let mut s = UpstreamBody::Full(Bytes::from_static(b"abc")).into_stream();
        assert_eq!(s.next().await, Some(Ok(Bytes::from_static(b"abc"))));
        assert_eq!(s.next().await, None);
    }

    #[tokio::test]
    async fn collect_concatenates_stream_chunks() {
        let chunks = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let body = UpstreamBody::Stream(Box::pin(stream::iter(chunks)));
        assert_eq!(body.collect(16).await.unwrap(), Bytes::from_static(b"abcd"));
    }

    #[tokio::test]
    async fn collect_enforces_limit() {
        let chunks = vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"def"))];
        let body = UpstreamBody::Stream(Box::pin(stream::iter(chunks)));
        assert_eq!(
            body.collect(4).await.unwrap_err(),
            UpstreamError::BodyTooLarge { limit: 4 }
        );

        let full = UpstreamBody::Full(Bytes::from_static(b"abcdef"));
        assert!(full.collect(4).await.is_err());
    }

    #[tokio::test]
    async fn collect_propagates_body_errors() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(UpstreamError::Body("reset".into())),
        ];
        let body = UpstreamBody::Stream(Box::pin(stream::iter(chunks)));
        assert_eq!(
            body.collect(16).await.unwrap_err(),
            UpstreamError::Body("reset".into())
        );
    }
}
