// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// HTTP relay surface
//
// Responsibilities:
// - Downstream routes: health, prompt generation, generic backend forwarding
// - Request validation (empty, non-JSON, missing prompt)
// - Dispatch: forward via the injected UpstreamClient, classify the response,
//   then relay it buffered or pump it token by token
// - Mapping of upstream failures to JSON error responses
// - End-of-stream trailers on streamed responses, so a client can tell a
//   clean finish from an in-band error, a lost connection or a stall

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use http_body::Frame;
use http_body_util::StreamBody;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

use crate::config::Config;
use crate::session::{RelaySession, SessionError, SessionState};
use crate::stream::{
    ChannelSink, PumpOutcome, ResponseClassifier, ResponseMode, SinkItem, StreamFailure,
    StreamPump,
};
use crate::upstream::{RelayRequest, UpstreamClient, UpstreamError, UpstreamResponse};

/// Shown to the UI when the backend process is not running.
pub const UNREACHABLE_MESSAGE: &str =
    "The inference backend is not reachable. Is the backend process running?";

/// Response headers that describe one hop and are never copied downstream.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Trailer sent at the end of every streamed response: `ok` or `error`.
pub const RELAY_STATUS_TRAILER: &str = "x-relay-status";
/// Trailer naming the failure: `upstream_error`, `connection_lost` or `stalled`.
pub const RELAY_ERROR_KIND_TRAILER: &str = "x-relay-error-kind";
/// Trailer carrying the failure message.
pub const RELAY_ERROR_TRAILER: &str = "x-relay-error";

/// Longest failure message put in a trailer.
const MAX_TRAILER_MESSAGE: usize = 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced to the downstream client before any body is sent.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("upstream returned {status}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("upstream body read failed: {0}")]
    UpstreamBody(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("request body must contain a string \"prompt\" field")]
    MissingPrompt,

    #[error("internal relay error: {0}")]
    Internal(String),
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Unreachable(reason) => RelayError::UpstreamUnreachable(reason),
            UpstreamError::Status { status, body } => RelayError::UpstreamStatus { status, body },
            other @ (UpstreamError::Body(_) | UpstreamError::BodyTooLarge { .. }) => {
                RelayError::UpstreamBody(other.to_string())
            }
        }
    }
}

impl From<SessionError> for RelayError {
    fn from(err: SessionError) -> Self {
        RelayError::Internal(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            RelayError::UpstreamUnreachable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": UNREACHABLE_MESSAGE }),
            ),
            RelayError::UpstreamStatus { status, .. } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "The inference backend returned an error.",
                    "upstream_status": status.as_u16(),
                }),
            ),
            RelayError::UpstreamBody(_) => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": "Failed to read the inference backend response." }),
            ),
            RelayError::EmptyBody | RelayError::MalformedJson(_) | RelayError::MissingPrompt => {
                let message = match &self {
                    RelayError::MalformedJson(_) => "request body is not valid JSON".to_string(),
                    other => other.to_string(),
                };
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            RelayError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal relay error" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Forwards relay requests upstream and relays the answer downstream.
///
/// Cheap to clone; every session gets its own decoder and channel.
#[derive(Clone)]
pub struct Dispatcher {
    upstream: Arc<dyn UpstreamClient>,
    classifier: ResponseClassifier,
    pump: StreamPump,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(upstream: Arc<dyn UpstreamClient>, config: Arc<Config>) -> Self {
        Self {
            upstream,
            classifier: ResponseClassifier::new(&config.routes),
            pump: StreamPump::new(
                config.stream.idle_timeout,
                config.stream.max_consecutive_malformed,
            )
            .with_max_record_bytes(Some(config.stream.max_record_bytes)),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one relay session.
    ///
    /// Errors are returned only before a response head exists. Once a
    /// streamed response is returned, its trailers report how it ended.
    pub async fn handle(&self, request: RelayRequest) -> Result<Response, RelayError> {
        let mut session = RelaySession::new(&request);
        tracing::debug!(
            request_id = %session.id(),
            method = %session.method(),
            path = session.path(),
            "relay request received"
        );
        session.advance(SessionState::Forwarding)?;

        let response = match self.upstream.send(request).await {
            Ok(response) => response,
            Err(e) => {
                session.advance(SessionState::Failed)?;
                log_upstream_failure(&session, &e);
                return Err(e.into());
            }
        };

        match self.classifier.classify(session.path(), &response.headers) {
            ResponseMode::Buffered => self.relay_buffered(session, response).await,
            ResponseMode::Streamed => self.relay_streamed(session, response),
        }
    }

    async fn relay_buffered(
        &self,
        mut session: RelaySession,
        response: UpstreamResponse,
    ) -> Result<Response, RelayError> {
        session.advance(SessionState::Buffering)?;
        let UpstreamResponse {
            status,
            headers,
            body,
        } = response;

        let bytes = match body.collect(self.config.stream.max_buffered_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                session.advance(SessionState::Failed)?;
                log_upstream_failure(&session, &e);
                return Err(e.into());
            }
        };
        session.advance(SessionState::Completed)?;

        tracing::info!(
            request_id = %session.id(),
            method = %session.method(),
            path = session.path(),
            mode = ResponseMode::Buffered.as_str(),
            status = status.as_u16(),
            bytes = bytes.len(),
            latency_ms = session.elapsed().as_millis() as u64,
            "relay completed"
        );

        let mut downstream = Response::new(Body::from(bytes));
        *downstream.status_mut() = status;
        *downstream.headers_mut() = forwardable_headers(&headers);
        Ok(downstream)
    }

    fn relay_streamed(
        &self,
        mut session: RelaySession,
        response: UpstreamResponse,
    ) -> Result<Response, RelayError> {
        session.advance(SessionState::Streaming)?;
        let status = response.status;
        let (mut sink, rx) = ChannelSink::channel(self.config.stream.sink_capacity);
        let pump = self.pump.clone();

        tokio::spawn(async move {
            let outcome = pump.run(response.body, &mut sink).await;
            drop(sink);
            finish_stream(session, status, outcome);
        });

        let frames = ReceiverStream::new(rx).map(|item| Ok::<_, Infallible>(into_frame(item)));
        let mut downstream = Response::new(Body::new(StreamBody::new(frames)));
        *downstream.status_mut() = status;
        let headers = downstream.headers_mut();
        headers.insert(
            header::TRAILER,
            HeaderValue::from_static("x-relay-status, x-relay-error-kind, x-relay-error"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store"),
        );
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
        Ok(downstream)
    }
}

/// Tokens become data frames. The terminal item becomes the trailers.
fn into_frame(item: SinkItem) -> Frame<Bytes> {
    match item {
        SinkItem::Token(bytes) => Frame::data(bytes),
        SinkItem::Completed => Frame::trailers(end_of_stream_trailers(None)),
        SinkItem::Failed(failure) => Frame::trailers(end_of_stream_trailers(Some(&failure))),
    }
}

fn end_of_stream_trailers(failure: Option<&StreamFailure>) -> HeaderMap {
    let mut trailers = HeaderMap::new();
    let Some(failure) = failure else {
        trailers.insert(RELAY_STATUS_TRAILER, HeaderValue::from_static("ok"));
        return trailers;
    };

    trailers.insert(RELAY_STATUS_TRAILER, HeaderValue::from_static("error"));
    trailers.insert(
        RELAY_ERROR_KIND_TRAILER,
        HeaderValue::from_static(failure.kind()),
    );
    let message = trailer_safe(&failure.to_string());
    if let Ok(value) = HeaderValue::from_str(&message) {
        trailers.insert(RELAY_ERROR_TRAILER, value);
    }
    trailers
}

/// Control characters become spaces; the text is cut at a char boundary.
fn trailer_safe(message: &str) -> String {
    let mut out = String::with_capacity(message.len().min(MAX_TRAILER_MESSAGE));
    for c in message.chars() {
        if out.len() + c.len_utf8() > MAX_TRAILER_MESSAGE {
            break;
        }
        out.push(if c.is_control() { ' ' } else { c });
    }
    out
}

/// Close out a streamed session once its pump has stopped.
fn finish_stream(mut session: RelaySession, status: StatusCode, outcome: PumpOutcome) {
    let next = match outcome {
        PumpOutcome::Completed { .. } => SessionState::Completed,
        PumpOutcome::Failed(_) | PumpOutcome::Cancelled => SessionState::Failed,
    };
    if session.advance(next).is_err() {
        return;
    }
    let latency_ms = session.elapsed().as_millis() as u64;

    match outcome {
        PumpOutcome::Completed { tokens } => tracing::info!(
            request_id = %session.id(),
            method = %session.method(),
            path = session.path(),
            mode = ResponseMode::Streamed.as_str(),
            status = status.as_u16(),
            tokens,
            latency_ms,
            "relay completed"
        ),
        PumpOutcome::Failed(failure) => tracing::warn!(
            request_id = %session.id(),
            path = session.path(),
            mode = ResponseMode::Streamed.as_str(),
            failure = failure.kind(),
            error = %failure,
            latency_ms,
            "stream failed"
        ),
        PumpOutcome::Cancelled => tracing::debug!(
            request_id = %session.id(),
            path = session.path(),
            latency_ms,
            "downstream disconnected, stream cancelled"
        ),
    }
}

fn log_upstream_failure(session: &RelaySession, err: &UpstreamError) {
    let latency_ms = session.elapsed().as_millis() as u64;
    match err {
        UpstreamError::Status { status, body } => tracing::warn!(
            request_id = %session.id(),
            method = %session.method(),
            path = session.path(),
            upstream_status = status.as_u16(),
            upstream_body = %body,
            latency_ms,
            "upstream returned error status"
        ),
        other => tracing::warn!(
            request_id = %session.id(),
            method = %session.method(),
            path = session.path(),
            error = %other,
            latency_ms,
            "upstream request failed"
        ),
    }
}

/// Copy upstream headers, leaving out hop-by-hop ones and `content-length`.
fn forwardable_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Liveness: GET /health -> 200
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct GeneratePayload<'a> {
    prompt: &'a str,
}

/// POST /api/generate with `{"prompt": "..."}`.
pub async fn generate_handler(
    State(dispatcher): State<Dispatcher>,
    body: Bytes,
) -> Result<Response, RelayError> {
    let prompt = parse_prompt(&body)?;
    let payload = serde_json::to_vec(&GeneratePayload { prompt: &prompt })
        .map_err(|e| RelayError::Internal(e.to_string()))?;

    let path = dispatcher.config().routes.generate_path.clone();
    dispatcher
        .handle(RelayRequest::new(Method::POST, path, Some(Bytes::from(payload))))
        .await
}

/// ANY /api/backend/{*path}: forwarded to `/{path}` upstream, query included.
pub async fn backend_handler(
    State(dispatcher): State<Dispatcher>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, RelayError> {
    let target = match query {
        Some(query) => format!("/{path}?{query}"),
        None => format!("/{path}"),
    };
    let body = (!body.is_empty()).then_some(body);
    dispatcher.handle(RelayRequest::new(method, target, body)).await
}

fn parse_prompt(body: &[u8]) -> Result<String, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RelayError::EmptyBody);
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| RelayError::MalformedJson(e.to_string()))?;
    match value.get("prompt") {
        Some(Value::String(prompt)) => Ok(prompt.clone()),
        _ => Err(RelayError::MissingPrompt),
    }
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router around an injected dispatcher.
pub fn build_router(dispatcher: Dispatcher) -> Router {
    let body_limit = dispatcher.config().stream.max_request_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate_handler))
        .route("/api/backend/{*path}", any(backend_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(dispatcher)
}

/// The relay listens on localhost only, never 0.0.0.0.
pub const BIND_HOST: [u8; 4] = [127, 0, 0, 1];

pub const DEFAULT_PORT: u16 = 8787;

pub fn bind_addr(port: u16) -> SocketAddr {
    SocketAddr::from((BIND_HOST, port))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
