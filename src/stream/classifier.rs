// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// Response classifier
//
// Decides whether an upstream response is relayed as one buffered document
// or pumped incrementally. Pure: the same (path, headers) always gives the
// same answer.

use axum::http::{header, HeaderMap};

use super::types::ResponseMode;
use crate::config::RouteConfig;

/// Media types that announce an incremental body.
const INCREMENTAL_MEDIA_TYPES: &[&str] = &[
    "text/event-stream",
    "application/x-ndjson",
    "application/ndjson",
    "application/jsonl",
    "application/jsonlines",
    "application/stream+json",
];

/// Classifies upstream responses by declared content type, then by path.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    generate_path: String,
    stream_suffixes: Vec<String>,
}

impl ResponseClassifier {
    pub fn new(routes: &RouteConfig) -> Self {
        Self {
            generate_path: normalize_path(&routes.generate_path).to_string(),
            stream_suffixes: routes
                .stream_suffixes
                .iter()
                .map(|s| normalize_path(s).to_string())
                .collect(),
        }
    }

    /// Precedence:
    /// 1. incremental content type -> Streamed
    /// 2. known streaming path, whatever the content type -> Streamed
    /// 3. anything else -> Buffered
    pub fn classify(&self, path: &str, headers: &HeaderMap) -> ResponseMode {
        if declares_incremental_body(headers) || self.is_streaming_path(path) {
            ResponseMode::Streamed
        } else {
            ResponseMode::Buffered
        }
    }

    /// Upstreams that stream without announcing it are caught here.
    pub fn is_streaming_path(&self, path: &str) -> bool {
        let path = normalize_path(path);
        path == self.generate_path
            || path.ends_with("/generate")
            || self
                .stream_suffixes
                .iter()
                .any(|suffix| path.ends_with(suffix.as_str()))
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(&RouteConfig::default())
    }
}

/// Whether the declared content type is one of the incremental media types.
///
/// Parameters (`; charset=utf-8`) are ignored, comparison is case-insensitive.
pub fn declares_incremental_body(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let media_type = value.split(';').next().unwrap_or("").trim();
    INCREMENTAL_MEDIA_TYPES
        .iter()
        .any(|known| media_type.eq_ignore_ascii_case(known))
}

/// Drop the query string and any trailing slash (but keep a bare "/").
fn normalize_path(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
