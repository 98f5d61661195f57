// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::defaults::*;

/// Parsed and validated relay config.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub routes: RouteConfig,
    pub stream: StreamConfig,
    /// SHA256 of the raw YAML: "sha256:{hex}". Empty for built-in defaults.
    pub config_hash: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            routes: RouteConfig::default(),
            stream: StreamConfig::default(),
            config_hash: String::new(),
        }
    }
}

/// Where the inference backend lives and how long we wait for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    /// Scheme, host and port, no trailing slash.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Bounded wait for the response head; exceeding it counts as unreachable.
    pub response_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// Upstream paths known to stream regardless of their declared content type.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    /// Token-generation endpoint; also the target of `POST /api/generate`.
    pub generate_path: String,
    pub stream_suffixes: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            generate_path: DEFAULT_GENERATE_PATH.to_string(),
            stream_suffixes: default_stream_suffixes(),
        }
    }
}

/// Limits applied while relaying.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// `None` disables stall detection.
    pub idle_timeout: Option<Duration>,
    pub sink_capacity: usize,
    /// `None` tolerates any number of malformed records in a row.
    pub max_consecutive_malformed: Option<usize>,
    pub max_buffered_bytes: usize,
    pub max_request_bytes: usize,
    /// Longer records are dropped as malformed.
    pub max_record_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            sink_capacity: DEFAULT_SINK_CAPACITY,
            max_consecutive_malformed: None,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}
