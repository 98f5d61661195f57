// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML shapes. Kept apart from the typed config because values are
// interpolated and validated between the two.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub relay: Option<String>,
    pub upstream: Option<RawUpstreamConfig>,
    pub routes: Option<RawRouteConfig>,
    pub stream: Option<RawStreamConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawUpstreamConfig {
    pub base_url: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub response_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRouteConfig {
    pub generate_path: Option<String>,
    pub stream_suffixes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStreamConfig {
    pub idle_timeout_ms: Option<u64>,
    pub sink_capacity: Option<usize>,
    pub max_consecutive_malformed: Option<usize>,
    pub max_buffered_bytes: Option<usize>,
    pub max_request_bytes: Option<usize>,
    pub max_record_bytes: Option<usize>,
}
