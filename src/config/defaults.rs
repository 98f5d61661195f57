// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Local inference backend address used when the config names none.
pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:5000";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded wait for the upstream response head.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest silence tolerated between two chunks of an open stream.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_GENERATE_PATH: &str = "/generate";

pub fn default_stream_suffixes() -> Vec<String> {
    vec!["/stream".to_string()]
}

/// Forwarded fragments queued per session before the pump stops pulling.
pub const DEFAULT_SINK_CAPACITY: usize = 16;

pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 16 * 1024 * 1024;

pub const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

/// Longest NDJSON record the decoder holds while waiting for its newline.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1024 * 1024;
