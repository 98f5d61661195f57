// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::io::Write as _;
use std::time::Duration;

const FULL_YAML: &str = r#"
relay: v1

upstream:
  base_url: "http://localhost:7000/"
  connect_timeout_ms: 1500
  response_timeout_ms: 9000

routes:
  generate_path: "/v2/generate"
  stream_suffixes: ["/stream", "/events"]

stream:
  idle_timeout_ms: 30000
  sink_capacity: 4
  max_consecutive_malformed: 8
  max_buffered_bytes: 1024
  max_request_bytes: 2048
  max_record_bytes: 512
"#;

fn make_source(yaml: &str) -> StringSource {
    StringSource {
        content: yaml.to_string(),
    }
}

// ---------------------------------------------------------------
// Full config parses into typed struct
// ---------------------------------------------------------------

#[test]
fn full_config_parses_all_fields() {
    let config = load_config(&make_source(FULL_YAML)).unwrap();

    assert_eq!(config.upstream.base_url, "http://localhost:7000");
    assert_eq!(config.upstream.connect_timeout, Duration::from_millis(1500));
    assert_eq!(config.upstream.response_timeout, Duration::from_millis(9000));

    assert_eq!(config.routes.generate_path, "/v2/generate");
    assert_eq!(config.routes.stream_suffixes, vec!["/stream", "/events"]);

    assert_eq!(config.stream.idle_timeout, Some(Duration::from_secs(30)));
    assert_eq!(config.stream.sink_capacity, 4);
    assert_eq!(config.stream.max_consecutive_malformed, Some(8));
    assert_eq!(config.stream.max_buffered_bytes, 1024);
    assert_eq!(config.stream.max_request_bytes, 2048);
    assert_eq!(config.stream.max_record_bytes, 512);
}

// ---------------------------------------------------------------
// Omitted sections fall back to defaults
// ---------------------------------------------------------------

#[test]
fn empty_document_uses_defaults() {
    let config = load_config(&make_source("")).unwrap();
    assert_eq!(config.upstream, UpstreamConfig::default());
    assert_eq!(config.routes, RouteConfig::default());
    assert_eq!(config.stream, StreamConfig::default());
    assert!(config.config_hash.starts_with("sha256:"));
}

#[test]
fn version_only_document_uses_defaults() {
    let config = load_config(&make_source("relay: v1\n")).unwrap();
    assert_eq!(config.upstream.base_url, DEFAULT_UPSTREAM_URL);
    assert_eq!(config.routes.generate_path, DEFAULT_GENERATE_PATH);
    assert_eq!(config.stream.idle_timeout, Some(DEFAULT_IDLE_TIMEOUT));
    assert_eq!(config.stream.max_consecutive_malformed, None);
}

#[test]
fn partial_section_keeps_other_defaults() {
    let yaml = "stream:\n  sink_capacity: 2\n";
    let config = load_config(&make_source(yaml)).unwrap();
    assert_eq!(config.stream.sink_capacity, 2);
    assert_eq!(config.stream.max_request_bytes, DEFAULT_MAX_REQUEST_BYTES);
    assert_eq!(config.stream.max_record_bytes, DEFAULT_MAX_RECORD_BYTES);
}

#[test]
fn zero_idle_timeout_disables_stall_detection() {
    let yaml = "stream:\n  idle_timeout_ms: 0\n";
    let config = load_config(&make_source(yaml)).unwrap();
    assert_eq!(config.stream.idle_timeout, None);
}

// ---------------------------------------------------------------
// Validation errors are actionable
// ---------------------------------------------------------------

#[test]
fn unsupported_version_rejected() {
    let err = load_config(&make_source("relay: v2\n")).unwrap_err();
    assert!(err.to_string().contains("v2"), "got: {err}");
}

#[test]
fn non_http_base_url_rejected() {
    let yaml = "upstream:\n  base_url: \"ftp://example\"\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("base_url"), "got: {msg}");
    assert!(msg.contains("http://"), "got: {msg}");
}

#[test]
fn base_url_without_host_rejected() {
    let yaml = "upstream:\n  base_url: \"http://\"\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(err.to_string().contains("no host"), "got: {err}");
}

#[test]
fn zero_response_timeout_rejected() {
    let yaml = "upstream:\n  response_timeout_ms: 0\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(err.to_string().contains("response_timeout_ms"), "got: {err}");
}

#[test]
fn relative_generate_path_rejected() {
    let yaml = "routes:\n  generate_path: \"generate\"\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(err.to_string().contains("generate_path"), "got: {err}");
}

#[test]
fn zero_record_limit_rejected() {
    let yaml = "stream:\n  max_record_bytes: 0\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(err.to_string().contains("byte limits"), "got: {err}");
}

#[test]
fn empty_stream_suffix_rejected() {
    let yaml = "routes:\n  stream_suffixes: [\"/stream\", \"\"]\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(err.to_string().contains("stream_suffixes"), "got: {err}");
}

#[test]
fn zero_sink_capacity_rejected() {
    let yaml = "stream:\n  sink_capacity: 0\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(err.to_string().contains("sink_capacity"), "got: {err}");
}

#[test]
fn zero_malformed_limit_rejected() {
    let yaml = "stream:\n  max_consecutive_malformed: 0\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(err.to_string().contains("max_consecutive_malformed"), "got: {err}");
}

#[test]
fn unknown_keys_rejected() {
    let yaml = "upstream:\n  base_ulr: \"http://localhost\"\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(matches!(err, ConfigError::Yaml(_)), "got: {err}");
}

#[test]
fn malformed_yaml_rejected() {
    let err = load_config(&make_source("upstream: [unclosed")).unwrap_err();
    assert!(matches!(err, ConfigError::Yaml(_)));
}

// ---------------------------------------------------------------
// Variable interpolation
// ---------------------------------------------------------------

#[test]
fn base_url_interpolated_from_environment() {
    std::env::set_var("RELAY_CFG_TEST_BACKEND_PORT", "5123");
    let yaml = "upstream:\n  base_url: \"http://127.0.0.1:${RELAY_CFG_TEST_BACKEND_PORT}\"\n";
    let config = load_config(&make_source(yaml)).unwrap();
    assert_eq!(config.upstream.base_url, "http://127.0.0.1:5123");
}

#[test]
fn stream_suffixes_interpolated_from_environment() {
    std::env::set_var("RELAY_CFG_TEST_EVENTS_SUFFIX", "/events");
    let yaml = "routes:\n  stream_suffixes: [\"/stream\", \"${RELAY_CFG_TEST_EVENTS_SUFFIX}\"]\n";
    let config = load_config(&make_source(yaml)).unwrap();
    assert_eq!(config.routes.stream_suffixes, vec!["/stream", "/events"]);
}

#[test]
fn undefined_variable_in_stream_suffix_fails() {
    let yaml = "routes:\n  stream_suffixes: [\"${RELAY_CFG_TEST_SUFFIX_UNSET}\"]\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(err.to_string().contains("RELAY_CFG_TEST_SUFFIX_UNSET"), "got: {err}");
}

#[test]
fn undefined_variable_fails_with_clear_error() {
    let yaml = "upstream:\n  base_url: \"http://${RELAY_CFG_TEST_DEFINITELY_UNSET}\"\n";
    let err = load_config(&make_source(yaml)).unwrap_err();
    assert!(
        err.to_string().contains("RELAY_CFG_TEST_DEFINITELY_UNSET"),
        "got: {err}"
    );
}

// ---------------------------------------------------------------
// Config hash
// ---------------------------------------------------------------

#[test]
fn config_hash_is_deterministic() {
    let a = load_config(&make_source(FULL_YAML)).unwrap();
    let b = load_config(&make_source(FULL_YAML)).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.config_hash.len(), 7 + 64);
}

#[test]
fn different_yaml_produces_different_hash() {
    let a = load_config(&make_source("stream:\n  sink_capacity: 1\n")).unwrap();
    let b = load_config(&make_source("stream:\n  sink_capacity: 2\n")).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

// ---------------------------------------------------------------
// Sources
// ---------------------------------------------------------------

#[test]
fn file_source_reads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL_YAML.as_bytes()).unwrap();

    let source = FileSource {
        path: file.path().to_path_buf(),
    };
    let config = load_config(&source).unwrap();
    assert_eq!(config.routes.generate_path, "/v2/generate");
}

#[test]
fn missing_file_is_io_error() {
    let source = FileSource {
        path: std::path::PathBuf::from("/definitely/not/here/relay.yaml"),
    };
    let err = load_config(&source).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
