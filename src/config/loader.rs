// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use sha2::{Digest, Sha256};

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate relay config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Compute the SHA256 config hash
/// 3. Parse YAML into the raw types
/// 4. Check the version key
/// 5. Resolve `${VAR}` interpolation in string fields
/// 6. Validate values and fill in defaults
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    // An empty document is a valid "all defaults" config.
    let raw: raw::RawConfig = if raw_yaml.trim().is_empty() {
        raw::RawConfig::default()
    } else {
        serde_yaml::from_str(&raw_yaml)?
    };

    if let Some(version) = raw.relay.as_deref() {
        if version != "v1" {
            return Err(ConfigError::Validation(format!(
                "unsupported config version \"{version}\", expected \"v1\""
            )));
        }
    }

    Ok(Config {
        upstream: build_upstream_config(raw.upstream)?,
        routes: build_route_config(raw.routes)?,
        stream: build_stream_config(raw.stream)?,
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

fn build_upstream_config(
    raw: Option<raw::RawUpstreamConfig>,
) -> Result<UpstreamConfig, ConfigError> {
    let defaults = UpstreamConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let base_url = match raw.base_url {
        Some(url) => normalize_base_url(&resolve_variables(&url)?)?,
        None => defaults.base_url,
    };

    let connect_timeout = raw
        .connect_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.connect_timeout);

    let response_timeout = match raw.response_timeout_ms {
        Some(0) => {
            return Err(ConfigError::Validation(
                "upstream.response_timeout_ms must be > 0".into(),
            ))
        }
        Some(ms) => Duration::from_millis(ms),
        None => defaults.response_timeout,
    };

    Ok(UpstreamConfig {
        base_url,
        connect_timeout,
        response_timeout,
    })
}

fn normalize_base_url(url: &str) -> Result<String, ConfigError> {
    let trimmed = url.trim();
    let (scheme, rest) = ["http://", "https://"]
        .iter()
        .find_map(|scheme| trimmed.strip_prefix(scheme).map(|rest| (*scheme, rest)))
        .ok_or_else(|| {
            ConfigError::Validation(format!(
                "upstream.base_url \"{url}\" must start with http:// or https://"
            ))
        })?;
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return Err(ConfigError::Validation(format!(
            "upstream.base_url \"{url}\" has no host"
        )));
    }
    Ok(format!("{scheme}{rest}"))
}

fn build_route_config(raw: Option<raw::RawRouteConfig>) -> Result<RouteConfig, ConfigError> {
    let defaults = RouteConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let generate_path = match raw.generate_path {
        Some(path) => {
            let path = resolve_variables(&path)?;
            if !path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "routes.generate_path \"{path}\" must start with '/'"
                )));
            }
            path
        }
        None => defaults.generate_path,
    };

    let stream_suffixes = match raw.stream_suffixes {
        Some(suffixes) => {
            let suffixes = suffixes
                .iter()
                .map(|s| resolve_variables(s))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(bad) = suffixes.iter().find(|s| s.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "routes.stream_suffixes contains an empty entry: {bad:?}"
                )));
            }
            suffixes
        }
        None => defaults.stream_suffixes,
    };

    Ok(RouteConfig {
        generate_path,
        stream_suffixes,
    })
}

fn build_stream_config(raw: Option<raw::RawStreamConfig>) -> Result<StreamConfig, ConfigError> {
    let defaults = StreamConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };

    let idle_timeout = match raw.idle_timeout_ms {
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms)),
        None => defaults.idle_timeout,
    };

    let sink_capacity = raw.sink_capacity.unwrap_or(defaults.sink_capacity);
    if sink_capacity == 0 {
        return Err(ConfigError::Validation(
            "stream.sink_capacity must be >= 1".into(),
        ));
    }

    if raw.max_consecutive_malformed == Some(0) {
        return Err(ConfigError::Validation(
            "stream.max_consecutive_malformed must be >= 1 (omit it to disable)".into(),
        ));
    }

    let max_buffered_bytes = raw.max_buffered_bytes.unwrap_or(defaults.max_buffered_bytes);
    let max_request_bytes = raw.max_request_bytes.unwrap_or(defaults.max_request_bytes);
    let max_record_bytes = raw.max_record_bytes.unwrap_or(defaults.max_record_bytes);
    if max_buffered_bytes == 0 || max_request_bytes == 0 || max_record_bytes == 0 {
        return Err(ConfigError::Validation(
            "stream byte limits must be > 0".into(),
        ));
    }

    Ok(StreamConfig {
        idle_timeout,
        sink_capacity,
        max_consecutive_malformed: raw.max_consecutive_malformed,
        max_buffered_bytes,
        max_request_bytes,
        max_record_bytes,
    })
}
