// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// Relay config loader
//
// Loads relay.yaml, resolves variable interpolation, validates values and
// computes a deterministic config hash. Every section is optional.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use defaults::*;
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{Config, RouteConfig, StreamConfig, UpstreamConfig};

#[cfg(test)]
mod tests;
