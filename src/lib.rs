// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod proxy;
pub mod session;
pub mod stream;
pub mod upstream;
