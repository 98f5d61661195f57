// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// Token streaming
//
// Responsibilities:
// - Classify upstream responses as buffered or streamed
// - Decode NDJSON token records, tolerating malformed lines
// - Pump decoded fragments to the downstream sink one at a time
// - Report in-band errors, lost connections and stalls as distinct failures

mod classifier;
mod decoder;
mod pump;
mod types;

pub use classifier::{declares_incremental_body, ResponseClassifier};
pub use decoder::NdjsonDecoder;
pub use pump::{ChannelSink, SinkClosed, SinkItem, StreamPump, TokenSink};
pub use types::{PumpOutcome, ResponseMode, StreamEvent, StreamFailure};
