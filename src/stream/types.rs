// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Decoded events, terminal failures and pump outcomes shared by the
// decoder, the pump and the dispatcher.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// How an upstream response is relayed downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Read fully, forward as one document.
    Buffered,
    /// Decode incrementally, forward token fragments as they arrive.
    Streamed,
}

impl ResponseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::Buffered => "buffered",
            ResponseMode::Streamed => "streamed",
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded events
// ---------------------------------------------------------------------------

/// One record decoded from an NDJSON token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental piece of generated text. May be empty.
    Token { text: String },
    /// Application-level failure reported in-band. Always the last event.
    Error { message: String },
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        StreamEvent::Token { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Terminal failures
// ---------------------------------------------------------------------------

/// Why a stream ended without completing. Written to the sink at most once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    /// The model reported an error inside the stream.
    #[error("generation failed: {0}")]
    Upstream(String),

    /// Pulling the next chunk from upstream failed.
    #[error("upstream connection lost: {0}")]
    ConnectionLost(String),

    /// No chunk arrived within the idle bound.
    #[error("upstream stalled: no data for {}ms", .0.as_millis())]
    Stalled(Duration),
}

impl StreamFailure {
    /// True when the failure was reported by the model rather than the transport.
    pub fn is_in_band(&self) -> bool {
        matches!(self, StreamFailure::Upstream(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamFailure::Upstream(_) => "upstream_error",
            StreamFailure::ConnectionLost(_) => "connection_lost",
            StreamFailure::Stalled(_) => "stalled",
        }
    }
}

// ---------------------------------------------------------------------------
// Pump outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Upstream finished cleanly; `tokens` fragments were delivered.
    Completed { tokens: usize },
    /// A terminal failure was delivered to the sink.
    Failed(StreamFailure),
    /// The downstream consumer went away. Nothing was reported.
    Cancelled,
}
