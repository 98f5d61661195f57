// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// Stream pump
//
// Pulls chunks from the upstream body, runs them through the decoder and
// writes each token fragment to the sink as soon as it is decoded. The sink
// applies backpressure: no chunk is pulled while a write is pending.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::decoder::NdjsonDecoder;
use super::types::{PumpOutcome, StreamEvent, StreamFailure};
use crate::upstream::{ByteStream, UpstreamBody};

// ---------------------------------------------------------------------------
// Trait: TokenSink
// ---------------------------------------------------------------------------

/// The downstream consumer went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("downstream sink closed")]
pub struct SinkClosed;

/// Destination of forwarded fragments.
///
/// The sink is closed when its owner drops it.
#[async_trait]
pub trait TokenSink: Send + Sync {
    /// Deliver one fragment. Waits while the consumer is behind.
    async fn send_token(&mut self, text: String) -> Result<(), SinkClosed>;

    /// Deliver the terminal failure. Called at most once per stream.
    async fn send_failure(&mut self, failure: StreamFailure) -> Result<(), SinkClosed>;

    /// Mark a clean end of stream. Called at most once, never after a failure.
    async fn send_complete(&mut self) -> Result<(), SinkClosed> {
        Ok(())
    }

    /// Resolves once the consumer has gone away. Never resolves by default.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

/// Item carried by a [`ChannelSink`]. Every stream that is not cancelled
/// ends with exactly one `Completed` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkItem {
    Token(Bytes),
    Completed,
    Failed(StreamFailure),
}

/// Sink backed by a bounded channel. The receiving half usually becomes the
/// downstream response body.
pub struct ChannelSink {
    tx: mpsc::Sender<SinkItem>,
}

impl ChannelSink {
    /// Create a sink holding at most `capacity` undelivered items.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SinkItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn send(&self, item: SinkItem) -> Result<(), SinkClosed> {
        self.tx.send(item).await.map_err(|_| SinkClosed)
    }
}

#[async_trait]
impl TokenSink for ChannelSink {
    async fn send_token(&mut self, text: String) -> Result<(), SinkClosed> {
        self.send(SinkItem::Token(Bytes::from(text))).await
    }

    async fn send_failure(&mut self, failure: StreamFailure) -> Result<(), SinkClosed> {
        self.send(SinkItem::Failed(failure)).await
    }

    async fn send_complete(&mut self) -> Result<(), SinkClosed> {
        self.send(SinkItem::Completed).await
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

// ---------------------------------------------------------------------------
// StreamPump
// ---------------------------------------------------------------------------

/// Result of one pull from upstream.
enum Pulled {
    Chunk(Bytes),
    End,
    Lost(String),
    Stalled(Duration),
}

/// Whether to keep pulling after forwarding a batch of events.
enum Flow {
    Continue,
    Stop(PumpOutcome),
}

/// Drives one streamed relay from upstream body to sink.
#[derive(Debug, Clone, Default)]
pub struct StreamPump {
    idle_timeout: Option<Duration>,
    malformed_limit: Option<usize>,
    max_record_bytes: Option<usize>,
}

impl StreamPump {
    pub fn new(idle_timeout: Option<Duration>, malformed_limit: Option<usize>) -> Self {
        Self {
            idle_timeout,
            malformed_limit,
            max_record_bytes: None,
        }
    }

    /// Drop unterminated records once they grow past `limit` bytes.
    pub fn with_max_record_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_record_bytes = limit;
        self
    }

    /// Relay `body` into `sink` until upstream ends, fails, reports an
    /// error, or the sink goes away. The upstream body is dropped (and its
    /// connection released) before this returns.
    pub async fn run<S>(&self, body: UpstreamBody, sink: &mut S) -> PumpOutcome
    where
        S: TokenSink + ?Sized,
    {
        let mut decoder = NdjsonDecoder::new()
            .with_malformed_limit(self.malformed_limit)
            .with_max_record_bytes(self.max_record_bytes);
        let mut upstream = body.into_stream();
        let mut tokens = 0usize;

        loop {
            let pulled = tokio::select! {
                pulled = self.pull(&mut upstream) => pulled,
                _ = sink.closed() => return PumpOutcome::Cancelled,
            };

            let (events, at_end) = match pulled {
                Pulled::Chunk(chunk) => (decoder.feed(&chunk), false),
                Pulled::End => (decoder.finish(), true),
                Pulled::Lost(reason) => {
                    return report(sink, StreamFailure::ConnectionLost(reason)).await;
                }
                Pulled::Stalled(idle) => {
                    return report(sink, StreamFailure::Stalled(idle)).await;
                }
            };

            match forward(events, sink, &mut tokens).await {
                Flow::Continue if at_end => {
                    return match sink.send_complete().await {
                        Ok(()) => PumpOutcome::Completed { tokens },
                        Err(SinkClosed) => PumpOutcome::Cancelled,
                    };
                }
                Flow::Continue => {}
                Flow::Stop(outcome) => return outcome,
            }
        }
    }

    async fn pull(&self, upstream: &mut ByteStream) -> Pulled {
        let next = match self.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, upstream.next()).await {
                Ok(next) => next,
                Err(_) => return Pulled::Stalled(limit),
            },
            None => upstream.next().await,
        };

        match next {
            Some(Ok(chunk)) => Pulled::Chunk(chunk),
            Some(Err(e)) => Pulled::Lost(e.to_string()),
            None => Pulled::End,
        }
    }
}

/// Write decoded events in order, one sink write per token.
async fn forward<S>(events: Vec<StreamEvent>, sink: &mut S, tokens: &mut usize) -> Flow
where
    S: TokenSink + ?Sized,
{
    for event in events {
        match event {
            StreamEvent::Token { text } if text.is_empty() => {}
            StreamEvent::Token { text } => {
                if sink.send_token(text).await.is_err() {
                    return Flow::Stop(PumpOutcome::Cancelled);
                }
                *tokens += 1;
            }
            StreamEvent::Error { message } => {
                return Flow::Stop(report(sink, StreamFailure::Upstream(message)).await);
            }
        }
    }
    Flow::Continue
}

async fn report<S>(sink: &mut S, failure: StreamFailure) -> PumpOutcome
where
    S: TokenSink + ?Sized,
{
    match sink.send_failure(failure.clone()).await {
        Ok(()) => PumpOutcome::Failed(failure),
        Err(SinkClosed) => PumpOutcome::Cancelled,
    }
}
