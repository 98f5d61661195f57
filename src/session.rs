// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// Relay session lifecycle.
//
// One session per downstream request. Tracks which phase the relay is in
// and carries the request id that ties the structured log lines together.
// Sessions share nothing with each other.

use std::time::{Duration, Instant};

use axum::http::Method;
use uuid::Uuid;

use crate::upstream::RelayRequest;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Phase of one relay operation.
///
/// ```text
/// Created -> Forwarding -> Buffering -> Completed
///                       \-> Streaming -> Completed
/// (any non-terminal state) -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Forwarding,
    Buffering,
    Streaming,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Whether `self -> next` is a legal step.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Created, Forwarding) => true,
            (Forwarding, Buffering) | (Forwarding, Streaming) => true,
            (Buffering, Completed) | (Streaming, Completed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Forwarding => "forwarding",
            SessionState::Buffering => "buffering",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

// ---------------------------------------------------------------------------
// RelaySession
// ---------------------------------------------------------------------------

/// Lifetime of one relay operation.
#[derive(Debug)]
pub struct RelaySession {
    id: Uuid,
    method: Method,
    path: String,
    state: SessionState,
    started: Instant,
}

impl RelaySession {
    /// Start a session for `request` in the `Created` state.
    pub fn new(request: &RelayRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: request.method.clone(),
            path: request.route().to_string(),
            state: SessionState::Created,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, rejecting anything the lifecycle does not allow.
    pub fn advance(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                request_id = %self.id,
                from = %self.state,
                to = %next,
                "rejected session transition"
            );
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::trace!(
            request_id = %self.id,
            from = %self.state,
            to = %next,
            "session transition"
        );
        self.state = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
