// Copyright 2026 The Inference Relay Project
// SPDX-License-Identifier: Apache-2.0

// NDJSON token decoder
//
// Turns raw upstream bytes into token/error events:
// - UTF-8 is decoded before line splitting; a character cut by a chunk
//   boundary waits for the rest of its bytes
// - One JSON object per line; blank lines are skipped
// - Malformed lines are logged and dropped, the stream goes on
// - An unterminated record longer than the record limit is dropped as
//   malformed, and the rest of it is skipped up to the next newline
// - An `error` record is the last event the decoder ever yields

use serde::Deserialize;

use super::types::StreamEvent;

/// Shape of one upstream record. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Stateful decoder for one stream. Not shared between sessions.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Decoded text holding at most one unterminated record.
    line_buffer: String,
    /// Prefix of `line_buffer` already known to hold no newline.
    scanned: usize,
    /// Inside a record that was dropped for length.
    skipping_oversized: bool,
    terminated: bool,
    consecutive_malformed: usize,
    malformed_limit: Option<usize>,
    max_record_bytes: Option<usize>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the stream after `limit` malformed records in a row.
    /// `None` (the default) tolerates any number.
    pub fn with_malformed_limit(mut self, limit: Option<usize>) -> Self {
        self.malformed_limit = limit;
        self
    }

    /// Bound the unterminated record held in memory. `None` (the default)
    /// leaves it unbounded.
    pub fn with_max_record_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_record_bytes = limit;
        self
    }

    /// True once an `Error` event has been produced.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feed the next chunk of upstream bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }
        self.decode_utf8(bytes);

        let mut events = Vec::new();
        self.drain_lines(&mut events);
        if !self.terminated {
            self.enforce_record_limit(&mut events);
        }
        if self.terminated {
            self.discard();
        }
        events
    }

    /// Flush the trailing unterminated record at end of stream.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.terminated {
            return Vec::new();
        }
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.line_buffer.push_str(&String::from_utf8_lossy(&tail));
        }

        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.line_buffer);
        if !self.skipping_oversized {
            self.process_line(&rest, &mut events);
        }
        self.discard();
        events
    }

    /// Process every complete line in `line_buffer`. Only text appended since
    /// the last call is searched for newlines.
    fn drain_lines(&mut self, events: &mut Vec<StreamEvent>) {
        let mut buffer = std::mem::take(&mut self.line_buffer);
        let mut start = 0;

        while !self.terminated {
            let Some(offset) = buffer[self.scanned..].find('\n') else {
                self.scanned = buffer.len();
                break;
            };
            let end = self.scanned + offset;
            if self.skipping_oversized {
                self.skipping_oversized = false;
            } else if self.exceeds_record_limit(end - start) {
                self.reject_oversized(end - start, events);
            } else {
                self.process_line(&buffer[start..end], events);
            }
            start = end + 1;
            self.scanned = start;
        }

        buffer.drain(..start);
        self.scanned -= start;
        self.line_buffer = buffer;
    }

    /// Called with no complete line left in `line_buffer`.
    fn enforce_record_limit(&mut self, events: &mut Vec<StreamEvent>) {
        let Some(limit) = self.max_record_bytes else {
            return;
        };
        if self.skipping_oversized {
            self.line_buffer.clear();
            self.scanned = 0;
            return;
        }
        if self.line_buffer.len() > limit {
            let len = self.line_buffer.len();
            self.line_buffer.clear();
            self.scanned = 0;
            self.skipping_oversized = true;
            self.reject_oversized(len, events);
        }
    }

    fn exceeds_record_limit(&self, len: usize) -> bool {
        self.max_record_bytes.is_some_and(|limit| len > limit)
    }

    fn reject_oversized(&mut self, len: usize, events: &mut Vec<StreamEvent>) {
        let limit = self.max_record_bytes.unwrap_or_default();
        self.reject(&format!("record exceeds {limit} bytes"), len, events);
    }

    /// Append `bytes`, moving every complete character into `line_buffer`.
    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut consumed = 0;

        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.line_buffer.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.line_buffer
                        .push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        Some(invalid) => {
                            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + invalid;
                        }
                        // Incomplete sequence at the end: keep it for the next chunk.
                        None => {
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match parse_record(line) {
            Ok(record) => {
                self.consecutive_malformed = 0;
                match record.error {
                    Some(serde_json::Value::Null) | None => {
                        events.push(StreamEvent::token(record.token.unwrap_or_default()));
                    }
                    Some(serde_json::Value::String(message)) => {
                        self.terminate(events, message);
                    }
                    Some(other) => {
                        self.terminate(events, other.to_string());
                    }
                }
            }
            Err(e) => self.reject(&e, line.len(), events),
        }
    }

    /// Count a malformed record and trip the breaker when it is armed.
    fn reject(&mut self, error: &str, line_len: usize, events: &mut Vec<StreamEvent>) {
        self.consecutive_malformed += 1;
        tracing::warn!(
            error = %error,
            line_len,
            consecutive = self.consecutive_malformed,
            "dropping malformed stream record"
        );
        if let Some(limit) = self.malformed_limit {
            if self.consecutive_malformed >= limit {
                self.terminate(
                    events,
                    format!("aborting stream after {limit} consecutive malformed records"),
                );
            }
        }
    }

    fn terminate(&mut self, events: &mut Vec<StreamEvent>, message: String) {
        events.push(StreamEvent::Error { message });
        self.terminated = true;
    }

    fn discard(&mut self) {
        self.pending.clear();
        self.line_buffer.clear();
        self.scanned = 0;
        self.skipping_oversized = false;
    }
}

/// Parse one line as a JSON object record. Arrays and scalars are rejected.
fn parse_record(line: &str) -> Result<Record, String> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("record is not a JSON object".to_string());
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Decode a complete body in one go.
#[cfg(test)]
pub(crate) fn decode_all(bytes: &[u8]) -> Vec<StreamEvent> {
    let mut decoder = NdjsonDecoder::new();
    let mut events = decoder.feed(bytes);
    events.extend(decoder.finish());
    events
}
