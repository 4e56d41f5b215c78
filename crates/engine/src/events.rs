// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event fan-out and token synthesis.
//!
//! [`EventSink`] feeds two destinations with the same events in the same
//! order: an optional transport channel (SSE) and an in-memory log flushed
//! as `events.jsonl` at run completion. A unary run uses a sink with the
//! transport disabled.
//!
//! [`split_tokens`] turns an agent's final text into `token` deltas. The
//! current worker does not stream, so tokens are synthesized here; a
//! native-streaming worker would feed the same sink without buffering and
//! the event schema would not change.

use hangar_core::{RunEvent, RunPayload};
use tokio::sync::mpsc;

pub struct EventSink {
    transport: Option<mpsc::Sender<RunEvent>>,
    /// Cleared when the client goes away; the log keeps filling either way.
    transport_open: bool,
    log: Vec<RunEvent>,
}

impl EventSink {
    /// Sink for a unary run: log only.
    pub fn unary() -> Self {
        Self { transport: None, transport_open: false, log: Vec::new() }
    }

    /// Sink for a streaming run: transport + log.
    pub fn streaming(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { transport: Some(tx), transport_open: true, log: Vec::new() }
    }

    pub fn has_transport(&self) -> bool {
        self.transport_open
    }

    /// Emit one event to both destinations.
    pub async fn emit(&mut self, event: RunEvent) {
        if self.transport_open {
            if let Some(tx) = &self.transport {
                if tx.send(event.clone()).await.is_err() {
                    // Client disconnected; stop writing to the transport but
                    // keep the log complete.
                    self.transport_open = false;
                }
            }
        }
        self.log.push(event);
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.log
    }

    /// True once a `run-complete` has been emitted.
    pub fn terminal_emitted(&self) -> bool {
        self.log.iter().any(|e| matches!(e.payload, RunPayload::RunComplete { .. }))
    }

    /// The complete log as newline-delimited JSON.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        hangar_core::event::to_jsonl(&self.log)
    }
}

/// Split `text` into whitespace-preserving tokens.
///
/// Runs of non-whitespace and runs of whitespace alternate as separate
/// deltas, so concatenating every delta reproduces `text` exactly.
pub fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_is_ws: Option<bool> = None;
    for ch in text.chars() {
        let is_ws = ch.is_whitespace();
        if current_is_ws != Some(is_ws) && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        current_is_ws = Some(is_ws);
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
