// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical run events.
//!
//! Every run emits exactly one `run-start` and exactly one `run-complete`,
//! with `run-complete` last. The same structs are serialized to the SSE
//! transport and to the `events.jsonl` log inside the sandbox, in the same
//! order. Type tags are kebab-case; fields are camelCase, matching the
//! HTTP surface.

use crate::id::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// stdout/stderr on `command-finished` are capped at 8 KiB each.
pub const COMMAND_OUTPUT_CAP: usize = 8 * 1024;

/// Terminal outcome carried by `run-complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    Timeout,
}

/// Aggregate shape of a diff, for transports that do not want the full text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub files_changed: u64,
    pub insertions: u64,
    pub deletions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RunPayload {
    RunStart,
    #[serde(rename_all = "camelCase")]
    Token { delta: String, sequence: u64 },
    #[serde(rename_all = "camelCase")]
    Diff {
        #[serde(skip_serializing_if = "Option::is_none")]
        diff: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        diff_summary: Option<DiffSummary>,
    },
    #[serde(rename_all = "camelCase")]
    CommandStarted { command: String, cwd: String },
    #[serde(rename_all = "camelCase")]
    CommandFinished {
        command: String,
        cwd: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    #[serde(rename_all = "camelCase")]
    RunComplete {
        status: RunOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl RunPayload {
    /// Wire name of the event, used for the SSE `event:` header line.
    pub fn type_name(&self) -> &'static str {
        match self {
            RunPayload::RunStart => "run-start",
            RunPayload::Token { .. } => "token",
            RunPayload::Diff { .. } => "diff",
            RunPayload::CommandStarted { .. } => "command-started",
            RunPayload::CommandFinished { .. } => "command-finished",
            RunPayload::RunComplete { .. } => "run-complete",
        }
    }

    /// Build a `command-finished` payload with outputs capped at
    /// [`COMMAND_OUTPUT_CAP`].
    pub fn command_finished(
        command: String,
        cwd: String,
        exit_code: i32,
        stdout: &str,
        stderr: &str,
    ) -> Self {
        RunPayload::CommandFinished {
            command,
            cwd,
            exit_code,
            stdout: truncate_utf8(stdout, COMMAND_OUTPUT_CAP),
            stderr: truncate_utf8(stderr, COMMAND_OUTPUT_CAP),
        }
    }
}

/// A canonical event: timestamp + run id + tagged payload, flattened into
/// a single JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub ts: DateTime<Utc>,
    pub run_id: RunId,
    #[serde(flatten)]
    pub payload: RunPayload,
}

impl RunEvent {
    pub fn new(ts: DateTime<Utc>, run_id: RunId, payload: RunPayload) -> Self {
        Self { ts, run_id, payload }
    }

    /// Single-line JSON, as written to `events.jsonl` and SSE `data:` frames.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Encode events as newline-delimited JSON in emission order.
pub fn to_jsonl(events: &[RunEvent]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for event in events {
        out.push_str(&event.to_json_line()?);
        out.push('\n');
    }
    Ok(out)
}

/// Truncate to at most `cap` bytes without splitting a UTF-8 sequence.
fn truncate_utf8(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
