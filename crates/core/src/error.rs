// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy surfaced by the orchestration core.
//!
//! Transport mapping (HTTP status codes) happens in the daemon; the core
//! only distinguishes the kinds.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Target row does not exist or is not visible to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credential missing or invalid; produced by the auth layer.
    #[error("unauthorized")]
    Unauthorized,

    /// Daily run limit reached. No run row is created.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// A prompt was sent but the project's workspace is not warm.
    #[error("workspace not warm")]
    NoWarmWorkspace,

    /// Sandbox driver call failed (create/start/exec/archive).
    #[error("sandbox failure: {0}")]
    SandboxFailure(String),

    /// Initial repository clone exited non-zero.
    #[error("clone failure: {0}")]
    CloneFailure(String),

    /// Agent exceeded the hard per-run timeout.
    #[error("agent timed out after {0}ms")]
    AgentTimeout(u64),

    /// Agent returned non-2xx or the transport failed.
    #[error("agent failure: {0}")]
    AgentFailure(String),

    /// Evidence assembly failed; the run's own status is unaffected.
    #[error("bundle failure: {0}")]
    BundleFailure(String),

    /// Caller's context was canceled.
    #[error("canceled")]
    Canceled,

    /// Persistence failure, surfaced upward without retry.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Message stored in `runs.error_message` / emitted on `run-complete`.
    pub fn run_error_message(&self) -> String {
        match self {
            CoreError::QuotaExceeded => "quota_exceeded".to_string(),
            CoreError::Canceled => "canceled".to_string(),
            other => other.to_string(),
        }
    }
}
