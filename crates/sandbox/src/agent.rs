// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the agent worker running inside each sandbox.
//!
//! The worker exposes `POST /run` on the agent port. It owns writing
//! `command_log.jsonl` and `outputs.json` under
//! `/workspace/evidence/<runId>/`; the control plane only sends the prompt
//! and reads the reply.

use async_trait::async_trait;
use hangar_core::RunId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Worker answered with a non-2xx status.
    #[error("agent returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Request never completed (connect/read failure, bad JSON).
    #[error("agent transport error: {0}")]
    Transport(String),
}

/// Body of `POST /run`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub text: String,
    pub run_id: RunId,
}

/// Reply from the worker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub final_text: String,
    #[serde(default)]
    pub diff: String,
    pub thread_id: String,
    #[serde(default)]
    pub git_commit: Option<String>,
    /// Shell commands the agent ran, when the worker reports them. Never
    /// synthesized by the control plane.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<AgentCommand>,
}

/// One command record passed through to the event stream.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCommand {
    pub command: String,
    pub cwd: String,
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// Executes one prompt against the worker reachable at `addr`
/// (`host:port`). The hard per-run timeout is enforced by the caller, not
/// here.
#[async_trait]
pub trait AgentClient: Send + Sync + 'static {
    async fn execute(&self, addr: &str, request: AgentRequest) -> Result<AgentReply, AgentError>;
}

/// HTTP implementation of the worker protocol.
#[derive(Clone)]
pub struct HttpAgentClient {
    client: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpAgentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn execute(&self, addr: &str, request: AgentRequest) -> Result<AgentReply, AgentError> {
        let url = format!("http://{addr}/run");
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status { status: status.as_u16(), body });
        }
        response.json::<AgentReply>().await.map_err(|e| AgentError::Transport(e.to_string()))
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
