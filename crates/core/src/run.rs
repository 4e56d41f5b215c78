// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run records: one row per prompt invocation.

use crate::id::{ProjectId, RunId, UserId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Timeout,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub workspace_id: WorkspaceId,
    pub status: RunStatus,
    pub prompt: String,
    pub final_text: Option<String>,
    pub diff: Option<String>,
    pub test_output: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub git_commit: Option<String>,
    pub image_name: Option<String>,
    pub image_digest: Option<String>,
    /// Copied from the workspace's `runtime_metadata` at creation, augmented
    /// with the evidence pointer on completion.
    pub env_snapshot: Option<serde_json::Value>,
}

impl Run {
    /// Fresh `running` row. Terminal fields stay unset until completion.
    pub fn started(
        id: RunId,
        user_id: UserId,
        project_id: ProjectId,
        workspace_id: WorkspaceId,
        prompt: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            project_id,
            workspace_id,
            status: RunStatus::Running,
            prompt,
            final_text: None,
            diff: None,
            test_output: None,
            error_message: None,
            started_at,
            finished_at: None,
            duration_ms: None,
            input_tokens: None,
            output_tokens: None,
            git_commit: None,
            image_name: None,
            image_digest: None,
            env_snapshot: None,
        }
    }
}
