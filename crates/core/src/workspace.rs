// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lifecycle record.
//!
//! A workspace is the durable handle to one sandbox: exactly one row per
//! `(user_id, project_id)` pair. The state machine is:
//!
//! ```text
//! (none) --open--> warm
//! warm  --idle reap / LRU evict--> cold    (container stopped; volume, thread kept)
//! cold  --open--> warm                     (new container, same volume + thread)
//! cold  --retention--> deleted             (volume removed)
//! warm  --start failure--> error
//! ```

use crate::id::{ProjectId, UserId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceState {
    Warm,
    Cold,
    Deleted,
    Error,
}

impl std::fmt::Display for WorkspaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkspaceState::Warm => "warm",
            WorkspaceState::Cold => "cold",
            WorkspaceState::Deleted => "deleted",
            WorkspaceState::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub state: WorkspaceState,
    /// Non-null only in state `warm`.
    pub container_id: Option<String>,
    /// Allocated at first warm; nulled only on transition to `deleted`.
    pub volume_name: Option<String>,
    /// Agent conversation context, carried across cold/warm cycles.
    pub thread_id: Option<String>,
    pub image_name: Option<String>,
    pub image_digest: Option<String>,
    /// Environment snapshot captured when the sandbox was created.
    pub runtime_metadata: Option<serde_json::Value>,
    pub last_active_at: DateTime<Utc>,
    pub idle_expires_at: Option<DateTime<Utc>>,
}

impl Workspace {
    /// Volume naming scheme: fixed for the lifetime of the row.
    pub fn volume_name_for(id: &WorkspaceId) -> String {
        format!("ws-{id}")
    }
}
