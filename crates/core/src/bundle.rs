// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evidence bundle records.
//!
//! One bundle per run (unique on `run_id`). `pending → ready | error`,
//! and `ready → deleted` once retention removes the zip.

use crate::id::{BundleId, ProjectId, RunId, UserId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    Pending,
    Ready,
    Error,
    Deleted,
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BundleStatus::Pending => "pending",
            BundleStatus::Ready => "ready",
            BundleStatus::Error => "error",
            BundleStatus::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBundle {
    pub id: BundleId,
    pub run_id: RunId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub workspace_id: WorkspaceId,
    pub status: BundleStatus,
    pub bundle_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvidenceBundle {
    /// Fresh `pending` row for a run, inheriting the run's ownership triple.
    pub fn pending(
        run_id: RunId,
        user_id: UserId,
        project_id: ProjectId,
        workspace_id: WorkspaceId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BundleId::new(),
            run_id,
            user_id,
            project_id,
            workspace_id,
            status: BundleStatus::Pending,
            bundle_path: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
