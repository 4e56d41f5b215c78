// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Store` trait: what the engine requires from persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hangar_core::{
    ApiKey, CoreError, EvidenceBundle, Project, ProjectId, Run, RunId, User, UserId, Workspace,
    WorkspaceId,
};
use thiserror::Error;

/// Errors from store operations. I/O failures surface upward; the engine
/// never retries them silently.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        CoreError::Storage(e.to_string())
    }
}

/// Result of the transactional workspace open.
///
/// `evicted` holds the pre-flip snapshots of every *other* workspace of the
/// user that was warm — the caller still owns stopping their containers
/// (best-effort). The rows themselves have already been flipped cold with
/// `container_id` cleared.
#[derive(Debug, Clone)]
pub struct OpenTxn {
    pub target: Workspace,
    pub evicted: Vec<Workspace>,
}

/// Relational persistence for the six control-plane entities.
///
/// Implementations must make every method atomic: concurrent calls may
/// interleave between methods, never inside one.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // --- users & credentials -------------------------------------------

    async fn create_user(&self, user: User) -> Result<(), StoreError>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    async fn create_api_key(&self, key: ApiKey) -> Result<(), StoreError>;
    /// Resolve an unrevoked credential to its owner.
    async fn find_user_by_token_hash(&self, token_hash: &str)
        -> Result<Option<User>, StoreError>;

    // --- projects ------------------------------------------------------

    async fn create_project(&self, project: Project) -> Result<(), StoreError>;
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;
    async fn list_projects(&self, user_id: UserId) -> Result<Vec<Project>, StoreError>;

    // --- workspaces ----------------------------------------------------

    async fn get_workspace(&self, id: WorkspaceId) -> Result<Option<Workspace>, StoreError>;
    async fn find_workspace(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<Option<Workspace>, StoreError>;

    /// Row-locked open keyed on `(user_id, project_id)`.
    ///
    /// In one transaction: select-for-update every warm workspace of the
    /// user, flip the non-target ones cold (clearing `container_id`), and
    /// upsert the target to `warm`. A target row is created on first open
    /// with a freshly allocated volume name; a row whose volume was
    /// retention-deleted gets a new volume allocated. This is the only
    /// reliable enforcement of the one-warm-workspace-per-user invariant.
    async fn open_workspace(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        now: DateTime<Utc>,
    ) -> Result<OpenTxn, StoreError>;

    /// Full-row update keyed on `workspace.id`.
    async fn update_workspace(&self, workspace: Workspace) -> Result<(), StoreError>;

    /// Warm workspaces whose idle deadline has passed (idle-reaper input).
    async fn list_idle_expired(&self, now: DateTime<Utc>) -> Result<Vec<Workspace>, StoreError>;

    /// Cold workspaces idle past the retention cutoff, volume still present.
    async fn list_cold_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Workspace>, StoreError>;

    // --- runs ----------------------------------------------------------

    async fn insert_run(&self, run: Run) -> Result<(), StoreError>;
    async fn update_run(&self, run: Run) -> Result<(), StoreError>;
    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError>;
    /// Runs for a project, newest first.
    async fn list_runs(&self, project_id: ProjectId, limit: usize)
        -> Result<Vec<Run>, StoreError>;
    /// Count of the user's runs with `started_at >= since` (quota input).
    async fn count_runs_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // --- evidence bundles ----------------------------------------------

    /// Insert a `pending` bundle row unless one already exists for the run
    /// (unique on `run_id`); returns the row that is now current.
    async fn upsert_pending_bundle(
        &self,
        bundle: EvidenceBundle,
    ) -> Result<EvidenceBundle, StoreError>;
    async fn get_bundle_for_run(&self, run_id: RunId)
        -> Result<Option<EvidenceBundle>, StoreError>;
    async fn update_bundle(&self, bundle: EvidenceBundle) -> Result<(), StoreError>;
    /// Durable build queue: every bundle still `pending`.
    async fn list_pending_bundles(&self) -> Result<Vec<EvidenceBundle>, StoreError>;
    /// Ready bundles created before the retention cutoff, file still on disk.
    async fn list_expired_ready_bundles(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EvidenceBundle>, StoreError>;
}
