// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process store: all tables behind one mutex.
//!
//! Holding a single lock for the duration of each call gives every trait
//! method the same atomicity a relational backend provides with
//! transactions and row locks. No await happens while the lock is held.

use crate::store::{OpenTxn, Store, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hangar_core::{
    ApiKey, ApiKeyId, BundleId, EvidenceBundle, Project, ProjectId, Run, RunId, User, UserId,
    Workspace, WorkspaceId, WorkspaceState,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    api_keys: HashMap<ApiKeyId, ApiKey>,
    projects: HashMap<ProjectId, Project>,
    workspaces: HashMap<WorkspaceId, Workspace>,
    runs: HashMap<RunId, Run>,
    bundles: HashMap<BundleId, EvidenceBundle>,
    /// Unique constraint on `evidence_bundles.run_id`.
    bundle_by_run: HashMap<RunId, BundleId>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: User) -> Result<(), StoreError> {
        let mut t = self.inner.lock();
        if t.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} exists", user.id)));
        }
        t.users.insert(user.id, user);
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn create_api_key(&self, key: ApiKey) -> Result<(), StoreError> {
        let mut t = self.inner.lock();
        if !t.users.contains_key(&key.user_id) {
            return Err(StoreError::NotFound(format!("user {}", key.user_id)));
        }
        t.api_keys.insert(key.id, key);
        Ok(())
    }

    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let t = self.inner.lock();
        let user = t
            .api_keys
            .values()
            .find(|k| k.token_hash == token_hash && !k.is_revoked())
            .and_then(|k| t.users.get(&k.user_id))
            .cloned();
        Ok(user)
    }

    async fn create_project(&self, project: Project) -> Result<(), StoreError> {
        let mut t = self.inner.lock();
        if !t.users.contains_key(&project.user_id) {
            return Err(StoreError::NotFound(format!("user {}", project.user_id)));
        }
        if t.projects.contains_key(&project.id) {
            return Err(StoreError::Conflict(format!("project {} exists", project.id)));
        }
        t.projects.insert(project.id, project);
        Ok(())
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.inner.lock().projects.get(&id).cloned())
    }

    async fn list_projects(&self, user_id: UserId) -> Result<Vec<Project>, StoreError> {
        let t = self.inner.lock();
        let mut projects: Vec<Project> =
            t.projects.values().filter(|p| p.user_id == user_id).cloned().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(projects)
    }

    async fn get_workspace(&self, id: WorkspaceId) -> Result<Option<Workspace>, StoreError> {
        Ok(self.inner.lock().workspaces.get(&id).cloned())
    }

    async fn find_workspace(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<Option<Workspace>, StoreError> {
        let t = self.inner.lock();
        Ok(t.workspaces
            .values()
            .find(|w| w.user_id == user_id && w.project_id == project_id)
            .cloned())
    }

    async fn open_workspace(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        now: DateTime<Utc>,
    ) -> Result<OpenTxn, StoreError> {
        let mut t = self.inner.lock();

        // Flip every other warm workspace of this user cold, returning the
        // pre-flip snapshots so the caller can stop their containers.
        let evicted_ids: Vec<WorkspaceId> = t
            .workspaces
            .values()
            .filter(|w| {
                w.user_id == user_id
                    && w.project_id != project_id
                    && w.state == WorkspaceState::Warm
            })
            .map(|w| w.id)
            .collect();
        let mut evicted = Vec::with_capacity(evicted_ids.len());
        for id in evicted_ids {
            if let Some(w) = t.workspaces.get_mut(&id) {
                evicted.push(w.clone());
                w.state = WorkspaceState::Cold;
                w.container_id = None;
            }
        }

        let existing = t
            .workspaces
            .values()
            .find(|w| w.user_id == user_id && w.project_id == project_id)
            .cloned();
        let target = match existing {
            Some(mut w) => {
                w.state = WorkspaceState::Warm;
                if w.volume_name.is_none() {
                    // Volume was retention-deleted; allocate a fresh one.
                    w.volume_name = Some(Workspace::volume_name_for(&w.id));
                }
                w.last_active_at = now;
                t.workspaces.insert(w.id, w.clone());
                w
            }
            None => {
                let id = WorkspaceId::new();
                let w = Workspace {
                    id,
                    user_id,
                    project_id,
                    state: WorkspaceState::Warm,
                    container_id: None,
                    volume_name: Some(Workspace::volume_name_for(&id)),
                    thread_id: None,
                    image_name: None,
                    image_digest: None,
                    runtime_metadata: None,
                    last_active_at: now,
                    idle_expires_at: None,
                };
                t.workspaces.insert(id, w.clone());
                w
            }
        };

        Ok(OpenTxn { target, evicted })
    }

    async fn update_workspace(&self, workspace: Workspace) -> Result<(), StoreError> {
        let mut t = self.inner.lock();
        if !t.workspaces.contains_key(&workspace.id) {
            return Err(StoreError::NotFound(format!("workspace {}", workspace.id)));
        }
        t.workspaces.insert(workspace.id, workspace);
        Ok(())
    }

    async fn list_idle_expired(&self, now: DateTime<Utc>) -> Result<Vec<Workspace>, StoreError> {
        let t = self.inner.lock();
        Ok(t.workspaces
            .values()
            .filter(|w| {
                w.state == WorkspaceState::Warm
                    && w.container_id.is_some()
                    && w.idle_expires_at.is_some_and(|at| at < now)
            })
            .cloned()
            .collect())
    }

    async fn list_cold_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Workspace>, StoreError> {
        let t = self.inner.lock();
        Ok(t.workspaces
            .values()
            .filter(|w| {
                w.state == WorkspaceState::Cold
                    && w.volume_name.is_some()
                    && w.last_active_at < cutoff
            })
            .cloned()
            .collect())
    }

    async fn insert_run(&self, run: Run) -> Result<(), StoreError> {
        let mut t = self.inner.lock();
        if t.runs.contains_key(&run.id) {
            return Err(StoreError::Conflict(format!("run {} exists", run.id)));
        }
        t.runs.insert(run.id, run);
        Ok(())
    }

    async fn update_run(&self, run: Run) -> Result<(), StoreError> {
        let mut t = self.inner.lock();
        if !t.runs.contains_key(&run.id) {
            return Err(StoreError::NotFound(format!("run {}", run.id)));
        }
        t.runs.insert(run.id, run);
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.inner.lock().runs.get(&id).cloned())
    }

    async fn list_runs(
        &self,
        project_id: ProjectId,
        limit: usize,
    ) -> Result<Vec<Run>, StoreError> {
        let t = self.inner.lock();
        let mut runs: Vec<Run> =
            t.runs.values().filter(|r| r.project_id == project_id).cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn count_runs_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let t = self.inner.lock();
        Ok(t.runs.values().filter(|r| r.user_id == user_id && r.started_at >= since).count()
            as u64)
    }

    async fn upsert_pending_bundle(
        &self,
        bundle: EvidenceBundle,
    ) -> Result<EvidenceBundle, StoreError> {
        let mut t = self.inner.lock();
        if let Some(existing_id) = t.bundle_by_run.get(&bundle.run_id) {
            if let Some(existing) = t.bundles.get(existing_id) {
                return Ok(existing.clone());
            }
        }
        t.bundle_by_run.insert(bundle.run_id, bundle.id);
        t.bundles.insert(bundle.id, bundle.clone());
        Ok(bundle)
    }

    async fn get_bundle_for_run(
        &self,
        run_id: RunId,
    ) -> Result<Option<EvidenceBundle>, StoreError> {
        let t = self.inner.lock();
        Ok(t.bundle_by_run.get(&run_id).and_then(|id| t.bundles.get(id)).cloned())
    }

    async fn update_bundle(&self, bundle: EvidenceBundle) -> Result<(), StoreError> {
        let mut t = self.inner.lock();
        if !t.bundles.contains_key(&bundle.id) {
            return Err(StoreError::NotFound(format!("bundle {}", bundle.id)));
        }
        t.bundles.insert(bundle.id, bundle);
        Ok(())
    }

    async fn list_pending_bundles(&self) -> Result<Vec<EvidenceBundle>, StoreError> {
        let t = self.inner.lock();
        let mut pending: Vec<EvidenceBundle> = t
            .bundles
            .values()
            .filter(|b| b.status == hangar_core::BundleStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    async fn list_expired_ready_bundles(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EvidenceBundle>, StoreError> {
        let t = self.inner.lock();
        Ok(t.bundles
            .values()
            .filter(|b| {
                b.status == hangar_core::BundleStatus::Ready
                    && b.bundle_path.is_some()
                    && b.created_at < cutoff
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
