// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lifecycle: open, stop, and per-user LRU eviction.
//!
//! `open` is the only path that warms a workspace. The single-warm
//! invariant is enforced by the store's row-locked open transaction;
//! container work happens after it, and a failure flips the row to
//! `error` in a second transaction.

use crate::config::EngineConfig;
use crate::metrics::Metrics;
use hangar_core::{
    Clock, CoreError, Project, ProjectId, UserId, Workspace, WorkspaceId, WorkspaceState,
};
use hangar_sandbox::{ContainerSpec, SandboxDriver, SandboxError, AGENT_PORT};
use hangar_storage::Store;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenResult {
    pub workspace_id: WorkspaceId,
    pub state: WorkspaceState,
}

pub struct WorkspaceService<S, D, C> {
    store: Arc<S>,
    driver: Arc<D>,
    clock: C,
    metrics: Metrics,
    config: EngineConfig,
}

impl<S: Store, D: SandboxDriver, C: Clock> WorkspaceService<S, D, C> {
    pub fn new(
        store: Arc<S>,
        driver: Arc<D>,
        clock: C,
        metrics: Metrics,
        config: EngineConfig,
    ) -> Self {
        Self { store, driver, clock, metrics, config }
    }

    /// Warm the workspace for `(user_id, project_id)`.
    ///
    /// Evicts the user's other warm workspaces (best-effort), then runs the
    /// sandbox path unless the target already has a live container.
    pub async fn open(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<OpenResult, CoreError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| CoreError::NotFound(format!("project {project_id}")))?;

        let txn = self.store.open_workspace(user_id, project_id, self.clock.now_utc()).await?;

        // LRU eviction: stop every other previously-warm container. Errors
        // are logged, never fatal to opening the target.
        for evicted in &txn.evicted {
            let Some(container_id) = &evicted.container_id else { continue };
            tracing::info!(
                workspace_id = %evicted.id,
                container_id = %container_id,
                "evicting warm workspace"
            );
            if let Err(e) = self.driver.stop_and_remove(container_id).await {
                tracing::warn!(workspace_id = %evicted.id, error = %e, "eviction stop failed");
            }
            self.metrics.incr("workspace_evictions_total");
        }

        let workspace = txn.target;

        // Idempotent fast path: already warm with a live container.
        if let Some(container_id) = &workspace.container_id {
            if self.driver.inspect(container_id).await.is_ok() {
                return Ok(OpenResult { workspace_id: workspace.id, state: workspace.state });
            }
            tracing::warn!(
                workspace_id = %workspace.id,
                container_id = %container_id,
                "recorded container is gone; re-provisioning"
            );
        }

        self.provision(&project, workspace).await
    }

    /// Stop a workspace's container and mark it cold, keeping `thread_id`
    /// and `volume_name`. Idempotent.
    pub async fn stop(&self, workspace_id: WorkspaceId) -> Result<(), CoreError> {
        let Some(mut workspace) = self.store.get_workspace(workspace_id).await? else {
            return Err(CoreError::NotFound(format!("workspace {workspace_id}")));
        };
        if workspace.state != WorkspaceState::Warm && workspace.container_id.is_none() {
            return Ok(());
        }
        if let Some(container_id) = &workspace.container_id {
            self.driver
                .stop_and_remove(container_id)
                .await
                .map_err(|e| CoreError::SandboxFailure(e.to_string()))?;
        }
        workspace.state = WorkspaceState::Cold;
        workspace.container_id = None;
        self.store.update_workspace(workspace).await?;
        Ok(())
    }

    /// The sandbox path: volume, container, clone, row update.
    async fn provision(
        &self,
        project: &Project,
        mut workspace: Workspace,
    ) -> Result<OpenResult, CoreError> {
        let volume_name = workspace
            .volume_name
            .clone()
            .ok_or_else(|| CoreError::Storage("open transaction left no volume name".into()))?;

        match self.provision_sandbox(project, &workspace, &volume_name).await {
            Ok((container_id, image_name, image_digest)) => {
                let now = self.clock.now_utc();
                workspace.state = WorkspaceState::Warm;
                workspace.container_id = Some(container_id.clone());
                workspace.image_name = Some(image_name.clone());
                workspace.image_digest = Some(image_digest.clone());
                workspace.runtime_metadata = Some(serde_json::json!({
                    "imageName": image_name,
                    "imageDigest": image_digest,
                    "volumeName": volume_name,
                    "repoUrl": project.repo_url,
                    "agentPort": AGENT_PORT,
                    "warmedAt": now,
                }));
                workspace.last_active_at = now;
                workspace.idle_expires_at = Some(now + self.config.warm_idle);
                self.store.update_workspace(workspace.clone()).await?;
                self.metrics.incr("workspaces_opened_total");
                tracing::info!(
                    workspace_id = %workspace.id,
                    container_id = %container_id,
                    "workspace warm"
                );
                Ok(OpenResult { workspace_id: workspace.id, state: WorkspaceState::Warm })
            }
            Err(e) => {
                workspace.state = WorkspaceState::Error;
                workspace.container_id = None;
                if let Err(update_err) = self.store.update_workspace(workspace.clone()).await {
                    tracing::error!(
                        workspace_id = %workspace.id,
                        error = %update_err,
                        "failed to record workspace error state"
                    );
                }
                self.metrics.incr("workspace_open_failures_total");
                Err(e)
            }
        }
    }

    async fn provision_sandbox(
        &self,
        project: &Project,
        workspace: &Workspace,
        volume_name: &str,
    ) -> Result<(String, String, String), CoreError> {
        retry_once(|| self.driver.ensure_volume(volume_name))
            .await
            .map_err(|e| CoreError::SandboxFailure(e.to_string()))?;

        let mut spec = ContainerSpec::new(&self.config.workspace_image, volume_name);
        if let Some(key) = &self.config.openai_api_key {
            spec = spec.with_env("OPENAI_API_KEY", key);
        }
        if let Some(mock) = &self.config.force_mock_codex {
            spec = spec.with_env("FORCE_MOCK_CODEX", mock);
        }
        if let Some(thread_id) = &workspace.thread_id {
            spec = spec.with_env("CODEX_THREAD_ID", thread_id);
        }

        let container_id = retry_once(|| self.driver.create_container(&spec))
            .await
            .map_err(|e| CoreError::SandboxFailure(e.to_string()))?;

        if let Err(e) = retry_once(|| self.driver.start_container(&container_id)).await {
            return Err(CoreError::SandboxFailure(format!("start container: {e}")));
        }

        let info = retry_once(|| self.driver.inspect(&container_id))
            .await
            .map_err(|e| CoreError::SandboxFailure(e.to_string()))?;

        // Clone on first warm only; the volume keeps the checkout afterwards.
        let clone_script = format!(
            "mkdir -p /workspace/repo && cd /workspace/repo && {{ [ -d .git ] || git clone {} . ; }}",
            project.repo_url
        );
        let argv = vec!["sh".to_string(), "-c".to_string(), clone_script];
        let output = self
            .driver
            .exec(&container_id, &argv, "/workspace")
            .await
            .map_err(|e| CoreError::SandboxFailure(e.to_string()))?;
        if !output.success() {
            tracing::error!(
                workspace_id = %workspace.id,
                exit_code = output.exit_code,
                stderr = %output.stderr,
                "repository clone failed; rolling back container"
            );
            if let Err(e) = self.driver.stop_and_remove(&container_id).await {
                tracing::warn!(container_id = %container_id, error = %e, "rollback failed");
            }
            return Err(CoreError::CloneFailure(format!(
                "git clone exited {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        Ok((container_id, info.image_name, info.image_digest))
    }
}

/// Retry a driver call once iff the first failure was transient.
async fn retry_once<T, F, Fut>(op: F) -> Result<T, SandboxError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, SandboxError>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "transient driver error; retrying once");
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
