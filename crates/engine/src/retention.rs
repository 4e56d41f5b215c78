// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention collectors: permanent deletion of expired cold volumes and
//! expired evidence zips.
//!
//! Both sweeps run hourly (and once shortly after startup), and both can
//! be triggered synchronously through the operator GC endpoint. A missing
//! volume or missing zip is not an error — the row is marked deleted
//! either way. Cancellation is honored between items, never mid-item.

use crate::config::EngineConfig;
use crate::metrics::Metrics;
use hangar_core::{BundleStatus, Clock, WorkspaceState};
use hangar_sandbox::{SandboxDriver, SandboxError};
use hangar_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const STARTUP_SWEEP_DELAY: Duration = Duration::from_secs(10);

/// Counts from one manual or scheduled collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub workspaces_deleted: usize,
    pub bundles_deleted: usize,
}

pub struct RetentionCollector<S, D, C> {
    store: Arc<S>,
    driver: Arc<D>,
    clock: C,
    metrics: Metrics,
    config: EngineConfig,
}

impl<S: Store, D: SandboxDriver, C: Clock> RetentionCollector<S, D, C> {
    pub fn new(
        store: Arc<S>,
        driver: Arc<D>,
        clock: C,
        metrics: Metrics,
        config: EngineConfig,
    ) -> Self {
        Self { store, driver, clock, metrics, config }
    }

    /// Run both sweeps back to back.
    pub async fn collect(&self, cancel: &CancellationToken) -> SweepReport {
        SweepReport {
            workspaces_deleted: self.sweep_workspaces(cancel).await,
            bundles_deleted: self.sweep_evidence(cancel).await,
        }
    }

    /// Delete volumes of cold workspaces idle past `workspace_cold_ttl`.
    pub async fn sweep_workspaces(&self, cancel: &CancellationToken) -> usize {
        let cutoff = self.clock.now_utc() - self.config.workspace_cold_ttl;
        let expired = match self.store.list_cold_expired(cutoff).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!(error = %e, "workspace retention query failed");
                return 0;
            }
        };

        let mut deleted = 0;
        for mut workspace in expired {
            if cancel.is_cancelled() {
                break;
            }
            let Some(volume_name) = workspace.volume_name.clone() else { continue };
            match self.driver.delete_volume(&volume_name).await {
                Ok(()) | Err(SandboxError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(
                        workspace_id = %workspace.id,
                        volume = %volume_name,
                        error = %e,
                        "volume delete failed; leaving for next sweep"
                    );
                    continue;
                }
            }
            workspace.state = WorkspaceState::Deleted;
            workspace.volume_name = None;
            if let Err(e) = self.store.update_workspace(workspace.clone()).await {
                tracing::error!(workspace_id = %workspace.id, error = %e, "delete update failed");
                continue;
            }
            tracing::info!(workspace_id = %workspace.id, volume = %volume_name, "workspace deleted");
            self.metrics.incr("workspace_gc_total");
            deleted += 1;
        }
        deleted
    }

    /// Delete zips of ready bundles older than `evidence_ttl`.
    pub async fn sweep_evidence(&self, cancel: &CancellationToken) -> usize {
        let cutoff = self.clock.now_utc() - self.config.evidence_ttl;
        let expired = match self.store.list_expired_ready_bundles(cutoff).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!(error = %e, "evidence retention query failed");
                return 0;
            }
        };

        let mut deleted = 0;
        for mut bundle in expired {
            if cancel.is_cancelled() {
                break;
            }
            let Some(path) = bundle.bundle_path.clone() else { continue };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        bundle_id = %bundle.id,
                        path = %path.display(),
                        error = %e,
                        "zip delete failed; leaving for next sweep"
                    );
                    continue;
                }
            }
            bundle.status = BundleStatus::Deleted;
            bundle.bundle_path = None;
            bundle.updated_at = self.clock.now_utc();
            if let Err(e) = self.store.update_bundle(bundle.clone()).await {
                tracing::error!(bundle_id = %bundle.id, error = %e, "delete update failed");
                continue;
            }
            tracing::info!(bundle_id = %bundle.id, run_id = %bundle.run_id, "evidence deleted");
            self.metrics.incr("evidence_gc_total");
            deleted += 1;
        }
        deleted
    }

    /// Hourly collection loop with a post-startup kick.
    pub fn spawn(
        self,
        interval: Duration,
        startup_delay: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(startup_delay) => {}
            }
            self.collect(&cancel).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.collect(&cancel).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
