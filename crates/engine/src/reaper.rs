// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle reaper: cools warm workspaces past their idle deadline.
//!
//! Stops the container, marks the row cold, and leaves `thread_id` and
//! `volume_name` untouched so the next open resumes the same conversation
//! on the same checkout. Per-workspace errors are logged and skipped; the
//! sweep never halts.

use crate::metrics::Metrics;
use hangar_core::{Clock, WorkspaceState};
use hangar_sandbox::SandboxDriver;
use hangar_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

pub struct IdleReaper<S, D, C> {
    store: Arc<S>,
    driver: Arc<D>,
    clock: C,
    metrics: Metrics,
}

impl<S: Store, D: SandboxDriver, C: Clock> IdleReaper<S, D, C> {
    pub fn new(store: Arc<S>, driver: Arc<D>, clock: C, metrics: Metrics) -> Self {
        Self { store, driver, clock, metrics }
    }

    /// One sweep. Returns the number of workspaces cooled.
    pub async fn run_once(&self) -> usize {
        let now = self.clock.now_utc();
        let expired = match self.store.list_idle_expired(now).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!(error = %e, "idle sweep query failed");
                return 0;
            }
        };

        let mut reaped = 0;
        for mut workspace in expired {
            let Some(container_id) = workspace.container_id.clone() else { continue };
            if let Err(e) = self.driver.stop_and_remove(&container_id).await {
                tracing::warn!(
                    workspace_id = %workspace.id,
                    error = %e,
                    "idle stop failed; will retry next tick"
                );
                continue;
            }
            workspace.state = WorkspaceState::Cold;
            workspace.container_id = None;
            if let Err(e) = self.store.update_workspace(workspace.clone()).await {
                tracing::error!(workspace_id = %workspace.id, error = %e, "cold update failed");
                continue;
            }
            tracing::info!(workspace_id = %workspace.id, "workspace cooled");
            self.metrics.incr("idle_reaped_total");
            reaped += 1;
        }
        reaped
    }

    /// Run sweeps on `interval` until `cancel` fires.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
