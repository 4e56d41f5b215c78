// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evidence bundle assembly.
//!
//! The durable queue is the `pending` bundle rows; a nudge channel only
//! wakes the worker early. One worker drains the queue, so two builds for
//! the same run can never race. For each run: pull the evidence directory
//! out of the sandbox, canonicalize the layout under a fresh `<run_id>/`
//! staging directory, add the control-plane metadata, and zip the result
//! into the evidence root. Temp staging is removed on every exit path.

pub mod zip;

use crate::metrics::Metrics;
use hangar_core::{BundleStatus, Clock, CoreError, EvidenceBundle, Run, RunId, Workspace};
use hangar_sandbox::SandboxDriver;
use hangar_storage::Store;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct EvidenceBuilder<S, D, C> {
    store: Arc<S>,
    driver: Arc<D>,
    clock: C,
    metrics: Metrics,
    evidence_root: PathBuf,
}

impl<S: Store, D: SandboxDriver, C: Clock> EvidenceBuilder<S, D, C> {
    pub fn new(
        store: Arc<S>,
        driver: Arc<D>,
        clock: C,
        metrics: Metrics,
        evidence_root: PathBuf,
    ) -> Self {
        Self { store, driver, clock, metrics, evidence_root }
    }

    /// Build the bundle for `run_id`. A row not in `pending` is a no-op,
    /// which makes the nudge channel and the poll loop safely redundant.
    pub async fn build(&self, run_id: RunId) -> Result<(), CoreError> {
        let Some(mut bundle) = self.store.get_bundle_for_run(run_id).await? else {
            return Err(CoreError::NotFound(format!("bundle for run {run_id}")));
        };
        if bundle.status != BundleStatus::Pending {
            return Ok(());
        }

        match self.assemble(&bundle).await {
            Ok(bundle_path) => {
                bundle.status = BundleStatus::Ready;
                bundle.bundle_path = Some(bundle_path.clone());
                bundle.error_message = None;
                bundle.updated_at = self.clock.now_utc();
                self.store.update_bundle(bundle).await?;
                self.metrics.incr_labeled("bundles_built_total", "status", "ready");
                tracing::info!(run_id = %run_id, path = %bundle_path.display(), "bundle ready");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                bundle.status = BundleStatus::Error;
                bundle.error_message = Some(message.clone());
                bundle.updated_at = self.clock.now_utc();
                if let Err(update_err) = self.store.update_bundle(bundle).await {
                    tracing::error!(run_id = %run_id, error = %update_err, "bundle error update failed");
                }
                self.metrics.incr_labeled("bundles_built_total", "status", "error");
                tracing::warn!(run_id = %run_id, error = %message, "bundle build failed");
                Err(CoreError::BundleFailure(message))
            }
        }
    }

    async fn assemble(&self, bundle: &EvidenceBundle) -> Result<PathBuf, CoreError> {
        let run = self
            .store
            .get_run(bundle.run_id)
            .await?
            .ok_or_else(|| CoreError::BundleFailure(format!("run {} missing", bundle.run_id)))?;
        let workspace = self
            .store
            .get_workspace(bundle.workspace_id)
            .await?
            .ok_or_else(|| {
                CoreError::BundleFailure(format!("workspace {} missing", bundle.workspace_id))
            })?;
        let container_id = workspace
            .container_id
            .clone()
            .ok_or_else(|| CoreError::BundleFailure("workspace container not available".into()))?;

        let evidence_dir = format!("/workspace/evidence/{}", run.id);
        let tarball = self
            .driver
            .get_archive(&container_id, &evidence_dir)
            .await
            .map_err(|e| CoreError::BundleFailure(format!("archive {evidence_dir}: {e}")))?;

        let temp = self.evidence_root.join("temp").join(run.id.to_string());
        let result = self.stage_and_zip(&temp, &run, &workspace, &tarball);
        if let Err(e) = std::fs::remove_dir_all(&temp) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %temp.display(), error = %e, "temp cleanup failed");
            }
        }
        result
    }

    fn stage_and_zip(
        &self,
        temp: &Path,
        run: &Run,
        workspace: &Workspace,
        tarball: &[u8],
    ) -> Result<PathBuf, CoreError> {
        let failure = |e: &dyn std::fmt::Display| CoreError::BundleFailure(e.to_string());

        let extract = temp.join("extract");
        std::fs::create_dir_all(&extract).map_err(|e| failure(&e))?;
        tar::Archive::new(tarball).unpack(&extract).map_err(|e| failure(&e))?;

        // Canonical layout: whatever shape the tar had, regular files are
        // flattened by name into a fresh `<run_id>/` directory.
        let stage = temp.join(run.id.to_string());
        std::fs::create_dir_all(&stage).map_err(|e| failure(&e))?;
        for file in collect_regular_files(&extract).map_err(|e| failure(&e))? {
            if let Some(name) = file.file_name() {
                std::fs::copy(&file, stage.join(name)).map_err(|e| failure(&e))?;
            }
        }

        let generated_at = self.clock.now_utc();
        let metadata = serde_json::json!({
            "run": run,
            "workspace": workspace,
            "generated_at": generated_at,
        });
        let env_snapshot = serde_json::json!({
            "runSnapshot": run.env_snapshot,
            "workspaceMetadata": workspace.runtime_metadata,
        });
        write_json(&stage.join("metadata.json"), &metadata).map_err(|e| failure(&e))?;
        write_json(&stage.join("env_snapshot.json"), &env_snapshot).map_err(|e| failure(&e))?;
        if let Some(diff) = run.diff.as_deref().filter(|d| !d.is_empty()) {
            std::fs::write(stage.join("diff.patch"), diff).map_err(|e| failure(&e))?;
        }

        if !stage.join("events.jsonl").exists() {
            return Err(CoreError::BundleFailure("events.jsonl missing from sandbox archive".into()));
        }

        let mut writer = zip::ZipWriter::new(generated_at);
        let mut names: Vec<PathBuf> =
            std::fs::read_dir(&stage).map_err(|e| failure(&e))?.filter_map(|entry| {
                entry.ok().map(|e| e.path()).filter(|p| p.is_file())
            }).collect();
        names.sort();
        for path in names {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let bytes = std::fs::read(&path).map_err(|e| failure(&e))?;
            writer
                .add_file(&format!("{}/{}", run.id, file_name), &bytes)
                .map_err(|e| failure(&e))?;
        }

        std::fs::create_dir_all(&self.evidence_root).map_err(|e| failure(&e))?;
        let zip_path = self.evidence_root.join(format!("{}.zip", run.id));
        let bytes = writer.finish().map_err(|e| failure(&e))?;
        std::fs::write(&zip_path, bytes).map_err(|e| failure(&e))?;
        Ok(zip_path)
    }

    /// Worker loop: drain nudges and poll for pending rows until canceled.
    pub fn spawn_worker(
        self,
        mut rx: mpsc::Receiver<RunId>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    nudge = rx.recv() => match nudge {
                        Some(run_id) => {
                            let _ = self.build(run_id).await;
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        let pending = match self.store.list_pending_bundles().await {
                            Ok(pending) => pending,
                            Err(e) => {
                                tracing::error!(error = %e, "pending bundle poll failed");
                                continue;
                            }
                        };
                        for bundle in pending {
                            if cancel.is_cancelled() {
                                break;
                            }
                            let _ = self.build(bundle.run_id).await;
                        }
                    }
                }
            }
        })
    }
}

fn write_json(path: &Path, value: &serde_json::Value) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    std::fs::write(path, bytes)
}

/// Every regular file anywhere under `root`, depth-first.
fn collect_regular_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
#[path = "evidence_tests.rs"]
mod tests;
