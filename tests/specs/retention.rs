// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention specs: the operator GC endpoint and the metrics counters.

use crate::prelude::*;
use hangar_core::{BundleStatus, RunId, WorkspaceState};
use hangar_storage::Store;
use std::time::Duration;

#[tokio::test]
async fn gc_deletes_expired_volumes_and_bundles() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    let opened = spec.open(&project).await;
    let workspace_id =
        hangar_core::WorkspaceId::parse(opened["workspaceId"].as_str().unwrap()).unwrap();

    // A run whose bundle goes ready
    let (status, body) = spec.message(&project, "create hello.txt").await;
    assert_eq!(status, 200);
    let run_id = RunId::parse(body["runId"].as_str().unwrap()).unwrap();
    let spec_ref = &spec;
    let ready = wait_for(Duration::from_secs(2), move || async move {
        matches!(
            spec_ref.store.get_bundle_for_run(run_id).await.unwrap(),
            Some(bundle) if bundle.status == BundleStatus::Ready
        )
    })
    .await;
    assert!(ready);

    // Age everything past both TTLs: workspace cold + idle for 31 days,
    // bundle created 181 days ago.
    let mut workspace = spec.store.get_workspace(workspace_id).await.unwrap().unwrap();
    workspace.state = WorkspaceState::Cold;
    workspace.container_id = None;
    workspace.last_active_at = chrono::Utc::now() - chrono::Duration::days(31);
    spec.store.update_workspace(workspace).await.unwrap();

    let mut bundle = spec.store.get_bundle_for_run(run_id).await.unwrap().unwrap();
    bundle.created_at = chrono::Utc::now() - chrono::Duration::days(181);
    spec.store.update_bundle(bundle.clone()).await.unwrap();
    let zip_path = bundle.bundle_path.unwrap();
    assert!(zip_path.exists());

    let (status, report) = spec.post("/ops/gc", serde_json::json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(report["workspacesDeleted"], 1);
    assert_eq!(report["bundlesDeleted"], 1);

    let workspace = spec.store.get_workspace(workspace_id).await.unwrap().unwrap();
    assert_eq!(workspace.state, WorkspaceState::Deleted);
    assert_eq!(workspace.volume_name, None);
    assert!(!zip_path.exists());
    let bundle = spec.store.get_bundle_for_run(run_id).await.unwrap().unwrap();
    assert_eq!(bundle.status, BundleStatus::Deleted);

    // Idempotent: a second collection finds nothing
    let (_, report) = spec.post("/ops/gc", serde_json::json!({})).await;
    assert_eq!(report["workspacesDeleted"], 0);
    assert_eq!(report["bundlesDeleted"], 0);

    // Evidence of a deleted bundle is gone
    let (status, _) = spec.get(&format!("/runs/{run_id}/evidence")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn metrics_expose_run_and_gc_counters() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;
    let (status, _) = spec.message(&project, "say hi").await;
    assert_eq!(status, 200);

    let (status, metrics) = spec.get("/metrics").await;
    assert_eq!(status, 200);
    assert_eq!(metrics["runs_total{status=\"succeeded\"}"], 1);
    assert_eq!(metrics["workspaces_opened_total"], 1);

    let (status, _) = spec.get_as("/metrics", "bogus").await;
    assert_eq!(status, 401);
}
