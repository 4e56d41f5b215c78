// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lifecycle specs: auth, open idempotence, per-user LRU, and
//! idle reaping.

use crate::prelude::*;
use hangar_core::WorkspaceState;
use hangar_sandbox::SandboxError;
use hangar_storage::Store;
use std::time::Duration;

#[tokio::test]
async fn healthz_needs_no_credential() {
    let spec = Spec::start().await;
    let response =
        spec.client.get(format!("{}/healthz", spec.base)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn everything_else_rejects_missing_or_bogus_tokens() {
    let spec = Spec::start().await;
    let bare = spec.client.get(format!("{}/projects", spec.base)).send().await.unwrap();
    assert_eq!(bare.status(), 401);

    let (status, _) = spec.get_as("/projects", "not-a-real-token").await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn projects_are_scoped_to_their_owner() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;

    let (status, body) = spec.get("/projects").await;
    assert_eq!(status, 200);
    assert_eq!(body["projects"].as_array().unwrap().len(), 1);

    let (_, stranger_token) = spec.seed_user("stranger").await;
    let (status, body) = spec.get_as("/projects", &stranger_token).await;
    assert_eq!(status, 200);
    assert_eq!(body["projects"].as_array().unwrap().len(), 0);

    let (status, _) = spec
        .post_as(
            &format!("/projects/{project}/open"),
            serde_json::json!({}),
            &stranger_token,
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn open_twice_returns_the_same_workspace_and_one_container() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;

    let first = spec.open(&project).await;
    assert_eq!(first["state"], "warm");
    let second = spec.open(&project).await;
    assert_eq!(first["workspaceId"], second["workspaceId"]);
    assert_eq!(spec.sandbox.running_containers().len(), 1);
}

#[tokio::test]
async fn driver_failure_on_open_is_a_conflict() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.sandbox.push_error(
        "start_container",
        SandboxError::CommandFailed { op: "start container", message: "no such image".into() },
    );

    let (status, body) =
        spec.post(&format!("/projects/{project}/open"), serde_json::json!({})).await;
    assert_eq!(status, 409, "{body}");
}

// Per-user LRU: uA opens pA1 then pA2; uB opens pB1. pA1 cools, pA2 and
// pB1 stay warm, one warm workspace per user.
#[tokio::test]
async fn per_user_lru_keeps_one_warm_workspace() {
    let spec = Spec::start().await;
    let (user_b, token_b) = spec.seed_user("uB").await;

    let pa1 = spec.create_project("pA1").await;
    let pa2 = spec.create_project("pA2").await;
    let pb1 = spec.create_project_as("pB1", &token_b).await;

    let wa1 = spec.open(&pa1).await;
    let wa2 = spec.open(&pa2).await;
    let (status, wb1) =
        spec.post_as(&format!("/projects/{pb1}/open"), serde_json::json!({}), &token_b).await;
    assert_eq!(status, 200);

    let ws_id = |body: &serde_json::Value| {
        hangar_core::WorkspaceId::parse(body["workspaceId"].as_str().unwrap()).unwrap()
    };
    let ws_a1 = spec.store.get_workspace(ws_id(&wa1)).await.unwrap().unwrap();
    let ws_a2 = spec.store.get_workspace(ws_id(&wa2)).await.unwrap().unwrap();
    let ws_b1 = spec.store.get_workspace(ws_id(&wb1)).await.unwrap().unwrap();

    assert_eq!(ws_a1.state, WorkspaceState::Cold);
    assert_eq!(ws_a2.state, WorkspaceState::Warm);
    assert_eq!(ws_b1.state, WorkspaceState::Warm);

    for user in [spec.user_id, user_b] {
        let warm = [&ws_a1, &ws_a2, &ws_b1]
            .iter()
            .filter(|w| w.user_id == user && w.state == WorkspaceState::Warm)
            .count();
        assert_eq!(warm, 1, "user {user} should have exactly one warm workspace");
    }
}

#[tokio::test]
async fn idle_reaper_cools_expired_workspaces_in_the_background() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    let opened = spec.open(&project).await;
    let workspace_id =
        hangar_core::WorkspaceId::parse(opened["workspaceId"].as_str().unwrap()).unwrap();

    // Force-expire the idle deadline
    let mut workspace = spec.store.get_workspace(workspace_id).await.unwrap().unwrap();
    workspace.idle_expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
    spec.store.update_workspace(workspace).await.unwrap();

    let spec_ref = &spec;
    let cooled = wait_for(Duration::from_secs(2), move || async move {
        let ws = spec_ref.store.get_workspace(workspace_id).await.unwrap().unwrap();
        ws.state == WorkspaceState::Cold
    })
    .await;
    assert!(cooled, "reaper should cool the workspace");

    let workspace = spec.store.get_workspace(workspace_id).await.unwrap().unwrap();
    assert_eq!(workspace.container_id, None);
    assert!(workspace.volume_name.is_some());
    assert!(spec.sandbox.running_containers().is_empty());
}
