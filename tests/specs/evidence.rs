// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evidence bundle specs: async build, download states, and the canonical
//! zip layout.

use crate::prelude::*;
use hangar_core::{BundleStatus, RunId};
use hangar_engine::evidence::zip;
use hangar_storage::Store;
use std::time::Duration;

async fn run_and_wait_ready(spec: &Spec, project: &str, text: &str) -> String {
    let (status, body) = spec.message(project, text).await;
    assert_eq!(status, 200, "{body}");
    let run_id = body["runId"].as_str().unwrap().to_string();

    let parsed = RunId::parse(&run_id).unwrap();
    let ready = wait_for(Duration::from_secs(2), move || async move {
        matches!(
            spec.store.get_bundle_for_run(parsed).await.unwrap(),
            Some(bundle) if bundle.status == BundleStatus::Ready
        )
    })
    .await;
    assert!(ready, "bundle never became ready");
    run_id
}

// S6: the downloaded zip carries the full canonical layout and the event
// log opens with run-start.
#[tokio::test]
async fn evidence_download_returns_the_canonical_zip() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;
    let run_id = run_and_wait_ready(&spec, &project, "create hello.txt").await;

    let response = spec
        .client
        .get(format!("{}/runs/{run_id}/evidence", spec.base))
        .bearer_auth(&spec.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("application/zip")
    );

    let bytes = response.bytes().await.unwrap();
    let names = zip::entry_names(&bytes).unwrap();
    for expected in [
        "metadata.json",
        "env_snapshot.json",
        "events.jsonl",
        "command_log.jsonl",
        "outputs.json",
    ] {
        assert!(
            names.contains(&format!("{run_id}/{expected}")),
            "missing {expected}: {names:?}"
        );
    }

    let events = zip::read_entry(&bytes, &format!("{run_id}/events.jsonl")).unwrap().unwrap();
    let first_line = String::from_utf8(events).unwrap();
    let first: serde_json::Value =
        serde_json::from_str(first_line.lines().next().unwrap()).unwrap();
    assert_eq!(first["type"], "run-start");
    assert_eq!(first["runId"], run_id);
    assert!(chrono::DateTime::parse_from_rfc3339(first["ts"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn evidence_is_pending_before_any_bundle_row_exists() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;

    // A run row without a scheduled bundle (as seen mid-run)
    let workspace = spec
        .store
        .find_workspace(spec.user_id, hangar_core::ProjectId::parse(&project).unwrap())
        .await
        .unwrap()
        .unwrap();
    let run = hangar_core::Run::started(
        RunId::new(),
        spec.user_id,
        workspace.project_id,
        workspace.id,
        "in flight".into(),
        chrono::Utc::now(),
    );
    let run_id = run.id;
    spec.store.insert_run(run).await.unwrap();

    let (status, body) = spec.get(&format!("/runs/{run_id}/evidence")).await;
    assert_eq!(status, 202);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn failed_builds_surface_as_error_status() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;

    spec.sandbox.push_error(
        "get_archive",
        hangar_sandbox::SandboxError::NotFound("evidence dir gone".into()),
    );
    let (status, body) = spec.message(&project, "say hi").await;
    assert_eq!(status, 200, "{body}");
    let run_id = RunId::parse(body["runId"].as_str().unwrap()).unwrap();

    let spec_ref = &spec;
    let errored = wait_for(Duration::from_secs(2), move || async move {
        matches!(
            spec_ref.store.get_bundle_for_run(run_id).await.unwrap(),
            Some(bundle) if bundle.status == BundleStatus::Error
        )
    })
    .await;
    assert!(errored, "bundle should end in error");

    let (status, body) = spec.get(&format!("/runs/{run_id}/evidence")).await;
    assert_eq!(status, 500);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("evidence dir gone"));

    // The run itself is unaffected by the bundle failure
    let (_, run) = spec.get(&format!("/runs/{run_id}")).await;
    assert_eq!(run["run"]["status"], "succeeded");
}

#[tokio::test]
async fn evidence_of_foreign_runs_is_invisible() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;
    let run_id = run_and_wait_ready(&spec, &project, "create hello.txt").await;

    let (_, stranger_token) = spec.seed_user("stranger").await;
    let (status, _) = spec.get_as(&format!("/runs/{run_id}/evidence"), &stranger_token).await;
    assert_eq!(status, 404);
    let (status, _) = spec.get_as(&format!("/runs/{run_id}"), &stranger_token).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn failed_runs_still_produce_a_bundle() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;

    spec.agent.push_reply(Err(hangar_sandbox::AgentError::Status {
        status: 503,
        body: "overloaded".into(),
    }));
    let (status, body) = spec.message(&project, "say hi").await;
    assert_eq!(status, 500, "{body}");

    let (_, listing) = spec.get(&format!("/projects/{project}/runs")).await;
    let run_id = RunId::parse(listing["runs"][0]["id"].as_str().unwrap()).unwrap();
    assert_eq!(listing["runs"][0]["status"], "failed");

    let spec_ref = &spec;
    let ready = wait_for(Duration::from_secs(2), move || async move {
        matches!(
            spec_ref.store.get_bundle_for_run(run_id).await.unwrap(),
            Some(bundle) if bundle.status == BundleStatus::Ready
        )
    })
    .await;
    assert!(ready, "failed runs are auditable too");

    let bundle = spec.store.get_bundle_for_run(run_id).await.unwrap().unwrap();
    let bytes = std::fs::read(bundle.bundle_path.unwrap()).unwrap();
    let events = zip::read_entry(&bytes, &format!("{run_id}/events.jsonl")).unwrap().unwrap();
    let text = String::from_utf8(events).unwrap();
    let last: serde_json::Value =
        serde_json::from_str(text.lines().last().unwrap()).unwrap();
    assert_eq!(last["type"], "run-complete");
    assert_eq!(last["status"], "failed");
}
