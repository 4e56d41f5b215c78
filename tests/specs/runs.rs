// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run specs: the happy path, streaming, serialization, quota, and cold
//! resume with thread continuity.

use crate::prelude::*;
use hangar_core::WorkspaceState;
use hangar_storage::Store;
use std::time::Duration;

// Happy path: one prompt, one succeeded run with a diff touching the
// requested file, workspace still warm on the same volume.
#[tokio::test]
async fn message_runs_the_agent_and_returns_the_diff() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    let opened = spec.open(&project).await;

    let before = spec
        .store
        .get_workspace(
            hangar_core::WorkspaceId::parse(opened["workspaceId"].as_str().unwrap()).unwrap(),
        )
        .await
        .unwrap()
        .unwrap();

    let (status, body) = spec.message(&project, "create hello.txt").await;
    assert_eq!(status, 200, "{body}");
    assert!(body["diff"].as_str().unwrap().contains("hello.txt"));
    let run_id = body["runId"].as_str().unwrap().to_string();

    let (status, body) = spec.get(&format!("/runs/{run_id}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["run"]["status"], "succeeded");
    assert_eq!(body["run"]["prompt"], "create hello.txt");
    assert!(body["run"]["durationMs"].is_u64());
    assert!(body["run"]["envSnapshot"]["evidencePath"].is_string());

    let after = spec.store.get_workspace(before.id).await.unwrap().unwrap();
    assert_eq!(after.state, WorkspaceState::Warm);
    assert_eq!(after.volume_name, before.volume_name);
}

#[tokio::test]
async fn run_listing_is_newest_first() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;

    for text in ["one", "two", "three"] {
        let (status, _) = spec.message(&project, text).await;
        assert_eq!(status, 200);
    }

    let (status, body) = spec.get(&format!("/projects/{project}/runs")).await;
    assert_eq!(status, 200);
    let runs = body["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 3);
    assert_eq!(runs[0]["prompt"], "three");
    assert_eq!(runs[2]["prompt"], "one");
}

#[tokio::test]
async fn message_without_open_workspace_is_a_conflict() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    let (status, body) = spec.message(&project, "hello").await;
    assert_eq!(status, 409, "{body}");
}

#[tokio::test]
async fn empty_text_is_a_bad_request() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;
    let (status, _) = spec.message(&project, "   ").await;
    assert_eq!(status, 400);
}

// SSE framing: event/type per frame, run-start first, run-complete last,
// token deltas concatenate to the final text.
#[tokio::test]
async fn stream_emits_canonical_frames() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;

    let body = spec.message_stream_raw(&project, "create hello.txt").await;
    let frames = parse_sse(&body);
    assert!(!frames.is_empty());

    assert_eq!(frames.first().unwrap().0, "run-start");
    assert_eq!(frames.last().unwrap().0, "run-complete");
    assert_eq!(frames.last().unwrap().1["status"], "succeeded");

    let run_id = frames[0].1["runId"].as_str().unwrap();
    assert!(frames.iter().all(|(_, json)| json["runId"] == run_id));

    let text: String = frames
        .iter()
        .filter(|(name, _)| name == "token")
        .map(|(_, json)| json["delta"].as_str().unwrap())
        .collect();
    let (_, run) = spec.get(&format!("/runs/{run_id}")).await;
    assert_eq!(text, run["run"]["finalText"].as_str().unwrap());

    let sequences: Vec<u64> = frames
        .iter()
        .filter(|(name, _)| name == "token")
        .map(|(_, json)| json["sequence"].as_u64().unwrap())
        .collect();
    assert!(sequences.iter().enumerate().all(|(i, s)| *s == i as u64));

    assert!(frames.iter().any(|(name, json)| {
        name == "diff" && json["diff"].as_str().is_some_and(|d| d.contains("hello.txt"))
    }));
}

// S4: two concurrent messages serialize on the workspace lock; both
// succeed with non-overlapping execution windows.
#[tokio::test]
async fn concurrent_messages_serialize_per_workspace() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;
    spec.agent.set_delay(Duration::from_millis(40));

    let (a, b) = tokio::join!(
        spec.message(&project, "first"),
        spec.message(&project, "second"),
    );
    assert_eq!(a.0, 200);
    assert_eq!(b.0, 200);

    let (_, body) = spec.get(&format!("/projects/{project}/runs")).await;
    let runs = body["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 2);
    let newer_start =
        chrono::DateTime::parse_from_rfc3339(runs[0]["startedAt"].as_str().unwrap()).unwrap();
    let older_start =
        chrono::DateTime::parse_from_rfc3339(runs[1]["startedAt"].as_str().unwrap()).unwrap();
    let older_finish =
        chrono::DateTime::parse_from_rfc3339(runs[1]["finishedAt"].as_str().unwrap()).unwrap();
    assert!(newer_start > older_start);
    assert!(newer_start >= older_finish, "execution windows must not overlap");
}

// S5: MAX_RUNS_PER_DAY=2 → third call is 429 and leaves no run row.
#[tokio::test]
async fn quota_denies_the_third_run_of_the_day() {
    let spec = Spec::start_with(|config| config.max_runs_per_day = 2).await;
    let project = spec.create_project("p1").await;
    spec.open(&project).await;

    for text in ["one", "two"] {
        let (status, _) = spec.message(&project, text).await;
        assert_eq!(status, 200);
    }
    let (status, body) = spec.message(&project, "three").await;
    assert_eq!(status, 429, "{body}");

    let (_, body) = spec.get(&format!("/projects/{project}/runs")).await;
    assert_eq!(body["runs"].as_array().unwrap().len(), 2);
}

// S3: cool the workspace, reopen, and the agent still knows the thread.
#[tokio::test]
async fn cold_resume_preserves_the_conversation_thread() {
    let spec = Spec::start().await;
    let project = spec.create_project("p1").await;
    let opened = spec.open(&project).await;
    let workspace_id =
        hangar_core::WorkspaceId::parse(opened["workspaceId"].as_str().unwrap()).unwrap();

    let (status, _) = spec.message(&project, "remember that my name is Alice").await;
    assert_eq!(status, 200);

    let before = spec.store.get_workspace(workspace_id).await.unwrap().unwrap();
    assert!(before.thread_id.is_some());

    // Force-expire and wait for the reaper
    let mut workspace = before.clone();
    workspace.idle_expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
    spec.store.update_workspace(workspace).await.unwrap();
    let spec_ref = &spec;
    let cooled = wait_for(Duration::from_secs(2), move || async move {
        let ws = spec_ref.store.get_workspace(workspace_id).await.unwrap().unwrap();
        ws.state == WorkspaceState::Cold
    })
    .await;
    assert!(cooled);

    let cold = spec.store.get_workspace(workspace_id).await.unwrap().unwrap();
    assert_eq!(cold.thread_id, before.thread_id);

    spec.open(&project).await;
    let warmed = spec.store.get_workspace(workspace_id).await.unwrap().unwrap();
    assert_eq!(warmed.state, WorkspaceState::Warm);
    assert_eq!(warmed.volume_name, before.volume_name);
    assert_eq!(warmed.thread_id, before.thread_id);

    let (status, body) = spec.message(&project, "what is my name?").await;
    assert_eq!(status, 200);
    assert!(
        body["finalText"].as_str().unwrap().contains("Alice"),
        "agent should remember: {body}"
    );
}
